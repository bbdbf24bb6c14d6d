use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::tracker::GazeDirection;

/// One gaze estimate, tagged when its frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeSample {
    pub direction: GazeDirection,
    pub confidence: f64,
    pub error_offset_px: Option<f64>,
    pub story_index: usize,
    pub captured_at_ms: i64,
}

/// Append-only record of one tracking run. Entries are kept in arrival
/// order, which need not match capture order.
#[derive(Clone, Default)]
pub struct SessionLog {
    samples: Arc<Mutex<Vec<GazeSample>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<GazeSample> {
        self.lock().clone()
    }

    /// A write handle that stops accepting samples once `token` is
    /// cancelled.
    pub fn writer(&self, token: CancellationToken) -> SessionLogWriter {
        SessionLogWriter {
            samples: Arc::clone(&self.samples),
            token,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GazeSample>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct SessionLogWriter {
    samples: Arc<Mutex<Vec<GazeSample>>>,
    token: CancellationToken,
}

impl SessionLogWriter {
    /// Returns false, dropping the sample, when the run has been stopped.
    /// The token is checked under the lock so a stop cannot interleave.
    pub fn append(&self, sample: GazeSample) -> bool {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.token.is_cancelled() {
            return false;
        }
        samples.push(sample);
        true
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

const MAX_RECENT_REQUESTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestOutcome {
    Appended,
    Dropped,
    DiscardedAfterStop,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub captured_at: DateTime<Utc>,
    pub round_trip_ms: u64,
    pub outcome: RequestOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSnapshot {
    pub ticks: u64,
    pub appended: u64,
    pub dropped: u64,
    pub discarded_after_stop: u64,
    pub recent_requests: Vec<RequestMetrics>,
}

/// Counters for the sampling loop, shared by every tick task.
#[derive(Clone, Default)]
pub struct SamplingMetrics {
    inner: Arc<Mutex<SamplingSnapshot>>,
}

impl SamplingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_tick(&self) {
        self.inner.lock().await.ticks += 1;
    }

    pub async fn record_request(&self, metrics: RequestMetrics) {
        let mut state = self.inner.lock().await;

        match metrics.outcome {
            RequestOutcome::Appended => state.appended += 1,
            RequestOutcome::Dropped => state.dropped += 1,
            RequestOutcome::DiscardedAfterStop => state.discarded_after_stop += 1,
        }

        state.recent_requests.push(metrics);
        if state.recent_requests.len() > MAX_RECENT_REQUESTS {
            state.recent_requests.remove(0);
        }
    }

    pub async fn snapshot(&self) -> SamplingSnapshot {
        self.inner.lock().await.clone()
    }
}

use std::sync::Arc;

use anyhow::Result;

use crate::error::{KioskError, SetupStage};

/// The microphone. `begin` fails when recording permission is missing.
pub trait AudioSource: Send + Sync {
    fn begin(&self) -> Result<()>;
    /// Ends the take and hands back the encoded recording (WAV).
    fn finish(&self) -> Result<Vec<u8>>;
}

pub struct AudioRecorder {
    source: Arc<dyn AudioSource>,
    recording: bool,
}

impl AudioRecorder {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            source,
            recording: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn start(&mut self) -> Result<(), KioskError> {
        if self.recording {
            return Err(KioskError::AlreadyRecording);
        }
        self.source
            .begin()
            .map_err(|err| KioskError::setup(SetupStage::Recording, format!("{err:#}")))?;
        self.recording = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<Vec<u8>, KioskError> {
        if !self.recording {
            return Err(KioskError::NotRecording);
        }
        self.recording = false;
        self.source
            .finish()
            .map_err(|err| KioskError::setup(SetupStage::Recording, format!("{err:#}")))
    }

    /// Drops an unfinished take without submitting it.
    pub fn abandon(&mut self) {
        if self.recording {
            self.recording = false;
            let _ = self.source.finish();
        }
    }
}

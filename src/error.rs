//! User-visible error taxonomy for the kiosk session.

use std::fmt;

use thiserror::Error;

use crate::session::SessionPhase;
use crate::tracker::MalformedPayload;

/// Which setup step failed. Controls that depend on the step stay disabled
/// until it is retried successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Camera,
    TrackerInit,
    StartTracking,
    Recording,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetupStage::Camera => "camera access",
            SetupStage::TrackerInit => "tracker initialisation",
            SetupStage::StartTracking => "tracking start",
            SetupStage::Recording => "audio recording",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum KioskError {
    #[error("cannot {trigger} from the {from} phase")]
    InvalidTransition {
        from: SessionPhase,
        trigger: &'static str,
    },

    #[error("calibration is already running")]
    CalibrationInProgress,

    #[error("no passage after index {0}; all passages are complete")]
    NoMorePassages(usize),

    #[error("no recording in progress")]
    NotRecording,

    #[error("recording already in progress")]
    AlreadyRecording,

    #[error("child name is required")]
    MissingChildName,

    #[error("{stage} failed: {message}")]
    Setup { stage: SetupStage, message: String },

    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// The reply belongs to a session that has since been reset.
    #[error("{operation} finished after the session was reset")]
    SessionReset { operation: &'static str },

    #[error("malformed {operation} response: {message}")]
    MalformedResponse {
        operation: &'static str,
        message: String,
    },
}

impl KioskError {
    pub fn setup(stage: SetupStage, message: impl Into<String>) -> Self {
        KioskError::Setup {
            stage,
            message: message.into(),
        }
    }

    /// Classifies a failed service call. Shape errors raised while decoding
    /// the reply become `MalformedResponse`; everything else is a request
    /// failure.
    pub fn from_request(operation: &'static str, err: anyhow::Error) -> Self {
        match err.downcast_ref::<MalformedPayload>() {
            Some(malformed) => KioskError::MalformedResponse {
                operation,
                message: malformed.reason.clone(),
            },
            None => KioskError::Request {
                operation,
                message: format!("{err:#}"),
            },
        }
    }

    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        KioskError::Request {
            operation,
            message: message.into(),
        }
    }
}

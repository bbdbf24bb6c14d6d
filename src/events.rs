//! Outbound UI notifications.
//!
//! Components never touch the display directly; they emit [`UiEvent`]s on a
//! broadcast channel and whatever renders the kiosk subscribes.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::calibration::{CalibrationOutcome, CalibrationPoint};
use crate::report::ReportPayload;
use crate::session::{PhaseControls, SessionPhase};
use crate::tracker::GazeDirection;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

/// Buttons whose enabled state is driven by action handlers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Control {
    Initialize,
    Calibrate,
    StartRecording,
    StopRecording,
    GenerateReport,
    DownloadReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    PhaseChanged {
        phase: SessionPhase,
        controls: PhaseControls,
    },
    Status {
        kind: StatusKind,
        message: String,
    },
    ControlEnabled {
        control: Control,
        enabled: bool,
    },
    ReadingClock {
        elapsed_secs: u64,
    },
    Countdown {
        remaining: u32,
    },
    CalibrationTarget {
        point: CalibrationPoint,
        visible: bool,
    },
    CalibrationCompleted {
        outcome: CalibrationOutcome,
    },
    PassageDisplayed {
        index: usize,
        total: usize,
        title: String,
        body: String,
    },
    NextPassageControl {
        visible: bool,
    },
    AllPassagesComplete,
    ChildInfoPrompt,
    GazeSample {
        direction: GazeDirection,
        confidence: f64,
        error_offset_px: Option<f64>,
        story_index: usize,
        elapsed_secs: u64,
    },
    RecordingStatus {
        recording: bool,
    },
    ReportReady {
        report: Box<ReportPayload>,
    },
    DocumentSaved {
        path: PathBuf,
    },
    VideoFrame {
        data_url: String,
    },
}

#[derive(Clone)]
pub struct UiEmitter {
    tx: broadcast::Sender<UiEvent>,
}

impl UiEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget. Having no subscriber is not an error.
    pub fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, kind: StatusKind, message: impl Into<String>) {
        self.emit(UiEvent::Status {
            kind,
            message: message.into(),
        });
    }

    pub fn control(&self, control: Control, enabled: bool) {
        self.emit(UiEvent::ControlEnabled { control, enabled });
    }
}

impl Default for UiEmitter {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calibration::CalibrationSequencer;
use crate::capture::{AudioRecorder, FrameCapture};
use crate::events::UiEmitter;
use crate::report::ReportPayload;
use crate::sampling::{SamplingController, SessionLog};
use crate::settings::KioskSettings;
use crate::story::{StoryCatalog, StoryController};
use crate::timer::{ActiveTimers, SharedClock, TimerSlot};
use crate::tracker::{AudioAnalysisResult, DiagnosisReport, TrackerService};

use super::phase::SessionPhase;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::session";

use crate::{log_info, log_warn};

/// Collaborators shared by everything a session starts.
pub(crate) struct SessionDeps {
    pub tracker: Arc<dyn TrackerService>,
    pub capture: FrameCapture,
    pub ui: UiEmitter,
    pub timers: ActiveTimers,
    pub settings: KioskSettings,
    pub catalog: Arc<StoryCatalog>,
}

/// Everything scoped to one tracking run. Created when reading begins and
/// dropped as a whole on reset, so nothing from an old run can leak into
/// the next.
pub struct TrackingRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub log: SessionLog,
    pub story: StoryController,
    pub sampling: SamplingController,
}

impl TrackingRun {
    /// A fresh run with its first passage on screen.
    pub(crate) fn begin(deps: &SessionDeps) -> Self {
        let mut story = StoryController::new(
            Arc::clone(&deps.catalog),
            deps.settings.story_reveal(),
            deps.ui.clone(),
            deps.timers.clone(),
        );
        story.enter();

        let run = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            log: SessionLog::new(),
            story,
            sampling: SamplingController::new(
                deps.settings.sample_period(),
                deps.capture.clone(),
                Arc::clone(&deps.tracker),
                deps.ui.clone(),
                deps.timers.clone(),
            ),
        };
        log_info!("tracking run {} created", run.id);
        run
    }

    /// Stops every timer the run owns. The log stays readable.
    pub(crate) async fn halt(&mut self) {
        self.story.stop();
        if let Err(err) = self.sampling.stop().await {
            log_warn!("run {}: {err:#}", self.id);
        }
    }
}

pub(crate) struct SessionState {
    pub phase: SessionPhase,
    /// Bumped on every reset. Work that releases the lock compares it
    /// before writing back.
    pub epoch: u64,
    /// Camera started and tracker initialised.
    pub system_ready: bool,
    pub calibration: CalibrationSequencer,
    pub reading_clock: TimerSlot,
    pub countdown: TimerSlot,
    pub elapsed: SharedClock,
    pub run: Option<TrackingRun>,
    pub recorder: AudioRecorder,
    pub audio: Option<AudioAnalysisResult>,
    pub diagnosis: Option<DiagnosisReport>,
    pub report: Option<ReportPayload>,
}

impl SessionState {
    pub fn new(deps: &SessionDeps, recorder: AudioRecorder) -> Self {
        Self {
            phase: SessionPhase::Idle,
            epoch: 0,
            system_ready: false,
            calibration: CalibrationSequencer::new(
                deps.settings.calibration_timing(),
                deps.capture.clone(),
                Arc::clone(&deps.tracker),
                deps.ui.clone(),
                deps.timers.clone(),
            ),
            reading_clock: TimerSlot::new("reading-clock", deps.timers.clone()),
            countdown: TimerSlot::new("diagnosis-countdown", deps.timers.clone()),
            elapsed: SharedClock::new(),
            run: None,
            recorder,
            audio: None,
            diagnosis: None,
            report: None,
        }
    }
}

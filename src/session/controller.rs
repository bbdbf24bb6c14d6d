use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::calibration::CalibrationStatus;
use crate::capture::{AudioRecorder, AudioSource, FrameCapture, FrameSource};
use crate::error::{KioskError, SetupStage};
use crate::events::{Control, StatusKind, UiEmitter, UiEvent};
use crate::report::{compile_report, ReportPayload};
use crate::sampling::{GazeSample, SamplingSnapshot};
use crate::settings::KioskSettings;
use crate::story::StoryCatalog;
use crate::timer::{ActiveTimers, TickFlow};
use crate::tracker::{AudioAnalysisResult, DiagnosisReport, Reply, TrackerService};

use super::phase::{resolve, PhaseControls, PhaseTrigger, SessionPhase, Transition};
use super::state::{SessionDeps, SessionState, TrackingRun};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::session";

use crate::{log_debug, log_info, log_warn};

const CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// The session state machine. Cheap to clone; clones drive the same
/// session.
#[derive(Clone)]
pub struct SessionController {
    pub(crate) deps: Arc<SessionDeps>,
    pub(crate) state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    pub fn new(
        tracker: Arc<dyn TrackerService>,
        camera: Arc<dyn FrameSource>,
        microphone: Arc<dyn AudioSource>,
        ui: UiEmitter,
        settings: KioskSettings,
    ) -> Self {
        Self::with_catalog(tracker, camera, microphone, ui, settings, StoryCatalog::reference())
    }

    pub fn with_catalog(
        tracker: Arc<dyn TrackerService>,
        camera: Arc<dyn FrameSource>,
        microphone: Arc<dyn AudioSource>,
        ui: UiEmitter,
        settings: KioskSettings,
        catalog: StoryCatalog,
    ) -> Self {
        let deps = SessionDeps {
            tracker,
            capture: FrameCapture::new(camera, settings.jpeg_quality),
            ui,
            timers: ActiveTimers::new(),
            settings,
            catalog: Arc::new(catalog),
        };
        let state = SessionState::new(&deps, AudioRecorder::new(microphone));
        Self {
            deps: Arc::new(deps),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn ui(&self) -> &UiEmitter {
        &self.deps.ui
    }

    pub fn settings(&self) -> &KioskSettings {
        &self.deps.settings
    }

    /// Armed timers and loops across the whole session.
    pub fn timers(&self) -> ActiveTimers {
        self.deps.timers.clone()
    }

    /// Passages in the catalog this session reads from.
    pub fn story_count(&self) -> usize {
        self.deps.catalog.len()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn calibration_status(&self) -> CalibrationStatus {
        self.state.lock().await.calibration.status()
    }

    pub async fn calibration_updates(&self) -> watch::Receiver<CalibrationStatus> {
        self.state.lock().await.calibration.subscribe()
    }

    pub async fn samples(&self) -> Vec<GazeSample> {
        let state = self.state.lock().await;
        state
            .run
            .as_ref()
            .map(|run| run.log.snapshot())
            .unwrap_or_default()
    }

    pub async fn log_len(&self) -> usize {
        let state = self.state.lock().await;
        state.run.as_ref().map(|run| run.log.len()).unwrap_or(0)
    }

    pub async fn story_index(&self) -> usize {
        let state = self.state.lock().await;
        state
            .run
            .as_ref()
            .map(|run| run.story.current_index())
            .unwrap_or(0)
    }

    pub async fn sampling_snapshot(&self) -> Option<SamplingSnapshot> {
        let metrics = {
            let state = self.state.lock().await;
            state.run.as_ref().map(|run| run.sampling.metrics())
        }?;
        Some(metrics.snapshot().await)
    }

    pub async fn reading_elapsed_secs(&self) -> u64 {
        self.state.lock().await.elapsed.elapsed_secs()
    }

    pub async fn audio_result(&self) -> Option<AudioAnalysisResult> {
        self.state.lock().await.audio.clone()
    }

    pub async fn report(&self) -> Option<ReportPayload> {
        self.state.lock().await.report.clone()
    }

    /// Applies a phase trigger. Triggers that are not valid from the
    /// current phase change nothing.
    pub async fn trigger(&self, trigger: PhaseTrigger) -> Result<(), KioskError> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, trigger).await
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.reset_locked(&mut state).await;
    }

    pub(crate) async fn apply(
        &self,
        state: &mut SessionState,
        trigger: PhaseTrigger,
    ) -> Result<(), KioskError> {
        let transition = resolve(state.phase, &trigger)?;
        let reentry = matches!(transition, Transition::ReEnter(_));
        log_debug!("{} -> {:?}", state.phase, transition);

        match trigger {
            PhaseTrigger::Reset => {
                self.reset_locked(state).await;
                return Ok(());
            }
            PhaseTrigger::StartSession => self.enter_text_view(state, reentry),
            PhaseTrigger::BeginReading => self.enter_reading(state, reentry).await?,
            PhaseTrigger::BeginDiagnosis => self.enter_diagnosis(state, reentry).await?,
            PhaseTrigger::DiagnosisComplete(diagnosis) => {
                self.enter_report(state, diagnosis, reentry).await
            }
        }
        Ok(())
    }

    fn enter_text_view(&self, state: &mut SessionState, reentry: bool) {
        self.set_phase(state, SessionPhase::TextView);
        if !reentry {
            self.deps.ui.status(
                StatusKind::Info,
                "Look at each dot to calibrate, then start reading.",
            );
        }
    }

    async fn enter_reading(
        &self,
        state: &mut SessionState,
        reentry: bool,
    ) -> Result<(), KioskError> {
        if !reentry {
            if state.calibration.status() == CalibrationStatus::Running {
                return Err(KioskError::CalibrationInProgress);
            }
            match self.deps.tracker.start_tracking().await {
                Ok(Reply::Success(_)) => {}
                Ok(Reply::Rejected { message }) => {
                    return Err(KioskError::setup(SetupStage::StartTracking, message))
                }
                Err(err) => {
                    return Err(KioskError::setup(
                        SetupStage::StartTracking,
                        format!("{err:#}"),
                    ))
                }
            }
            if let Some(mut stale) = state.run.take() {
                stale.halt().await;
            }
        }

        let deps = Arc::clone(&self.deps);
        let run = state.run.get_or_insert_with(|| TrackingRun::begin(&deps));
        let cursor = run.story.cursor();
        run.sampling
            .start(cursor, &run.log)
            .await
            .map_err(|err| KioskError::setup(SetupStage::StartTracking, format!("{err:#}")))?;
        let run_id = run.id;

        state.elapsed.start(Instant::now());
        let ui = self.deps.ui.clone();
        let clock = state.elapsed.clone();
        state.reading_clock.every(CLOCK_PERIOD, move |_| {
            ui.emit(UiEvent::ReadingClock {
                elapsed_secs: clock.elapsed_secs(),
            });
            TickFlow::Continue
        });

        self.set_phase(state, SessionPhase::Reading);
        if !reentry {
            log_info!("reading started; run {run_id}");
            self.deps
                .ui
                .status(StatusKind::Success, "Tracking started! Read the passage aloud.");
        }
        Ok(())
    }

    async fn enter_diagnosis(
        &self,
        state: &mut SessionState,
        reentry: bool,
    ) -> Result<(), KioskError> {
        state.reading_clock.cancel();
        state.elapsed.stop();

        if let Some(run) = state.run.as_mut() {
            if !run.sampling.is_running() {
                let cursor = run.story.cursor();
                run.sampling.start(cursor, &run.log).await.map_err(|err| {
                    KioskError::setup(SetupStage::StartTracking, format!("{err:#}"))
                })?;
            }
        }

        let ticks = self.deps.settings.countdown_ticks;
        let ui = self.deps.ui.clone();
        ui.emit(UiEvent::Countdown { remaining: ticks });
        state.countdown.every(CLOCK_PERIOD, move |tick| {
            let remaining = ticks.saturating_sub(u32::try_from(tick).unwrap_or(u32::MAX));
            ui.emit(UiEvent::Countdown { remaining });
            if remaining == 0 {
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        });

        self.set_phase(state, SessionPhase::Diagnosis);
        if !reentry {
            self.deps
                .ui
                .status(StatusKind::Info, "Diagnosis in progress. Keep reading!");
        }
        Ok(())
    }

    async fn enter_report(
        &self,
        state: &mut SessionState,
        diagnosis: Option<DiagnosisReport>,
        reentry: bool,
    ) {
        state.reading_clock.cancel();
        state.countdown.cancel();
        state.elapsed.stop();

        if let Some(run) = state.run.as_mut() {
            run.halt().await;
        }
        if !reentry {
            self.stop_remote_tracking().await;
        }

        if let Some(diagnosis) = diagnosis {
            state.diagnosis = Some(diagnosis);
        }
        let samples = state
            .run
            .as_ref()
            .map(|run| run.log.snapshot())
            .unwrap_or_default();
        let audio = state.audio.clone().unwrap_or_default();
        let diagnosis = state.diagnosis.clone().unwrap_or_default();

        let report = compile_report(&samples, &audio, &diagnosis);
        log_info!(
            "report compiled from {} samples; feedback {:?}",
            report.total_measurements,
            report.feedback
        );
        state.report = Some(report.clone());

        self.set_phase(state, SessionPhase::Report);
        self.deps.ui.emit(UiEvent::ReportReady {
            report: Box::new(report),
        });
        self.deps.ui.control(Control::DownloadReport, true);
        self.deps.ui.status(StatusKind::Success, "Report ready.");
    }

    pub(crate) async fn reset_locked(&self, state: &mut SessionState) {
        let was_tracking = matches!(
            state.phase,
            SessionPhase::Reading | SessionPhase::Diagnosis
        );

        state.calibration.cancel();
        state.reading_clock.cancel();
        state.countdown.cancel();
        state.elapsed.reset();
        if let Some(mut run) = state.run.take() {
            run.halt().await;
            let progress = run.story.progress();
            log_info!(
                "run {} discarded after {}s at passage {} with {} samples",
                run.id,
                (Utc::now() - run.started_at).num_seconds(),
                progress.current_index,
                run.log.len()
            );
        }
        if was_tracking {
            self.stop_remote_tracking().await;
        }

        state.epoch = state.epoch.wrapping_add(1);
        if state.recorder.is_recording() {
            log_info!("recording abandoned by reset");
        }
        state.recorder.abandon();
        state.audio = None;
        state.diagnosis = None;
        state.report = None;

        let ui = &self.deps.ui;
        ui.control(Control::StartRecording, true);
        ui.control(Control::StopRecording, false);
        ui.control(Control::GenerateReport, false);
        ui.control(Control::DownloadReport, false);
        ui.control(Control::Calibrate, state.system_ready);
        self.set_phase(state, SessionPhase::Idle);
    }

    async fn stop_remote_tracking(&self) {
        match self.deps.tracker.stop_tracking().await {
            Ok(Reply::Success(_)) => {}
            Ok(Reply::Rejected { message }) => log_warn!("stop_tracking refused: {message}"),
            Err(err) => log_warn!("stop_tracking failed: {err:#}"),
        }
    }

    fn set_phase(&self, state: &mut SessionState, phase: SessionPhase) {
        state.phase = phase;
        self.deps.ui.emit(UiEvent::PhaseChanged {
            phase,
            controls: PhaseControls::for_phase(phase),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticMicrophone;
    use crate::testing::{estimate, GazeStep, ScriptedTracker, TinyCamera};
    use crate::tracker::GazeDirection;
    use pretty_assertions::assert_eq;
    use tokio::time;

    fn session(tracker: &Arc<ScriptedTracker>) -> SessionController {
        SessionController::new(
            Arc::clone(tracker) as Arc<dyn TrackerService>,
            Arc::new(TinyCamera),
            Arc::new(SyntheticMicrophone::new()),
            UiEmitter::new(),
            KioskSettings::default(),
        )
    }

    async fn into_reading(session: &SessionController) {
        session.trigger(PhaseTrigger::StartSession).await.unwrap();
        session.trigger(PhaseTrigger::BeginReading).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn walks_the_phases_in_order() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);
        let mut events = session.ui().subscribe();

        into_reading(&session).await;
        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        session
            .trigger(PhaseTrigger::DiagnosisComplete(None))
            .await
            .unwrap();
        assert_eq!(session.phase().await, SessionPhase::Report);

        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let UiEvent::PhaseChanged { phase, .. } = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                SessionPhase::TextView,
                SessionPhase::Reading,
                SessionPhase::Diagnosis,
                SessionPhase::Report,
            ]
        );
        assert_eq!(tracker.called("start_tracking"), 1);
        assert_eq!(tracker.called("stop_tracking"), 1);
        assert_eq!(session.timers().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_trigger_changes_nothing() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);

        let err = session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap_err();
        assert!(matches!(
            err,
            KioskError::InvalidTransition {
                from: SessionPhase::Idle,
                ..
            }
        ));
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert_eq!(session.timers().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_start_tracking_stays_in_text_view() {
        let tracker = ScriptedTracker::new();
        tracker.reject_start_tracking();
        let session = session(&tracker);

        session.trigger(PhaseTrigger::StartSession).await.unwrap();
        let err = session.trigger(PhaseTrigger::BeginReading).await.unwrap_err();

        assert!(matches!(
            err,
            KioskError::Setup {
                stage: SetupStage::StartTracking,
                ..
            }
        ));
        assert_eq!(session.phase().await, SessionPhase::TextView);
        assert_eq!(session.timers().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn re_entering_phases_never_duplicates_timers() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);

        into_reading(&session).await;
        // reading clock, sampling loop, passage reveal
        assert_eq!(session.timers().count(), 3);
        for _ in 0..3 {
            session.trigger(PhaseTrigger::BeginReading).await.unwrap();
            assert_eq!(session.timers().count(), 3);
        }

        time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(
            tracker.gaze_requests.load(std::sync::atomic::Ordering::SeqCst),
            4
        );

        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        // countdown replaces the clock
        assert_eq!(session.timers().count(), 3);
        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        assert_eq!(session.timers().count(), 3);
        assert_eq!(tracker.called("start_tracking"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_out_after_five_ticks() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);
        let mut events = session.ui().subscribe();

        into_reading(&session).await;
        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        time::sleep(Duration::from_millis(7_500)).await;

        let mut countdown = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let UiEvent::Countdown { remaining } = event {
                countdown.push(remaining);
            }
        }
        assert_eq!(countdown, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(session.phase().await, SessionPhase::Diagnosis);
    }

    #[tokio::test(start_paused = true)]
    async fn reading_clock_stops_at_diagnosis() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);

        into_reading(&session).await;
        time::sleep(Duration::from_millis(3_200)).await;
        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        time::sleep(Duration::from_secs(4)).await;

        assert_eq!(session.reading_elapsed_secs().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_from_every_phase_clears_the_run() {
        let targets = [
            vec![],
            vec![PhaseTrigger::StartSession],
            vec![PhaseTrigger::StartSession, PhaseTrigger::BeginReading],
            vec![
                PhaseTrigger::StartSession,
                PhaseTrigger::BeginReading,
                PhaseTrigger::BeginDiagnosis,
            ],
            vec![
                PhaseTrigger::StartSession,
                PhaseTrigger::BeginReading,
                PhaseTrigger::BeginDiagnosis,
                PhaseTrigger::DiagnosisComplete(None),
            ],
        ];

        for path in targets {
            let tracker = ScriptedTracker::new();
            let session = session(&tracker);
            for trigger in path {
                session.trigger(trigger).await.unwrap();
            }
            time::sleep(Duration::from_millis(1_600)).await;
            if session.phase().await == SessionPhase::Reading {
                session.state.lock().await.run.as_mut().unwrap().story.advance().unwrap();
            }

            session.reset().await;

            assert_eq!(session.phase().await, SessionPhase::Idle);
            assert_eq!(session.log_len().await, 0);
            assert_eq!(session.story_index().await, 0);
            assert_eq!(session.calibration_status().await, CalibrationStatus::NotStarted);
            assert_eq!(session.timers().count(), 0);
            assert!(session.report().await.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_arriving_after_reset_are_dropped() {
        let tracker = ScriptedTracker::new();
        tracker.script_gaze([GazeStep::Delayed(
            Duration::from_secs(3),
            estimate(GazeDirection::Left, 0.9),
        )]);
        let session = session(&tracker);

        into_reading(&session).await;
        time::sleep(Duration::from_millis(700)).await;
        session.reset().await;
        into_reading(&session).await;
        time::sleep(Duration::from_millis(4_100)).await;

        let samples = session.samples().await;
        assert!(samples
            .iter()
            .all(|sample| sample.direction == GazeDirection::Center));
        assert_eq!(samples.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_report_announcement_uses_stored_results() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);

        into_reading(&session).await;
        session.trigger(PhaseTrigger::BeginDiagnosis).await.unwrap();
        session
            .trigger(PhaseTrigger::announcing(SessionPhase::Report))
            .await
            .unwrap();

        let report = session.report().await.unwrap();
        assert_eq!(report.total_measurements, 0);
        assert_eq!(report.child_name, "Reader");
    }

    #[tokio::test(start_paused = true)]
    async fn clock_display_follows_the_session_clock() {
        let tracker = ScriptedTracker::new();
        let session = session(&tracker);
        let mut events = session.ui().subscribe();

        into_reading(&session).await;
        time::sleep(Duration::from_millis(3_200)).await;

        let mut shown = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let UiEvent::ReadingClock { elapsed_secs } = event {
                shown.push(elapsed_secs);
            }
        }
        assert_eq!(shown, vec![1, 2, 3]);
        assert_eq!(shown.last().copied(), Some(session.reading_elapsed_secs().await));
    }
}

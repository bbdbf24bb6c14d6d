use std::path::PathBuf;

use crate::calibration::CalibrationLayout;
use crate::error::{KioskError, SetupStage};
use crate::events::{Control, StatusKind, UiEvent};
use crate::tracker::{AudioAnalysisResult, Reply, ReportRequest};

use super::controller::SessionController;
use super::export::save_document;
use super::phase::{PhaseTrigger, SessionPhase};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::session";

use crate::{log_info, log_warn};

/// A user action from the kiosk screen.
#[derive(Debug, Clone, PartialEq)]
pub enum KioskCommand {
    StartSession,
    InitializeSystem,
    StopCamera,
    StartCalibration,
    BeginReading,
    BeginDiagnosis,
    NextPassage,
    PassageHint,
    StartRecording,
    StopRecording,
    GenerateReport {
        child_name: String,
        user_id: Option<u32>,
    },
    DownloadReport {
        child_name: String,
        user_id: Option<u32>,
    },
    Reset,
}

impl SessionController {
    /// Runs one user action. Failures are also published as an error status.
    pub async fn dispatch(&self, command: KioskCommand) -> Result<(), KioskError> {
        let result = match command {
            KioskCommand::StartSession => self.trigger(PhaseTrigger::StartSession).await,
            KioskCommand::InitializeSystem => self.initialize_system().await,
            KioskCommand::StopCamera => self.stop_camera().await,
            KioskCommand::StartCalibration => self.start_calibration().await,
            KioskCommand::BeginReading => self.trigger(PhaseTrigger::BeginReading).await,
            KioskCommand::BeginDiagnosis => self.trigger(PhaseTrigger::BeginDiagnosis).await,
            KioskCommand::NextPassage => self.next_passage().await.map(|_| ()),
            KioskCommand::PassageHint => self.passage_hint().await,
            KioskCommand::StartRecording => self.start_recording().await,
            KioskCommand::StopRecording => self.stop_recording().await.map(|_| ()),
            KioskCommand::GenerateReport {
                child_name,
                user_id,
            } => self.generate_report(&child_name, user_id).await,
            KioskCommand::DownloadReport {
                child_name,
                user_id,
            } => self.download_report(&child_name, user_id).await.map(|_| ()),
            KioskCommand::Reset => {
                self.reset().await;
                Ok(())
            }
        };

        match &result {
            // The story controller already announced completion.
            Err(KioskError::NoMorePassages(_)) => {}
            Err(err @ KioskError::SessionReset { .. }) => log_info!("{err}"),
            Err(err) => {
                log_warn!("action failed: {err}");
                self.deps.ui.status(StatusKind::Error, err.to_string());
            }
            Ok(()) => {}
        }
        result
    }

    /// Starts the camera and initialises the remote tracker. Calibration is
    /// only offered once both succeed.
    pub async fn initialize_system(&self) -> Result<(), KioskError> {
        let ui = &self.deps.ui;
        ui.control(Control::Initialize, false);
        ui.status(StatusKind::Info, "Starting camera...");

        let result = self.bring_up_tracker().await;
        if result.is_err() {
            ui.control(Control::Initialize, true);
            return result;
        }

        self.state.lock().await.system_ready = true;
        ui.control(Control::Calibrate, true);
        ui.status(StatusKind::Success, "System ready. Start calibration.");
        log_info!("camera and tracker ready");
        Ok(())
    }

    async fn bring_up_tracker(&self) -> Result<(), KioskError> {
        let tracker = &self.deps.tracker;
        tracker
            .start_capture()
            .await
            .map_err(|err| KioskError::setup(SetupStage::Camera, format!("{err:#}")))?;

        match tracker.init_tracker().await {
            Ok(Reply::Success(_)) => Ok(()),
            Ok(Reply::Rejected { message }) => {
                Err(KioskError::setup(SetupStage::TrackerInit, message))
            }
            Err(err) => Err(KioskError::setup(SetupStage::TrackerInit, format!("{err:#}"))),
        }
    }

    /// Releases the camera. Calibration stops and stays unavailable until
    /// the system is initialised again.
    pub async fn stop_camera(&self) -> Result<(), KioskError> {
        {
            let mut state = self.state.lock().await;
            state.calibration.cancel();
            state.system_ready = false;
        }

        let ui = &self.deps.ui;
        ui.control(Control::Calibrate, false);
        ui.control(Control::Initialize, true);
        self.deps
            .tracker
            .stop_capture()
            .await
            .map_err(|err| KioskError::setup(SetupStage::Camera, format!("{err:#}")))?;
        ui.status(StatusKind::Info, "Camera stopped.");
        log_info!("camera released");
        Ok(())
    }

    pub async fn start_calibration(&self) -> Result<(), KioskError> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, SessionPhase::Idle | SessionPhase::TextView) {
            return Err(KioskError::InvalidTransition {
                from: state.phase,
                trigger: "start calibration",
            });
        }
        if !state.system_ready {
            return Err(KioskError::setup(
                SetupStage::TrackerInit,
                "the tracker has not been initialised",
            ));
        }

        let settings = &self.deps.settings;
        let layout = CalibrationLayout::five_point(
            f64::from(settings.screen_width),
            f64::from(settings.screen_height),
        );
        state.calibration.start(layout)?;

        self.deps.ui.control(Control::Calibrate, false);
        self.deps.ui.status(
            StatusKind::Info,
            "Calibrating: look at each dot until it disappears.",
        );
        Ok(())
    }

    /// Shows the next passage and returns its index.
    pub async fn next_passage(&self) -> Result<usize, KioskError> {
        let mut state = self.state.lock().await;
        let phase = state.phase;
        match state.run.as_mut() {
            Some(run) if matches!(phase, SessionPhase::Reading | SessionPhase::Diagnosis) => {
                run.story.advance()
            }
            _ => Err(KioskError::InvalidTransition {
                from: phase,
                trigger: "advance the passage",
            }),
        }
    }

    /// The reader says they are done with the current passage.
    pub async fn passage_hint(&self) -> Result<(), KioskError> {
        let mut state = self.state.lock().await;
        let phase = state.phase;
        match state.run.as_mut() {
            Some(run) if matches!(phase, SessionPhase::Reading | SessionPhase::Diagnosis) => {
                run.story.hint_complete();
                Ok(())
            }
            _ => Err(KioskError::InvalidTransition {
                from: phase,
                trigger: "finish the passage",
            }),
        }
    }

    pub async fn start_recording(&self) -> Result<(), KioskError> {
        self.state.lock().await.recorder.start()?;

        let ui = &self.deps.ui;
        ui.control(Control::StartRecording, false);
        ui.control(Control::StopRecording, true);
        ui.emit(UiEvent::RecordingStatus { recording: true });
        ui.status(StatusKind::Info, "Recording... read the passage aloud.");
        Ok(())
    }

    /// Ends the take and submits it for analysis. The result is kept for the
    /// report.
    pub async fn stop_recording(&self) -> Result<AudioAnalysisResult, KioskError> {
        let (audio, epoch) = {
            let mut state = self.state.lock().await;
            (state.recorder.stop()?, state.epoch)
        };

        let ui = &self.deps.ui;
        ui.control(Control::StopRecording, false);
        ui.emit(UiEvent::RecordingStatus { recording: false });
        ui.status(StatusKind::Info, "Analysing speech...");

        let reply = self.deps.tracker.analyze_audio(audio).await;
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            log_warn!("dropping speech analysis from a reset session");
            return Err(KioskError::SessionReset {
                operation: "analyze_audio",
            });
        }
        ui.control(Control::StartRecording, true);
        let analysis = match reply {
            Ok(Reply::Success(analysis)) => analysis,
            Ok(Reply::Rejected { message }) => {
                return Err(KioskError::rejected("analyze_audio", message))
            }
            Err(err) => return Err(KioskError::from_request("analyze_audio", err)),
        };

        state.audio = Some(analysis.clone());
        drop(state);
        ui.control(Control::GenerateReport, true);
        ui.status(StatusKind::Success, "Speech analysis complete.");
        Ok(analysis)
    }

    /// Asks the authority for the structured diagnosis and moves to the
    /// report. A failed request leaves the phase where it was.
    pub async fn generate_report(
        &self,
        child_name: &str,
        user_id: Option<u32>,
    ) -> Result<(), KioskError> {
        let (request, epoch) = self
            .report_request(
                child_name,
                user_id,
                &[SessionPhase::Diagnosis, SessionPhase::Report],
                "generate the report",
            )
            .await?;

        let ui = &self.deps.ui;
        ui.control(Control::GenerateReport, false);
        ui.status(StatusKind::Info, "Generating report...");
        let reply = self.deps.tracker.generate_report(request).await;
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            log_warn!("dropping diagnosis for a reset session");
            return Err(KioskError::SessionReset {
                operation: "generate_report",
            });
        }
        ui.control(Control::GenerateReport, true);

        let diagnosis = match reply {
            Ok(Reply::Success(diagnosis)) => diagnosis,
            Ok(Reply::Rejected { message }) => {
                return Err(KioskError::rejected("generate_report", message))
            }
            Err(err) => return Err(KioskError::from_request("generate_report", err)),
        };

        self.apply(&mut state, PhaseTrigger::DiagnosisComplete(Some(diagnosis)))
            .await
    }

    /// Fetches the rendered PDF and saves it under the report directory.
    pub async fn download_report(
        &self,
        child_name: &str,
        user_id: Option<u32>,
    ) -> Result<PathBuf, KioskError> {
        let (request, _) = self
            .report_request(
                child_name,
                user_id,
                &[SessionPhase::Report],
                "download the report",
            )
            .await?;

        let ui = &self.deps.ui;
        ui.control(Control::DownloadReport, false);
        ui.status(StatusKind::Info, "Creating PDF...");
        let reply = self.deps.tracker.render_pdf(request).await;
        ui.control(Control::DownloadReport, true);

        let document = match reply {
            Ok(Reply::Success(document)) => document,
            Ok(Reply::Rejected { message }) => {
                return Err(KioskError::rejected("download_pdf_report", message))
            }
            Err(err) => return Err(KioskError::from_request("download_pdf_report", err)),
        };

        self.store_document(document.filename.as_deref(), &document.bytes)
            .await
    }

    /// Writes a document to the report directory and announces it.
    pub(crate) async fn store_document(
        &self,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, KioskError> {
        let path = save_document(&self.deps.settings.report_dir, filename, bytes)
            .await
            .map_err(|err| KioskError::Request {
                operation: "save_report",
                message: format!("{err:#}"),
            })?;

        log_info!("saved {} bytes to {}", bytes.len(), path.display());
        self.deps
            .ui
            .emit(UiEvent::DocumentSaved { path: path.clone() });
        self.deps.ui.status(
            StatusKind::Success,
            format!("Report saved to {}", path.display()),
        );
        Ok(path)
    }

    /// Builds the request from the current session, paired with the epoch
    /// it was built in.
    async fn report_request(
        &self,
        child_name: &str,
        user_id: Option<u32>,
        allowed: &[SessionPhase],
        action: &'static str,
    ) -> Result<(ReportRequest, u64), KioskError> {
        let child_name = child_name.trim();
        if child_name.is_empty() {
            return Err(KioskError::MissingChildName);
        }

        let state = self.state.lock().await;
        if !allowed.contains(&state.phase) {
            return Err(KioskError::InvalidTransition {
                from: state.phase,
                trigger: action,
            });
        }
        let request = ReportRequest {
            child_name: child_name.to_string(),
            user_id: user_id.unwrap_or(self.deps.settings.default_user_id),
            audio_result: state.audio.clone().unwrap_or_default(),
        };
        Ok((request, state.epoch))
    }
}

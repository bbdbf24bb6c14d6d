//! Notifications pushed by the tracking authority.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::KioskError;
use crate::events::{StatusKind, UiEvent};
use crate::tracker::wire::decode_document;
use crate::tracker::DiagnosisReport;

use super::controller::SessionController;
use super::phase::{PhaseTrigger, SessionPhase};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::authority";

use crate::{log_debug, log_info, log_warn};

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorityEvent {
    PhaseChanged(SessionPhase),
    /// Replacement text for the passage on screen.
    PassageData {
        title: String,
        body: String,
    },
    DiagnosisComplete(Option<DiagnosisReport>),
    /// Base64 JPEG, with or without a data-URL prefix.
    VideoFrame(String),
    DocumentReady {
        filename: Option<String>,
        data: String,
    },
}

impl AuthorityEvent {
    fn kind(&self) -> &'static str {
        match self {
            AuthorityEvent::PhaseChanged(_) => "phase_changed",
            AuthorityEvent::PassageData { .. } => "passage_data",
            AuthorityEvent::DiagnosisComplete(_) => "diagnosis_complete",
            AuthorityEvent::VideoFrame(_) => "video_frame",
            AuthorityEvent::DocumentReady { .. } => "document_ready",
        }
    }
}

impl SessionController {
    pub async fn handle_authority_event(&self, event: AuthorityEvent) -> Result<(), KioskError> {
        match event {
            AuthorityEvent::PhaseChanged(phase) => {
                self.trigger(PhaseTrigger::announcing(phase)).await
            }
            AuthorityEvent::DiagnosisComplete(diagnosis) => {
                self.trigger(PhaseTrigger::DiagnosisComplete(diagnosis)).await
            }
            AuthorityEvent::PassageData { title, body } => {
                let index = self.story_index().await;
                self.deps.ui.emit(UiEvent::PassageDisplayed {
                    index,
                    total: self.deps.catalog.len(),
                    title,
                    body,
                });
                Ok(())
            }
            AuthorityEvent::VideoFrame(data) => {
                let data_url = if data.starts_with("data:") {
                    data
                } else {
                    format!("{JPEG_DATA_URL_PREFIX}{data}")
                };
                self.deps.ui.emit(UiEvent::VideoFrame { data_url });
                Ok(())
            }
            AuthorityEvent::DocumentReady { filename, data } => {
                let bytes = decode_document(&data).map_err(|message| {
                    KioskError::MalformedResponse {
                        operation: "document_ready",
                        message,
                    }
                })?;
                self.store_document(filename.as_deref(), &bytes).await?;
                Ok(())
            }
        }
    }

    /// Applies authority events one at a time, in arrival order, until the
    /// sender goes away.
    pub fn spawn_event_pump(&self, mut events: mpsc::Receiver<AuthorityEvent>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let kind = event.kind();
                log_debug!("authority event {kind}");
                if let Err(err) = session.handle_authority_event(event).await {
                    log_warn!("authority event {kind} ignored: {err}");
                    session.deps.ui.status(StatusKind::Error, err.to_string());
                }
            }
            log_info!("authority channel closed");
        })
    }
}

pub mod calibration;
pub mod capture;
pub mod error;
pub mod events;
pub mod report;
pub mod sampling;
pub mod session;
pub mod settings;
pub mod story;
pub mod timer;
pub mod tracker;
pub mod utils;

#[cfg(test)]
mod testing;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use calibration::CalibrationStatus;
use capture::{SyntheticCamera, SyntheticMicrophone};
use events::{StatusKind, UiEmitter, UiEvent};
use session::{AuthorityEvent, KioskCommand, SessionController, SessionPhase};
use settings::{KioskSettings, SettingsStore};
use tracker::{JsonTrackerClient, SimulatedAuthority};
use utils::logging::{debug_enabled_from_env, init_logging};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk";

const DEMO_CHILD_NAME: &str = "Demo Reader";
const DEMO_PASSAGE_TIME: Duration = Duration::from_secs(3);
const DEMO_CAMERA_SIZE: (u32, u32) = (160, 120);

/// Runs one scripted session against the in-process authority.
pub fn run() -> anyhow::Result<()> {
    init_logging(debug_enabled_from_env());
    log_info!("reading kiosk starting up...");

    let store = SettingsStore::from_env()?;
    if store.ensure_written()? {
        log_info!("wrote default settings to {}", store.path().display());
    } else {
        log_info!("settings loaded from {}", store.path().display());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the async runtime")?;
    runtime.block_on(play_demo(store.settings()))
}

async fn play_demo(settings: KioskSettings) -> anyhow::Result<()> {
    let authority = SimulatedAuthority::new(rand::random())
        .with_latency(Duration::from_millis(20), Duration::from_millis(120));
    let tracker = Arc::new(JsonTrackerClient::new(Arc::new(authority)));
    let ui = UiEmitter::new();
    let ui_log = spawn_ui_logger(ui.subscribe());

    let (width, height) = DEMO_CAMERA_SIZE;
    let session = SessionController::new(
        tracker,
        Arc::new(SyntheticCamera::new(width, height)),
        Arc::new(SyntheticMicrophone::new()),
        ui,
        settings,
    );
    let (authority_tx, authority_rx) = mpsc::channel(16);
    let pump = session.spawn_event_pump(authority_rx);

    session.dispatch(KioskCommand::InitializeSystem).await?;
    session.dispatch(KioskCommand::StartSession).await?;
    session.dispatch(KioskCommand::StartCalibration).await?;
    let mut calibration = session.calibration_updates().await;
    calibration
        .wait_for(|status| *status == CalibrationStatus::Complete)
        .await
        .context("calibration status channel closed")?;

    session.dispatch(KioskCommand::BeginReading).await?;
    session.dispatch(KioskCommand::StartRecording).await?;
    // The authority repeating the current phase must not disturb the run.
    authority_tx
        .send(AuthorityEvent::PhaseChanged(SessionPhase::Reading))
        .await
        .context("authority channel closed")?;

    let passages = session.story_count();
    for _ in 1..passages {
        tokio::time::sleep(DEMO_PASSAGE_TIME).await;
        session.dispatch(KioskCommand::PassageHint).await?;
        session.dispatch(KioskCommand::NextPassage).await?;
    }
    tokio::time::sleep(DEMO_PASSAGE_TIME).await;

    session.dispatch(KioskCommand::BeginDiagnosis).await?;
    let countdown = u64::from(session.settings().countdown_ticks);
    tokio::time::sleep(Duration::from_secs(countdown)).await;
    session.dispatch(KioskCommand::StopRecording).await?;
    if let Some(snapshot) = session.sampling_snapshot().await {
        log_info!(
            "sampling: {} ticks, {} appended, {} dropped",
            snapshot.ticks,
            snapshot.appended,
            snapshot.dropped
        );
    }

    let child_name = DEMO_CHILD_NAME.to_string();
    session
        .dispatch(KioskCommand::GenerateReport {
            child_name: child_name.clone(),
            user_id: None,
        })
        .await?;
    if let Some(payload) = session.report().await {
        println!("{}", report::render_text(&payload));
    }
    session
        .dispatch(KioskCommand::DownloadReport {
            child_name,
            user_id: None,
        })
        .await?;

    session.dispatch(KioskCommand::Reset).await?;
    session.dispatch(KioskCommand::StopCamera).await?;
    drop(authority_tx);
    pump.await.context("authority event pump panicked")?;
    ui_log.abort();
    log_info!("demo session finished");
    Ok(())
}

/// Mirrors UI notifications into the log in place of a screen.
fn spawn_ui_logger(mut events: broadcast::Receiver<UiEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UiEvent::Status { kind, message }) => match kind {
                    StatusKind::Error => log_error!("[ui] {message}"),
                    _ => log_info!("[ui] {message}"),
                },
                Ok(UiEvent::PhaseChanged { phase, .. }) => log_info!("[ui] phase: {phase}"),
                Ok(UiEvent::DocumentSaved { path }) => {
                    log_info!("[ui] document saved: {}", path.display())
                }
                Ok(UiEvent::ReportReady { .. }) => log_info!("[ui] report ready"),
                Ok(event) => log_debug!("[ui] {event:?}"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log_warn!("[ui] display fell behind by {missed} events")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

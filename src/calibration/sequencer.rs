use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::capture::FrameCapture;
use crate::error::KioskError;
use crate::events::{StatusKind, UiEmitter, UiEvent};
use crate::timer::{ActiveTimers, TimerLease};
use crate::tracker::{CalibrationRequest, Reply, TrackerService};

use super::points::{CalibrationLayout, CalibrationPoint};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::calibration";

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStatus {
    NotStarted,
    Running,
    Complete,
}

/// Point counts for one finished pass. `visited` is always the layout size;
/// individual failures never stop the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CalibrationOutcome {
    pub visited: usize,
    pub accepted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTiming {
    /// How long a target stays up before its frame is captured.
    pub dwell: Duration,
    /// Pause after hiding a target.
    pub gap: Duration,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(3000),
            gap: Duration::from_millis(500),
        }
    }
}

struct CalibrationRun {
    handle: JoinHandle<Option<CalibrationOutcome>>,
    cancel_token: CancellationToken,
    lease: TimerLease,
}

pub struct CalibrationSequencer {
    timing: CalibrationTiming,
    capture: FrameCapture,
    tracker: Arc<dyn TrackerService>,
    ui: UiEmitter,
    timers: ActiveTimers,
    status_tx: watch::Sender<CalibrationStatus>,
    run: Option<CalibrationRun>,
}

impl CalibrationSequencer {
    pub fn new(
        timing: CalibrationTiming,
        capture: FrameCapture,
        tracker: Arc<dyn TrackerService>,
        ui: UiEmitter,
        timers: ActiveTimers,
    ) -> Self {
        let (status_tx, _status_rx) = watch::channel(CalibrationStatus::NotStarted);
        Self {
            timing,
            capture,
            tracker,
            ui,
            timers,
            status_tx,
            run: None,
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CalibrationStatus> {
        self.status_tx.subscribe()
    }

    /// Starts a pass over `layout`. Rejected while a pass is running.
    pub fn start(&mut self, layout: CalibrationLayout) -> Result<(), KioskError> {
        if self.status() == CalibrationStatus::Running {
            return Err(KioskError::CalibrationInProgress);
        }
        self.discard_finished();

        let cancel_token = CancellationToken::new();
        let lease = self.timers.lease();
        self.status_tx.send_replace(CalibrationStatus::Running);
        log_info!("calibration started over {} points", layout.len());

        let handle = tokio::spawn(calibration_task(
            layout,
            self.timing,
            self.capture.clone(),
            Arc::clone(&self.tracker),
            self.ui.clone(),
            self.status_tx.clone(),
            cancel_token.clone(),
            lease.clone(),
        ));

        self.run = Some(CalibrationRun {
            handle,
            cancel_token,
            lease,
        });
        Ok(())
    }

    /// Waits for the running pass. `None` when nothing ran or it was
    /// cancelled.
    pub async fn wait(&mut self) -> Option<CalibrationOutcome> {
        let run = self.run.take()?;
        match run.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_warn!("calibration task ended abnormally: {err}");
                None
            }
        }
    }

    /// Stops any pass in flight and forgets the result; status returns to
    /// `NotStarted`.
    pub fn cancel(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel_token.cancel();
            run.lease.release();
            run.handle.abort();
            log_debug!("calibration cancelled");
        }
        self.status_tx.send_replace(CalibrationStatus::NotStarted);
    }

    fn discard_finished(&mut self) {
        if let Some(run) = self.run.take() {
            run.lease.release();
        }
    }
}

impl Drop for CalibrationSequencer {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel_token.cancel();
            run.handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn calibration_task(
    layout: CalibrationLayout,
    timing: CalibrationTiming,
    capture: FrameCapture,
    tracker: Arc<dyn TrackerService>,
    ui: UiEmitter,
    status_tx: watch::Sender<CalibrationStatus>,
    cancel_token: CancellationToken,
    lease: TimerLease,
) -> Option<CalibrationOutcome> {
    let outcome = run_sequence(&layout, timing, &capture, tracker.as_ref(), &ui, &cancel_token).await;
    lease.release();

    let outcome = outcome?;
    status_tx.send_replace(CalibrationStatus::Complete);
    log_info!(
        "calibration complete: {}/{} points accepted",
        outcome.accepted,
        outcome.visited
    );

    let kind = if outcome.failed == 0 {
        StatusKind::Success
    } else {
        StatusKind::Info
    };
    ui.status(
        kind,
        format!(
            "Calibration complete ({} of {} points accepted)",
            outcome.accepted, outcome.visited
        ),
    );
    ui.emit(UiEvent::CalibrationCompleted { outcome });
    Some(outcome)
}

async fn run_sequence(
    layout: &CalibrationLayout,
    timing: CalibrationTiming,
    capture: &FrameCapture,
    tracker: &dyn TrackerService,
    ui: &UiEmitter,
    cancel_token: &CancellationToken,
) -> Option<CalibrationOutcome> {
    let mut outcome = CalibrationOutcome::default();

    for &point in layout.points() {
        ui.emit(UiEvent::CalibrationTarget {
            point,
            visible: true,
        });
        if !pause(timing.dwell, cancel_token).await {
            return None;
        }

        outcome.visited += 1;
        match calibrate_point(capture, tracker, point).await {
            Ok(stored) => {
                outcome.accepted += 1;
                log_debug!("point {} accepted; authority holds {stored}", point.index);
            }
            Err(err) => {
                outcome.failed += 1;
                log_warn!("calibration point {} failed: {err:#}", point.index);
            }
        }

        ui.emit(UiEvent::CalibrationTarget {
            point,
            visible: false,
        });
        if !pause(timing.gap, cancel_token).await {
            return None;
        }
    }

    Some(outcome)
}

async fn calibrate_point(
    capture: &FrameCapture,
    tracker: &dyn TrackerService,
    point: CalibrationPoint,
) -> Result<usize> {
    let image = capture.capture()?;
    let request = CalibrationRequest {
        image,
        target_x: point.screen_x,
        target_y: point.screen_y,
    };
    match tracker.submit_calibration(request).await? {
        Reply::Success(stored) => Ok(stored),
        Reply::Rejected { message } => bail!("rejected: {message}"),
    }
}

/// False when cancelled before the delay elapsed.
async fn pause(delay: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel_token.cancelled() => false,
    }
}

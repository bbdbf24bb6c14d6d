use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::FrameCapture;
use crate::events::{UiEmitter, UiEvent};
use crate::story::StoryCursor;
use crate::tracker::{GazeEstimate, Reply, TrackerService};

use super::log::{GazeSample, SessionLogWriter};
use super::metrics::{RequestMetrics, RequestOutcome, SamplingMetrics};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::sampling";

use crate::{log_debug, log_info};

/// Everything a tick needs; shared by the in-flight requests of one run.
pub(crate) struct SamplingContext {
    pub capture: FrameCapture,
    pub tracker: Arc<dyn TrackerService>,
    pub cursor: StoryCursor,
    pub writer: SessionLogWriter,
    pub ui: UiEmitter,
    pub metrics: SamplingMetrics,
    pub run_started: Instant,
}

pub(crate) async fn sampling_loop(
    ctx: Arc<SamplingContext>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // A slow reply must not hold up the next tick, so each request runs in
    // its own task.
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ctx.metrics.record_tick().await;
                in_flight.spawn(sample_once(Arc::clone(&ctx), cancel_token.clone()));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }

    // Requests still out finish on their own; the writer turns their
    // results away.
    in_flight.detach_all();
}

async fn sample_once(ctx: Arc<SamplingContext>, cancel_token: CancellationToken) {
    let story_index = ctx.cursor.current();
    let captured_at = Utc::now();
    let elapsed_secs = ctx.run_started.elapsed().as_secs();
    let request_start = Instant::now();

    let outcome = match request_estimate(&ctx).await {
        Ok(estimate) => {
            let sample = GazeSample {
                direction: estimate.direction,
                confidence: estimate.confidence,
                error_offset_px: estimate.error_offset_px,
                story_index,
                captured_at_ms: captured_at.timestamp_millis(),
            };
            if ctx.writer.append(sample) {
                ctx.ui.emit(UiEvent::GazeSample {
                    direction: sample.direction,
                    confidence: sample.confidence,
                    error_offset_px: sample.error_offset_px,
                    story_index,
                    elapsed_secs,
                });
                RequestOutcome::Appended
            } else {
                log_debug!("estimate arrived after stop; discarded");
                RequestOutcome::DiscardedAfterStop
            }
        }
        Err(err) if cancel_token.is_cancelled() => {
            log_debug!("tick failed after stop: {err:#}");
            RequestOutcome::DiscardedAfterStop
        }
        Err(err) => {
            log_debug!("tick dropped: {err:#}");
            RequestOutcome::Dropped
        }
    };

    ctx.metrics
        .record_request(RequestMetrics {
            captured_at,
            round_trip_ms: request_start.elapsed().as_millis() as u64,
            outcome,
        })
        .await;
}

async fn request_estimate(ctx: &SamplingContext) -> Result<GazeEstimate> {
    let frame = ctx.capture.capture()?;
    match ctx.tracker.track_frame(frame).await? {
        Reply::Success(estimate) => Ok(estimate),
        Reply::Rejected { message } => Err(anyhow!("estimate rejected: {message}")),
    }
}

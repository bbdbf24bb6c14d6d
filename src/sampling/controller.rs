use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capture::FrameCapture;
use crate::events::UiEmitter;
use crate::story::StoryCursor;
use crate::timer::{ActiveTimers, TimerLease};
use crate::tracker::TrackerService;

use super::log::SessionLog;
use super::loop_worker::{sampling_loop, SamplingContext};
use super::metrics::SamplingMetrics;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::sampling";

use crate::log_info;

pub struct SamplingController {
    period: Duration,
    capture: FrameCapture,
    tracker: Arc<dyn TrackerService>,
    ui: UiEmitter,
    timers: ActiveTimers,
    metrics: SamplingMetrics,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    lease: Option<TimerLease>,
}

impl SamplingController {
    pub fn new(
        period: Duration,
        capture: FrameCapture,
        tracker: Arc<dyn TrackerService>,
        ui: UiEmitter,
        timers: ActiveTimers,
    ) -> Self {
        Self {
            period,
            capture,
            tracker,
            ui,
            timers,
            metrics: SamplingMetrics::new(),
            handle: None,
            cancel_token: None,
            lease: None,
        }
    }

    pub fn metrics(&self) -> SamplingMetrics {
        self.metrics.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts polling into `log`, tagging each sample from `cursor`. A loop
    /// that is already running is stopped first.
    pub async fn start(&mut self, cursor: StoryCursor, log: &SessionLog) -> Result<()> {
        if self.handle.is_some() {
            log_info!("sampling restart requested; stopping the previous loop");
            self.stop().await?;
        }

        let cancel_token = CancellationToken::new();
        let ctx = Arc::new(SamplingContext {
            capture: self.capture.clone(),
            tracker: Arc::clone(&self.tracker),
            cursor,
            writer: log.writer(cancel_token.clone()),
            ui: self.ui.clone(),
            metrics: self.metrics.clone(),
            run_started: Instant::now(),
        });

        let handle = tokio::spawn(sampling_loop(ctx, self.period, cancel_token.clone()));
        log_info!("sampling every {}ms", self.period.as_millis());

        self.lease = Some(self.timers.lease());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(lease) = self.lease.take() {
            lease.release();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for SamplingController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{StoryCatalog, StoryController};
    use crate::testing::{estimate, tiny_capture, GazeStep, ScriptedTracker};
    use crate::tracker::GazeDirection;
    use tokio::time;

    struct Rig {
        tracker: Arc<ScriptedTracker>,
        timers: ActiveTimers,
        story: StoryController,
        sampling: SamplingController,
        log: SessionLog,
    }

    fn rig() -> Rig {
        let tracker = ScriptedTracker::new();
        let ui = UiEmitter::new();
        let timers = ActiveTimers::new();
        let story = StoryController::new(
            Arc::new(StoryCatalog::reference()),
            Duration::from_secs(20),
            ui.clone(),
            timers.clone(),
        );
        let sampling = SamplingController::new(
            Duration::from_millis(500),
            tiny_capture(),
            Arc::clone(&tracker) as Arc<dyn TrackerService>,
            ui,
            timers.clone(),
        );
        Rig {
            tracker,
            timers,
            story,
            sampling,
            log: SessionLog::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_every_period_and_tags_the_story_at_capture() {
        let mut rig = rig();
        rig.story.enter();
        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();

        time::sleep(Duration::from_millis(2_100)).await;
        rig.story.advance().unwrap();
        time::sleep(Duration::from_millis(3_100)).await;
        rig.sampling.stop().await.unwrap();

        let tags: Vec<usize> = rig.log.snapshot().iter().map(|s| s.story_index).collect();
        assert_eq!(tags, vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);

        let snapshot = rig.sampling.metrics().snapshot().await;
        assert_eq!(snapshot.ticks, 10);
        assert_eq!(snapshot.appended, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_are_dropped_silently() {
        let mut rig = rig();
        rig.tracker.script_gaze([
            GazeStep::TransportError,
            GazeStep::Rejected,
            GazeStep::Estimate(estimate(GazeDirection::Left, 0.7)),
        ]);
        rig.story.enter();
        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();

        time::sleep(Duration::from_millis(2_200)).await;
        rig.sampling.stop().await.unwrap();

        let samples = rig.log.snapshot();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].direction, GazeDirection::Left);
        assert_eq!(rig.sampling.metrics().snapshot().await.dropped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replies_after_stop_are_discarded() {
        let mut rig = rig();
        rig.tracker.script_gaze([GazeStep::Delayed(
            Duration::from_secs(2),
            estimate(GazeDirection::Right, 0.9),
        )]);
        rig.story.enter();
        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();

        time::sleep(Duration::from_millis(700)).await;
        rig.sampling.stop().await.unwrap();
        time::sleep(Duration::from_secs(5)).await;

        assert!(rig.log.is_empty());
        assert_eq!(rig.tracker.gaze_requests.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            rig.sampling.metrics().snapshot().await.discarded_after_stop,
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_replies_do_not_delay_later_ticks() {
        let mut rig = rig();
        rig.tracker.script_gaze([GazeStep::Delayed(
            Duration::from_millis(1_200),
            estimate(GazeDirection::Left, 0.6),
        )]);
        rig.story.enter();
        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();

        time::sleep(Duration::from_millis(2_100)).await;
        rig.sampling.stop().await.unwrap();

        let directions: Vec<GazeDirection> =
            rig.log.snapshot().iter().map(|s| s.direction).collect();
        assert_eq!(
            directions,
            vec![
                GazeDirection::Center,
                GazeDirection::Center,
                GazeDirection::Left,
                GazeDirection::Center,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_keeps_a_single_loop() {
        let mut rig = rig();
        rig.story.enter();
        rig.story.stop();

        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();
        rig.sampling.start(rig.story.cursor(), &rig.log).await.unwrap();
        assert_eq!(rig.timers.count(), 1);

        time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(
            rig.tracker.gaze_requests.load(std::sync::atomic::Ordering::SeqCst),
            4
        );

        rig.sampling.stop().await.unwrap();
        assert_eq!(rig.timers.count(), 0);
        assert!(!rig.sampling.is_running());
    }
}

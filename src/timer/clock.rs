use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ClockStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Wall time spent in a phase. Elapsed time is derived from the running
/// anchor so the 1 Hz display ticks never accumulate drift.
#[derive(Debug, Clone, Default)]
pub struct ElapsedClock {
    pub status: ClockStatus,
    /// Time accumulated from earlier running windows; combines with
    /// `running_anchor` to compute the true elapsed duration.
    elapsed_ms_baseline: u64,
    running_anchor: Option<Instant>,
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: Instant) {
        *self = Self {
            status: ClockStatus::Running,
            elapsed_ms_baseline: 0,
            running_anchor: Some(now),
        };
    }

    pub fn elapsed_ms(&self) -> u64 {
        match (self.status, self.running_anchor) {
            (ClockStatus::Running, Some(anchor)) => self
                .elapsed_ms_baseline
                .saturating_add(anchor.elapsed().as_millis() as u64),
            _ => self.elapsed_ms_baseline,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_ms() / 1000
    }

    pub fn stop(&mut self) {
        self.elapsed_ms_baseline = self.elapsed_ms();
        self.status = ClockStatus::Stopped;
        self.running_anchor = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// An [`ElapsedClock`] that the session and its display ticker read
/// together. Clones share one clock.
#[derive(Debug, Clone, Default)]
pub struct SharedClock {
    inner: Arc<Mutex<ElapsedClock>>,
}

impl SharedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, now: Instant) {
        self.lock().start(now);
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.lock().elapsed_secs()
    }

    pub fn status(&self) -> ClockStatus {
        self.lock().status
    }

    fn lock(&self) -> MutexGuard<'_, ElapsedClock> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `"2m 5s"`, or `"45s"` under a minute.
pub fn format_elapsed(total_secs: u64) -> String {
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_elapsed_time() {
        let mut clock = ElapsedClock::new();
        clock.start(Instant::now());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(clock.elapsed_secs(), 2);

        clock.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(clock.elapsed_ms(), 2500);
        assert_eq!(clock.status, ClockStatus::Stopped);

        clock.reset();
        assert_eq!(clock.elapsed_ms(), 0);
        assert_eq!(clock.status, ClockStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_clock() {
        let clock = SharedClock::new();
        let display = clock.clone();
        clock.start(Instant::now());

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(display.elapsed_secs(), 1);

        clock.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(display.elapsed_secs(), 1);
        assert_eq!(display.status(), ClockStatus::Stopped);
    }

    #[test]
    fn formats_minutes_only_when_present() {
        assert_eq!(format_elapsed(45), "45s");
        assert_eq!(format_elapsed(125), "2m 5s");
        assert_eq!(format_elapsed(0), "0s");
    }
}

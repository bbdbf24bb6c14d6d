use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Counts the timers and loops that are currently armed. Shared by every
/// owner in one session so tests can assert that re-entering a phase never
/// leaves a duplicate behind.
#[derive(Clone, Default)]
pub struct ActiveTimers {
    live: Arc<AtomicUsize>,
}

impl ActiveTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Registers one armed timer. The count drops when the lease is
    /// released or when the last clone of it is dropped, whichever is first.
    pub fn lease(&self) -> TimerLease {
        self.live.fetch_add(1, Ordering::SeqCst);
        TimerLease {
            inner: Arc::new(LeaseInner {
                live: Arc::clone(&self.live),
                released: AtomicBool::new(false),
            }),
        }
    }
}

struct LeaseInner {
    live: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl LeaseInner {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct TimerLease {
    inner: Arc<LeaseInner>,
}

impl TimerLease {
    pub fn release(&self) {
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

/// What a periodic callback wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

struct ArmedTimer {
    handle: JoinHandle<()>,
    token: CancellationToken,
    lease: TimerLease,
}

/// A single-owner handle for one kind of timer (the reading clock, the
/// diagnosis countdown, the passage reveal).
///
/// Arming a slot cancels whatever it held before, so an owner that re-enters
/// its phase cannot end up with two copies running. Every arm bumps the slot
/// generation; a task that wakes up after its generation was superseded or
/// its token was cancelled exits without running the callback.
pub struct TimerSlot {
    name: &'static str,
    generation: Arc<AtomicU64>,
    armed: Option<ArmedTimer>,
    timers: ActiveTimers,
}

impl TimerSlot {
    pub fn new(name: &'static str, timers: ActiveTimers) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            armed: None,
            timers,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs `on_tick` every `period`, first firing one period from now. The
    /// tick number passed to the callback starts at 1.
    pub fn every<F>(&mut self, period: Duration, mut on_tick: F)
    where
        F: FnMut(u64) -> TickFlow + Send + 'static,
    {
        let (generation, token, lease) = self.rearm();
        let slot_generation = Arc::clone(&self.generation);
        let task_token = token.clone();
        let task_lease = lease.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = task_token.cancelled() => break,
                }
                if task_token.is_cancelled()
                    || slot_generation.load(Ordering::SeqCst) != generation
                {
                    break;
                }
                ticks += 1;
                if on_tick(ticks) == TickFlow::Stop {
                    break;
                }
            }
            task_lease.release();
        });

        self.armed = Some(ArmedTimer {
            handle,
            token,
            lease,
        });
    }

    /// Runs `on_fire` once after `delay`.
    pub fn after<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (generation, token, lease) = self.rearm();
        let slot_generation = Arc::clone(&self.generation);
        let task_token = token.clone();
        let task_lease = lease.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    if !task_token.is_cancelled()
                        && slot_generation.load(Ordering::SeqCst) == generation
                    {
                        on_fire();
                    }
                }
                _ = task_token.cancelled() => {}
            }
            task_lease.release();
        });

        self.armed = Some(ArmedTimer {
            handle,
            token,
            lease,
        });
    }

    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(armed) = self.armed.take() {
            armed.token.cancel();
            armed.lease.release();
            armed.handle.abort();
        }
    }

    /// True while the slot holds a timer that has not finished or been
    /// cancelled.
    pub fn is_armed(&self) -> bool {
        self.armed
            .as_ref()
            .map(|armed| !armed.lease.is_released())
            .unwrap_or(false)
    }

    fn rearm(&mut self) -> (u64, CancellationToken, TimerLease) {
        self.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, CancellationToken::new(), self.timers.lease())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn periodic_slot_fires_once_per_period() {
        let timers = ActiveTimers::new();
        let mut slot = TimerSlot::new("clock", timers.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        slot.every(Duration::from_secs(1), move |tick| {
            sink.lock().unwrap().push(tick);
            TickFlow::Continue
        });

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(timers.count(), 1);

        slot.cancel();
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(timers.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_timer() {
        let timers = ActiveTimers::new();
        let mut slot = TimerSlot::new("clock", timers.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            slot.every(Duration::from_secs(1), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                TickFlow::Continue
            });
            assert_eq!(timers.count(), 1);
        }

        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_from_the_callback_releases_the_lease() {
        let timers = ActiveTimers::new();
        let mut slot = TimerSlot::new("countdown", timers.clone());

        slot.every(Duration::from_secs(1), |tick| {
            if tick >= 2 {
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        });

        time::sleep(Duration::from_millis(2500)).await;
        assert!(!slot.is_armed());
        assert_eq!(timers.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_one_shot_never_fires() {
        let timers = ActiveTimers::new();
        let mut slot = TimerSlot::new("reveal", timers.clone());
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        slot.after(Duration::from_secs(20), move || flag.store(true, Ordering::SeqCst));
        time::sleep(Duration::from_secs(10)).await;
        slot.cancel();
        time::sleep(Duration::from_secs(30)).await;

        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(timers.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_after_delay() {
        let timers = ActiveTimers::new();
        let mut slot = TimerSlot::new("reveal", timers.clone());
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        slot.after(Duration::from_secs(20), move || flag.store(true, Ordering::SeqCst));
        time::sleep(Duration::from_millis(19_900)).await;
        assert!(!fired.load(Ordering::SeqCst));
        time::sleep(Duration::from_millis(200)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(timers.count(), 0);
    }
}

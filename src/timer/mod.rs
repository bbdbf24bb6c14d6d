pub mod clock;
pub mod slot;

pub use clock::{format_elapsed, ClockStatus, ElapsedClock, SharedClock};
pub use slot::{ActiveTimers, TickFlow, TimerLease, TimerSlot};

pub mod authority;
pub mod commands;
pub mod controller;
pub mod export;
pub mod phase;
mod state;

pub use authority::AuthorityEvent;
pub use commands::KioskCommand;
pub use controller::SessionController;
pub use phase::{PhaseControls, PhaseTrigger, SessionPhase, Transition};
pub use state::TrackingRun;

pub mod controller;
pub mod log;
mod loop_worker;
pub mod metrics;

pub use controller::SamplingController;
pub use log::{GazeSample, SessionLog, SessionLogWriter};
pub use metrics::{RequestMetrics, RequestOutcome, SamplingMetrics, SamplingSnapshot};

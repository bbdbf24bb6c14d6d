//! Turns a finished run into the report the kiosk shows. Nothing in here
//! does I/O or reads the clock.

pub mod bands;
pub mod compiler;
pub mod parse;
pub mod render;

pub use bands::{Band, Metric, MetricBand};
pub use compiler::{compile_report, DirectionCounts, Feedback, ReportPayload};
pub use parse::parse_metric;
pub use render::render_text;

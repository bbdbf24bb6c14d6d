pub mod points;
pub mod sequencer;

pub use points::{CalibrationLayout, CalibrationPoint, MARGIN_PX};
pub use sequencer::{
    CalibrationOutcome, CalibrationSequencer, CalibrationStatus, CalibrationTiming,
};

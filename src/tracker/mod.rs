mod diagnosis;
pub mod service;
pub mod simulated;
pub mod types;
pub mod wire;

pub use service::{JsonTrackerClient, JsonTransport, RequestBody, TrackerService};
pub use simulated::SimulatedAuthority;
pub use types::{
    AudioAnalysisResult, CalibrationRequest, DiagnosisBody, DiagnosisReport, EyeTrackingSummary,
    FeedbackSummary, GazeDirection, GazeEstimate, PdfDocument, ReadingResults, Reply,
    ReportRequest, SpeechSummary,
};
pub use wire::MalformedPayload;

//! Scripted fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::capture::{EncodedFrame, FrameCapture, FrameSource, RawFrame};
use crate::tracker::{
    AudioAnalysisResult, CalibrationRequest, DiagnosisReport, GazeDirection, GazeEstimate,
    PdfDocument, Reply, ReportRequest, TrackerService,
};

pub struct TinyCamera;

impl FrameSource for TinyCamera {
    fn grab(&self) -> Result<RawFrame> {
        Ok(RawFrame {
            width: 4,
            height: 4,
            rgb: vec![90; 4 * 4 * 3],
        })
    }
}

pub struct BrokenCamera;

impl FrameSource for BrokenCamera {
    fn grab(&self) -> Result<RawFrame> {
        bail!("camera unplugged")
    }
}

pub fn tiny_capture() -> FrameCapture {
    FrameCapture::new(Arc::new(TinyCamera), 70)
}

pub fn estimate(direction: GazeDirection, confidence: f64) -> GazeEstimate {
    GazeEstimate {
        direction,
        confidence,
        error_offset_px: Some(12.0),
    }
}

/// One scripted reply to `track_frame`.
#[derive(Debug, Clone)]
pub enum GazeStep {
    Estimate(GazeEstimate),
    Rejected,
    TransportError,
    Delayed(Duration, GazeEstimate),
}

/// A tracker whose replies are set up front. Unscripted gaze requests get a
/// centred estimate with confidence 0.8.
#[derive(Default)]
pub struct ScriptedTracker {
    pub calls: Mutex<Vec<&'static str>>,
    pub calibration_targets: Mutex<Vec<(f64, f64)>>,
    pub gaze_requests: AtomicUsize,
    gaze: Mutex<VecDeque<GazeStep>>,
    fail_calibration: AtomicBool,
    reject_start_tracking: AtomicBool,
    fail_camera: AtomicBool,
    audio: Mutex<Option<Reply<AudioAnalysisResult>>>,
    report: Mutex<Option<Result<Reply<DiagnosisReport>, String>>>,
    pdf: Mutex<Option<PdfDocument>>,
    last_report_request: Mutex<Option<ReportRequest>>,
    slow_replies: Mutex<Option<Duration>>,
}

impl ScriptedTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_gaze(&self, steps: impl IntoIterator<Item = GazeStep>) {
        self.gaze.lock().unwrap().extend(steps);
    }

    pub fn fail_calibration(&self) {
        self.fail_calibration.store(true, Ordering::SeqCst);
    }

    pub fn reject_start_tracking(&self) {
        self.reject_start_tracking.store(true, Ordering::SeqCst);
    }

    pub fn fail_camera(&self) {
        self.fail_camera.store(true, Ordering::SeqCst);
    }

    pub fn set_audio(&self, reply: Reply<AudioAnalysisResult>) {
        *self.audio.lock().unwrap() = Some(reply);
    }

    pub fn set_report(&self, reply: Result<Reply<DiagnosisReport>, String>) {
        *self.report.lock().unwrap() = Some(reply);
    }

    /// Holds speech analysis and report replies back for `delay`.
    pub fn slow_replies(&self, delay: Duration) {
        *self.slow_replies.lock().unwrap() = Some(delay);
    }

    pub fn set_pdf(&self, document: PdfDocument) {
        *self.pdf.lock().unwrap() = Some(document);
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == name)
            .count()
    }

    pub fn last_report_request(&self) -> Option<ReportRequest> {
        self.last_report_request.lock().unwrap().clone()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    async fn pause(&self) {
        let delay = *self.slow_replies.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TrackerService for ScriptedTracker {
    async fn start_capture(&self) -> Result<()> {
        self.record("start_capture");
        if self.fail_camera.load(Ordering::SeqCst) {
            bail!("permission denied");
        }
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        self.record("stop_capture");
        Ok(())
    }

    async fn init_tracker(&self) -> Result<Reply<String>> {
        self.record("init_tracker");
        Ok(Reply::Success("initialised".into()))
    }

    async fn submit_calibration(&self, request: CalibrationRequest) -> Result<Reply<usize>> {
        self.record("submit_calibration");
        let mut targets = self.calibration_targets.lock().unwrap();
        targets.push((request.target_x, request.target_y));
        if self.fail_calibration.load(Ordering::SeqCst) {
            return Ok(Reply::rejected("no face detected"));
        }
        Ok(Reply::Success(targets.len()))
    }

    async fn start_tracking(&self) -> Result<Reply<String>> {
        self.record("start_tracking");
        if self.reject_start_tracking.load(Ordering::SeqCst) {
            return Ok(Reply::rejected("at least 4 calibration points are required"));
        }
        Ok(Reply::Success("tracking".into()))
    }

    async fn stop_tracking(&self) -> Result<Reply<String>> {
        self.record("stop_tracking");
        Ok(Reply::Success("stopped".into()))
    }

    async fn track_frame(&self, _frame: EncodedFrame) -> Result<Reply<GazeEstimate>> {
        self.gaze_requests.fetch_add(1, Ordering::SeqCst);
        let step = self.gaze.lock().unwrap().pop_front();
        match step {
            None => Ok(Reply::Success(estimate(GazeDirection::Center, 0.8))),
            Some(GazeStep::Estimate(estimate)) => Ok(Reply::Success(estimate)),
            Some(GazeStep::Rejected) => Ok(Reply::rejected("no face")),
            Some(GazeStep::TransportError) => Err(anyhow!("connection reset")),
            Some(GazeStep::Delayed(delay, estimate)) => {
                tokio::time::sleep(delay).await;
                Ok(Reply::Success(estimate))
            }
        }
    }

    async fn analyze_audio(&self, _audio: Vec<u8>) -> Result<Reply<AudioAnalysisResult>> {
        self.record("analyze_audio");
        self.pause().await;
        Ok(self
            .audio
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Reply::Success(AudioAnalysisResult::default())))
    }

    async fn generate_report(&self, request: ReportRequest) -> Result<Reply<DiagnosisReport>> {
        self.record("generate_report");
        *self.last_report_request.lock().unwrap() = Some(request);
        self.pause().await;
        match self.report.lock().unwrap().clone() {
            None => Ok(Reply::Success(DiagnosisReport::default())),
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
        }
    }

    async fn render_pdf(&self, request: ReportRequest) -> Result<Reply<PdfDocument>> {
        self.record("render_pdf");
        *self.last_report_request.lock().unwrap() = Some(request);
        Ok(Reply::Success(self.pdf.lock().unwrap().clone().unwrap_or(
            PdfDocument {
                bytes: b"%PDF-1.4 scripted".to_vec(),
                filename: None,
            },
        )))
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capture::EncodedFrame;

use super::types::{
    AudioAnalysisResult, CalibrationRequest, DiagnosisReport, GazeEstimate, PdfDocument, Reply,
    ReportRequest,
};
use super::wire;

/// The remote tracking and analysis authority.
///
/// Transport failures come back as `Err`; a well-formed refusal is
/// `Ok(Reply::Rejected)`. Implementations must validate reply shapes and
/// report bad ones as [`wire::MalformedPayload`].
#[async_trait]
pub trait TrackerService: Send + Sync {
    /// Idempotent.
    async fn start_capture(&self) -> Result<()>;
    /// Idempotent.
    async fn stop_capture(&self) -> Result<()>;
    async fn init_tracker(&self) -> Result<Reply<String>>;
    async fn submit_calibration(&self, request: CalibrationRequest) -> Result<Reply<usize>>;
    async fn start_tracking(&self) -> Result<Reply<String>>;
    async fn stop_tracking(&self) -> Result<Reply<String>>;
    async fn track_frame(&self, frame: EncodedFrame) -> Result<Reply<GazeEstimate>>;
    async fn analyze_audio(&self, audio: Vec<u8>) -> Result<Reply<AudioAnalysisResult>>;
    async fn generate_report(&self, request: ReportRequest) -> Result<Reply<DiagnosisReport>>;
    async fn render_pdf(&self, request: ReportRequest) -> Result<Reply<PdfDocument>>;
}

/// Request bodies as the authority's endpoints expect them.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Audio(Vec<u8>),
}

/// Raw request/response exchange with the authority. HTTP, an in-process
/// simulation, or a recorded script all fit behind this.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn post(&self, endpoint: &str, body: RequestBody) -> Result<String>;
}

/// [`TrackerService`] over a [`JsonTransport`], decoding replies with
/// [`wire`].
#[derive(Clone)]
pub struct JsonTrackerClient {
    transport: Arc<dyn JsonTransport>,
}

impl JsonTrackerClient {
    pub fn new(transport: Arc<dyn JsonTransport>) -> Self {
        Self { transport }
    }

    async fn exchange(&self, endpoint: &str, body: RequestBody) -> Result<String> {
        self.transport
            .post(endpoint, body)
            .await
            .with_context(|| format!("POST {endpoint}"))
    }
}

#[async_trait]
impl TrackerService for JsonTrackerClient {
    async fn start_capture(&self) -> Result<()> {
        let body = self.exchange("/start_camera", RequestBody::Empty).await?;
        wire::parse_ack("start_camera", &body)?
            .into_result()
            .map(|_| ())
            .map_err(anyhow::Error::msg)
    }

    async fn stop_capture(&self) -> Result<()> {
        let body = self.exchange("/stop_camera", RequestBody::Empty).await?;
        wire::parse_ack("stop_camera", &body)?
            .into_result()
            .map(|_| ())
            .map_err(anyhow::Error::msg)
    }

    async fn init_tracker(&self) -> Result<Reply<String>> {
        let body = self.exchange("/init_tracker", RequestBody::Empty).await?;
        Ok(wire::parse_ack("init_tracker", &body)?)
    }

    async fn submit_calibration(&self, request: CalibrationRequest) -> Result<Reply<usize>> {
        let payload = json!({
            "frame": request.image.into_data_url(),
            "target_x": request.target_x,
            "target_y": request.target_y,
        });
        let body = self.exchange("/calibrate", RequestBody::Json(payload)).await?;
        Ok(wire::parse_calibration_ack(&body)?)
    }

    async fn start_tracking(&self) -> Result<Reply<String>> {
        let body = self.exchange("/start_tracking", RequestBody::Empty).await?;
        Ok(wire::parse_ack("start_tracking", &body)?)
    }

    async fn stop_tracking(&self) -> Result<Reply<String>> {
        let body = self.exchange("/stop_tracking", RequestBody::Empty).await?;
        Ok(wire::parse_ack("stop_tracking", &body)?)
    }

    async fn track_frame(&self, frame: EncodedFrame) -> Result<Reply<GazeEstimate>> {
        let payload = json!({ "frame": frame.into_data_url() });
        let body = self.exchange("/track_gaze", RequestBody::Json(payload)).await?;
        Ok(wire::parse_gaze_estimate(&body)?)
    }

    async fn analyze_audio(&self, audio: Vec<u8>) -> Result<Reply<AudioAnalysisResult>> {
        let body = self
            .exchange("/analyze_audio", RequestBody::Audio(audio))
            .await?;
        Ok(wire::parse_audio_analysis(&body)?)
    }

    async fn generate_report(&self, request: ReportRequest) -> Result<Reply<DiagnosisReport>> {
        let payload = serde_json::to_value(&request).context("encoding report request")?;
        let body = self
            .exchange("/generate_report", RequestBody::Json(payload))
            .await?;
        Ok(wire::parse_diagnosis_report(&body)?)
    }

    async fn render_pdf(&self, request: ReportRequest) -> Result<Reply<PdfDocument>> {
        let payload = serde_json::to_value(&request).context("encoding report request")?;
        let body = self
            .exchange("/download_pdf_report", RequestBody::Json(payload))
            .await?;
        Ok(wire::parse_pdf_document(&body)?)
    }
}

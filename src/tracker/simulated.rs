//! An in-process stand-in for the tracking authority. It answers the same
//! endpoints with the same JSON shapes, so everything above the transport
//! runs exactly as it would against the real service.

use std::{sync::Mutex, time::Duration};

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};

use super::diagnosis::{compile_diagnosis, TrackedResult};
use super::service::{JsonTransport, RequestBody};
use super::types::{AudioAnalysisResult, DiagnosisReport, GazeDirection};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::authority";

use crate::{log_debug, log_info};

/// Tracking needs at least this many calibration points.
const MIN_CALIBRATION_POINTS: usize = 4;

#[derive(Default)]
struct AuthorityState {
    capturing: bool,
    initialized: bool,
    calibration_points: Vec<(f64, f64)>,
    tracking: bool,
    tracked: Vec<TrackedResult>,
}

pub struct SimulatedAuthority {
    state: Mutex<AuthorityState>,
    rng: Mutex<StdRng>,
    latency: Option<(Duration, Duration)>,
}

impl SimulatedAuthority {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(AuthorityState::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            latency: None,
        }
    }

    /// Each reply is delayed by a random amount in `[min, max)`, which lets
    /// replies overtake each other.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        if max > min {
            self.latency = Some((min, max));
        }
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AuthorityState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn respond(&self, endpoint: &str, body: RequestBody) -> Result<Value> {
        match endpoint {
            "/start_camera" => {
                self.state().capturing = true;
                Ok(success("camera started"))
            }
            "/stop_camera" => {
                self.state().capturing = false;
                Ok(success("camera stopped"))
            }
            "/init_tracker" => {
                let mut state = self.state();
                state.initialized = true;
                state.calibration_points.clear();
                Ok(success("system initialised"))
            }
            "/calibrate" => self.calibrate(json_body(body)?),
            "/start_tracking" => self.start_tracking(),
            "/stop_tracking" => {
                self.state().tracking = false;
                Ok(success("tracking stopped"))
            }
            "/track_gaze" => self.track_gaze(json_body(body)?),
            "/analyze_audio" => self.analyze_audio(body),
            "/generate_report" => self.generate_report(json_body(body)?),
            "/download_pdf_report" => self.render_pdf(json_body(body)?),
            other => bail!("404 Not Found: {other}"),
        }
    }

    fn calibrate(&self, body: Value) -> Result<Value> {
        let (Some(x), Some(y)) = (
            body.get("target_x").and_then(Value::as_f64),
            body.get("target_y").and_then(Value::as_f64),
        ) else {
            return Ok(failure("missing calibration target"));
        };
        if body.get("frame").and_then(Value::as_str).is_none() {
            return Ok(failure("image decoding failed"));
        }

        let mut state = self.state();
        if !state.initialized {
            return Ok(failure("tracker is not initialised"));
        }
        state.calibration_points.push((x, y));
        log_debug!("calibration point ({x}, {y}) stored; {} total", state.calibration_points.len());
        Ok(json!({
            "status": "success",
            "calibration_points": state.calibration_points.len(),
        }))
    }

    fn start_tracking(&self) -> Result<Value> {
        let mut state = self.state();
        let points = state.calibration_points.len();
        if points < MIN_CALIBRATION_POINTS {
            return Ok(failure(format!(
                "at least {MIN_CALIBRATION_POINTS} calibration points are required (have {points})"
            )));
        }
        state.tracking = true;
        state.tracked.clear();
        log_info!("tracking started with {points} calibration points");
        Ok(success(format!("tracking started with {points} calibration points")))
    }

    fn track_gaze(&self, body: Value) -> Result<Value> {
        if body.get("frame").and_then(Value::as_str).is_none() {
            // Undecodable frames get a low-confidence centre guess.
            return Ok(json!({
                "status": "success",
                "direction": "center",
                "confidence": 0.3,
                "error_offset": 50.0,
            }));
        }

        let (direction, confidence, error_offset) = {
            let mut rng = self.rng();
            let direction = match rng.gen_range(0..3) {
                0 => GazeDirection::Left,
                1 => GazeDirection::Center,
                _ => GazeDirection::Right,
            };
            (direction, rng.gen_range(0.5..0.9), rng.gen_range(10.0..50.0))
        };

        let mut state = self.state();
        if !state.initialized {
            return Ok(failure("tracker is not initialised"));
        }
        if state.tracking {
            state.tracked.push(TrackedResult { direction });
        }
        Ok(json!({
            "status": "success",
            "direction": direction.as_str(),
            "confidence": confidence,
            "error_offset": error_offset,
        }))
    }

    fn analyze_audio(&self, body: RequestBody) -> Result<Value> {
        let RequestBody::Audio(bytes) = body else {
            return Ok(failure("no audio file"));
        };
        if bytes.is_empty() {
            return Ok(failure("no audio file"));
        }
        let result = AudioAnalysisResult {
            transcription: "The tortoise walked slowly but never stopped.".into(),
            duration: "5.0s".into(),
            word_count: 10,
            speaking_rate: "120.0 words/min".into(),
            pronunciation_clarity: "85.0%".into(),
            fluency: "78.0%".into(),
            comprehension: "81.5%".into(),
        };
        Ok(json!({ "status": "success", "result": result }))
    }

    fn diagnosis_for(&self, body: &Value) -> Result<DiagnosisReport> {
        let child_name = body
            .get("child_name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        let user_id = body
            .get("user_id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(1);
        let audio: AudioAnalysisResult = body
            .get("audio_result")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let state = self.state();
        Ok(compile_diagnosis(
            &state.tracked,
            child_name,
            user_id,
            &audio,
            Local::now(),
        ))
    }

    fn generate_report(&self, body: Value) -> Result<Value> {
        let report = self.diagnosis_for(&body)?;
        log_info!(
            "report compiled for {} from {} results",
            report.report.child_name,
            self.state().tracked.len()
        );
        Ok(json!({ "status": "success", "report": report }))
    }

    fn render_pdf(&self, body: Value) -> Result<Value> {
        let report = self.diagnosis_for(&body)?;
        let filename = format!(
            "{}_{}.pdf",
            report.report.child_name,
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let pdf = minimal_pdf(&report_lines(&report));
        Ok(json!({
            "status": "success",
            "pdf_data": STANDARD.encode(pdf),
            "filename": filename,
        }))
    }
}

#[async_trait]
impl JsonTransport for SimulatedAuthority {
    async fn post(&self, endpoint: &str, body: RequestBody) -> Result<String> {
        if let Some((min, max)) = self.latency {
            let delay = self.rng().gen_range(min..max);
            tokio::time::sleep(delay).await;
        }
        let reply = self.respond(endpoint, body)?;
        Ok(reply.to_string())
    }
}

fn success(message: impl Into<String>) -> Value {
    json!({ "status": "success", "message": message.into() })
}

fn failure(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

fn json_body(body: RequestBody) -> Result<Value> {
    match body {
        RequestBody::Json(value) => Ok(value),
        RequestBody::Empty => Ok(Value::Null),
        RequestBody::Audio(_) => bail!("415 Unsupported Media Type: expected JSON"),
    }
}

fn report_lines(report: &DiagnosisReport) -> Vec<String> {
    let body = &report.report;
    let mut lines = vec![
        "Reading Diagnosis Report".to_string(),
        format!("Child: {}", body.child_name),
        format!("Date: {}", body.diagnosis_date),
        format!("Reading time: {}", body.reading_time),
        format!("Reading speed: {}", body.results.reading_speed),
        format!("Concentration: {}", body.results.concentration),
        format!("Comprehension: {}", body.results.comprehension),
        format!("Eye tracking: {}", body.eye_tracking.issues),
        format!("Fluency: {}", body.speech_analysis.fluency),
        "Recommended activities:".to_string(),
    ];
    lines.extend(
        body.feedback
            .recommended_activities
            .iter()
            .map(|activity| format!("- {activity}")),
    );
    lines.push(format!("Next diagnosis: {}", body.feedback.next_diagnosis_date));
    lines
}

/// Single-page PDF with one line of Helvetica per entry.
fn minimal_pdf(lines: &[String]) -> Vec<u8> {
    let mut stream = String::from("BT /F1 12 Tf 56 780 Td 16 TL\n");
    for line in lines {
        let escaped = line
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let printable: String = escaped.chars().filter(char::is_ascii).collect();
        stream.push_str(&format!("({printable}) Tj T*\n"));
    }
    stream.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{object}\nendobj\n", index + 1));
    }
    let xref_at = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::wire;
    use crate::tracker::Reply;

    async fn post(authority: &SimulatedAuthority, endpoint: &str, body: Value) -> String {
        authority
            .post(endpoint, RequestBody::Json(body))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn tracking_requires_four_calibration_points() {
        let authority = SimulatedAuthority::new(7);
        authority.post("/init_tracker", RequestBody::Empty).await.unwrap();

        for i in 0..3 {
            let body = json!({ "frame": "data:image/jpeg;base64,AA==", "target_x": i as f64, "target_y": 0.0 });
            post(&authority, "/calibrate", body).await;
        }
        let refused = authority.post("/start_tracking", RequestBody::Empty).await.unwrap();
        assert!(matches!(
            wire::parse_ack("start_tracking", &refused).unwrap(),
            Reply::Rejected { .. }
        ));

        let body = json!({ "frame": "data:image/jpeg;base64,AA==", "target_x": 3.0, "target_y": 0.0 });
        let ack = post(&authority, "/calibrate", body).await;
        assert_eq!(wire::parse_calibration_ack(&ack).unwrap(), Reply::Success(4));

        let accepted = authority.post("/start_tracking", RequestBody::Empty).await.unwrap();
        assert!(matches!(
            wire::parse_ack("start_tracking", &accepted).unwrap(),
            Reply::Success(_)
        ));
    }

    #[tokio::test]
    async fn estimates_stay_in_published_ranges() {
        let authority = SimulatedAuthority::new(11);
        authority.post("/init_tracker", RequestBody::Empty).await.unwrap();

        for _ in 0..50 {
            let reply = post(&authority, "/track_gaze", json!({ "frame": "data:," })).await;
            let Reply::Success(estimate) = wire::parse_gaze_estimate(&reply).unwrap() else {
                panic!("estimate rejected");
            };
            assert!((0.5..0.9).contains(&estimate.confidence));
            let offset = estimate.error_offset_px.unwrap();
            assert!((10.0..50.0).contains(&offset));
            assert_ne!(estimate.direction, GazeDirection::Unknown);
        }
    }

    #[tokio::test]
    async fn pdf_is_a_well_formed_document() {
        let authority = SimulatedAuthority::new(3);
        let body = json!({ "child_name": "Mina", "user_id": 2, "audio_result": {} });
        let reply = post(&authority, "/download_pdf_report", body).await;
        let Reply::Success(document) = wire::parse_pdf_document(&reply).unwrap() else {
            panic!("pdf rejected");
        };

        assert!(document.bytes.starts_with(b"%PDF-1.4"));
        assert!(document.bytes.ends_with(b"%%EOF\n"));
        let filename = document.filename.unwrap();
        assert!(filename.starts_with("Mina_") && filename.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn unknown_endpoint_is_a_transport_error() {
        let authority = SimulatedAuthority::new(1);
        assert!(authority.post("/nope", RequestBody::Empty).await.is_err());
    }
}

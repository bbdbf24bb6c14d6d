//! Decoding of the authority's JSON replies.
//!
//! Every reply is an object with a `"status"` of `"success"` or `"error"`.
//! Anything else (not JSON, no status, a success without the fields that
//! operation needs) is a [`MalformedPayload`] and never reaches the session.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{
    AudioAnalysisResult, DiagnosisReport, GazeDirection, GazeEstimate, PdfDocument, Reply,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed {operation} payload: {reason}")]
pub struct MalformedPayload {
    pub operation: &'static str,
    pub reason: String,
}

impl MalformedPayload {
    fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

enum Envelope {
    Success(Map<String, Value>),
    Error(String),
}

fn open(operation: &'static str, body: &str) -> Result<Envelope, MalformedPayload> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| MalformedPayload::new(operation, format!("not JSON: {err}")))?;
    let Value::Object(fields) = value else {
        return Err(MalformedPayload::new(operation, "reply is not an object"));
    };

    match fields.get("status").and_then(Value::as_str) {
        Some("success") => Ok(Envelope::Success(fields)),
        Some("error") => {
            let message = fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request rejected")
                .to_string();
            Ok(Envelope::Error(message))
        }
        Some(other) => Err(MalformedPayload::new(
            operation,
            format!("unknown status {other:?}"),
        )),
        None => Err(MalformedPayload::new(operation, "missing status")),
    }
}

/// Plain acknowledgement; the success payload is the optional message.
pub fn parse_ack(operation: &'static str, body: &str) -> Result<Reply<String>, MalformedPayload> {
    Ok(match open(operation, body)? {
        Envelope::Success(fields) => Reply::Success(
            fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

/// Success carries the number of calibration points the authority now holds.
pub fn parse_calibration_ack(body: &str) -> Result<Reply<usize>, MalformedPayload> {
    const OP: &str = "calibrate";
    Ok(match open(OP, body)? {
        Envelope::Success(fields) => {
            let points = fields
                .get("calibration_points")
                .and_then(Value::as_u64)
                .ok_or_else(|| MalformedPayload::new(OP, "missing calibration_points"))?;
            Reply::Success(points as usize)
        }
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

pub fn parse_gaze_estimate(body: &str) -> Result<Reply<GazeEstimate>, MalformedPayload> {
    const OP: &str = "track_gaze";
    Ok(match open(OP, body)? {
        Envelope::Success(fields) => {
            let direction = fields
                .get("direction")
                .and_then(Value::as_str)
                .map(GazeDirection::from_label)
                .ok_or_else(|| MalformedPayload::new(OP, "missing direction"))?;
            let confidence = fields
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite())
                .ok_or_else(|| MalformedPayload::new(OP, "missing confidence"))?;
            let error_offset_px = fields
                .get("error_offset")
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite())
                .map(|value| value.max(0.0));

            Reply::Success(GazeEstimate {
                direction,
                confidence: confidence.clamp(0.0, 1.0),
                error_offset_px,
            })
        }
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

pub fn parse_audio_analysis(body: &str) -> Result<Reply<AudioAnalysisResult>, MalformedPayload> {
    const OP: &str = "analyze_audio";
    Ok(match open(OP, body)? {
        Envelope::Success(mut fields) => {
            let result = fields
                .remove("result")
                .filter(Value::is_object)
                .ok_or_else(|| MalformedPayload::new(OP, "missing result object"))?;
            let analysis = serde_json::from_value(result)
                .map_err(|err| MalformedPayload::new(OP, err.to_string()))?;
            Reply::Success(analysis)
        }
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

pub fn parse_diagnosis_report(body: &str) -> Result<Reply<DiagnosisReport>, MalformedPayload> {
    const OP: &str = "generate_report";
    Ok(match open(OP, body)? {
        Envelope::Success(mut fields) => {
            let report = fields
                .remove("report")
                .filter(Value::is_object)
                .ok_or_else(|| MalformedPayload::new(OP, "missing report object"))?;
            let report = serde_json::from_value(report)
                .map_err(|err| MalformedPayload::new(OP, err.to_string()))?;
            Reply::Success(report)
        }
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

pub fn parse_pdf_document(body: &str) -> Result<Reply<PdfDocument>, MalformedPayload> {
    const OP: &str = "download_pdf_report";
    Ok(match open(OP, body)? {
        Envelope::Success(fields) => {
            let encoded = fields
                .get("pdf_data")
                .and_then(Value::as_str)
                .ok_or_else(|| MalformedPayload::new(OP, "missing pdf_data"))?;
            let bytes = decode_document(encoded)
                .map_err(|reason| MalformedPayload::new(OP, reason))?;
            let filename = fields
                .get("filename")
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string);
            Reply::Success(PdfDocument { bytes, filename })
        }
        Envelope::Error(message) => Reply::Rejected { message },
    })
}

/// Base64 document payload, with or without a `data:` prefix.
pub fn decode_document(encoded: &str) -> Result<Vec<u8>, String> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|err| format!("document is not valid base64: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn gaze_estimate_is_validated() {
        let reply = parse_gaze_estimate(
            r#"{"status":"success","direction":"left","confidence":1.4,"error_offset":-3}"#,
        )
        .unwrap();
        assert_eq!(
            reply,
            Reply::Success(GazeEstimate {
                direction: GazeDirection::Left,
                confidence: 1.0,
                error_offset_px: Some(0.0),
            })
        );

        let missing = parse_gaze_estimate(r#"{"status":"success","direction":"left"}"#);
        assert_eq!(missing.unwrap_err().reason, "missing confidence");
    }

    #[test]
    fn error_status_is_a_rejection_not_a_fault() {
        let reply = parse_gaze_estimate(r#"{"status":"error","message":"tracker offline"}"#);
        assert_eq!(reply.unwrap(), Reply::rejected("tracker offline"));
    }

    #[test]
    fn non_json_and_missing_status_are_malformed() {
        assert!(parse_ack("init_tracker", "<html>502</html>").is_err());
        assert_eq!(
            parse_ack("init_tracker", r#"{"message":"hi"}"#).unwrap_err().reason,
            "missing status"
        );
        assert!(parse_ack("init_tracker", "[1,2]").is_err());
    }

    #[test]
    fn report_without_body_is_malformed() {
        let err = parse_diagnosis_report(r#"{"status":"success","report":"oops"}"#).unwrap_err();
        assert_eq!(err.operation, "generate_report");
        assert_eq!(err.reason, "missing report object");
    }

    #[test]
    fn pdf_payload_is_decoded() {
        let body = format!(
            r#"{{"status":"success","pdf_data":"{}","filename":"mina.pdf"}}"#,
            STANDARD.encode(b"%PDF-1.4 test")
        );
        let reply = parse_pdf_document(&body).unwrap();
        assert_eq!(
            reply,
            Reply::Success(PdfDocument {
                bytes: b"%PDF-1.4 test".to_vec(),
                filename: Some("mina.pdf".into()),
            })
        );

        let broken = parse_pdf_document(r#"{"status":"success","pdf_data":"***"}"#);
        assert!(broken.is_err());
    }

    #[test]
    fn loosely_typed_metrics_still_decode() {
        let report = parse_diagnosis_report(
            r#"{"status":"success","report":{"id":1,"report":{"child_name":"Mina","results":{"concentration":72.5,"comprehension":null}}}}"#,
        )
        .unwrap()
        .into_result()
        .unwrap();
        assert_eq!(report.report.results.concentration, "72.5");
        assert_eq!(report.report.results.comprehension, "");

        let audio = parse_audio_analysis(
            r#"{"status":"success","result":{"transcription":null,"fluency":85.0,"word_count":null}}"#,
        )
        .unwrap()
        .into_result()
        .unwrap();
        assert_eq!(audio.transcription, "");
        assert_eq!(audio.fluency, "85.0");
        assert_eq!(audio.word_count, 0);
        assert_eq!(audio.comprehension, "0.0%");
    }
}

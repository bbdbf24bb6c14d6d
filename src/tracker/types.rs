use serde::{Deserialize, Deserializer, Serialize};

use crate::capture::EncodedFrame;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GazeDirection {
    Left,
    Center,
    Right,
    Unknown,
}

impl GazeDirection {
    /// Anything the estimator says that is not one of the three known
    /// directions maps to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "left" => GazeDirection::Left,
            "center" | "centre" => GazeDirection::Center,
            "right" => GazeDirection::Right,
            _ => GazeDirection::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GazeDirection::Left => "left",
            GazeDirection::Center => "center",
            GazeDirection::Right => "right",
            GazeDirection::Unknown => "unknown",
        }
    }
}

/// A reply from the authority: either the payload or its refusal.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Success(T),
    Rejected { message: String },
}

impl<T> Reply<T> {
    pub fn rejected(message: impl Into<String>) -> Self {
        Reply::Rejected {
            message: message.into(),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Rejected { message } => Err(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationRequest {
    pub image: EncodedFrame,
    pub target_x: f64,
    pub target_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimate {
    pub direction: GazeDirection,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub error_offset_px: Option<f64>,
}

/// Speech analysis as the analyzer reports it. Values are display strings
/// with units attached (`"85.0%"`, `"120.0 words/min"`); the report compiler
/// parses them leniently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioAnalysisResult {
    #[serde(deserialize_with = "lenient_text")]
    pub transcription: String,
    #[serde(deserialize_with = "lenient_text")]
    pub duration: String,
    #[serde(deserialize_with = "lenient_count")]
    pub word_count: u64,
    #[serde(deserialize_with = "lenient_text")]
    pub speaking_rate: String,
    #[serde(deserialize_with = "lenient_text")]
    pub pronunciation_clarity: String,
    #[serde(deserialize_with = "lenient_text")]
    pub fluency: String,
    #[serde(deserialize_with = "lenient_text")]
    pub comprehension: String,
}

impl Default for AudioAnalysisResult {
    fn default() -> Self {
        Self {
            transcription: "No speech analysis available".into(),
            duration: "0.0s".into(),
            word_count: 0,
            speaking_rate: "0.0 words/min".into(),
            pronunciation_clarity: "0.0%".into(),
            fluency: "0.0%".into(),
            comprehension: "0.0%".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub child_name: String,
    pub user_id: u32,
    pub audio_result: AudioAnalysisResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DiagnosisReport {
    pub id: i64,
    pub user_id: u32,
    #[serde(deserialize_with = "lenient_text")]
    pub diagnosis_type: String,
    #[serde(deserialize_with = "lenient_text")]
    pub created_at: String,
    pub report: DiagnosisBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DiagnosisBody {
    #[serde(deserialize_with = "lenient_text")]
    pub child_name: String,
    #[serde(deserialize_with = "lenient_text")]
    pub diagnosis_date: String,
    #[serde(deserialize_with = "lenient_text")]
    pub reading_time: String,
    pub results: ReadingResults,
    pub eye_tracking: EyeTrackingSummary,
    pub speech_analysis: SpeechSummary,
    pub feedback: FeedbackSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ReadingResults {
    #[serde(deserialize_with = "lenient_text")]
    pub reading_speed: String,
    #[serde(deserialize_with = "lenient_text")]
    pub concentration: String,
    #[serde(deserialize_with = "lenient_text")]
    pub comprehension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EyeTrackingSummary {
    #[serde(deserialize_with = "lenient_text")]
    pub issues: String,
    #[serde(deserialize_with = "lenient_text")]
    pub focus_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SpeechSummary {
    #[serde(deserialize_with = "lenient_text")]
    pub transcription: String,
    #[serde(deserialize_with = "lenient_text")]
    pub fluency: String,
    #[serde(deserialize_with = "lenient_text")]
    pub pronunciation_clarity: String,
    #[serde(deserialize_with = "lenient_text")]
    pub speaking_rate: String,
    #[serde(deserialize_with = "lenient_text")]
    pub duration: String,
    #[serde(deserialize_with = "lenient_count")]
    pub word_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FeedbackSummary {
    #[serde(deserialize_with = "lenient_text")]
    pub summary: String,
    #[serde(deserialize_with = "lenient_list")]
    pub recommended_activities: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub next_diagnosis_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

/// Word counts arrive as integers, floats, numeric strings or not at all.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        serde_json::Value::String(text) => text.trim().parse().unwrap_or(0),
        _ => 0,
    };
    Ok(count)
}

/// Metric text arrives as strings, bare numbers or null. Numbers keep their
/// JSON spelling; null and anything else read as empty so callers fall back.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(text_of(&value).unwrap_or_default())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let items = match value {
        serde_json::Value::Array(items) => items.iter().filter_map(text_of).collect(),
        serde_json::Value::String(item) if !item.trim().is_empty() => vec![item],
        _ => Vec::new(),
    };
    Ok(items)
}

fn text_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn direction_labels_are_case_insensitive() {
        assert_eq!(GazeDirection::from_label("LEFT"), GazeDirection::Left);
        assert_eq!(GazeDirection::from_label(" center "), GazeDirection::Center);
        assert_eq!(GazeDirection::from_label("up"), GazeDirection::Unknown);
    }

    #[test]
    fn partial_diagnosis_fills_defaults() {
        let report: DiagnosisReport = serde_json::from_value(json!({
            "user_id": 7,
            "report": {
                "child_name": "Mina",
                "results": { "concentration": "55.0%" },
                "speech_analysis": { "word_count": "12" }
            }
        }))
        .unwrap();

        assert_eq!(report.user_id, 7);
        assert_eq!(report.report.child_name, "Mina");
        assert_eq!(report.report.results.concentration, "55.0%");
        assert_eq!(report.report.results.reading_speed, "");
        assert_eq!(report.report.speech_analysis.word_count, 12);
        assert!(report.report.feedback.recommended_activities.is_empty());
    }

    #[test]
    fn audio_word_count_tolerates_garbage() {
        let audio: AudioAnalysisResult =
            serde_json::from_value(json!({ "fluency": "78.0%", "word_count": "many" })).unwrap();
        assert_eq!(audio.word_count, 0);
        assert_eq!(audio.fluency, "78.0%");
        assert_eq!(audio.comprehension, "0.0%");
    }

    #[test]
    fn numeric_and_null_metrics_are_tolerated() {
        let report: DiagnosisReport = serde_json::from_value(json!({
            "id": 1,
            "report": {
                "child_name": "Mina",
                "results": { "concentration": 72.5, "comprehension": null },
                "speech_analysis": { "transcription": null, "fluency": 85 },
                "feedback": { "recommended_activities": ["read aloud", null, 3] }
            }
        }))
        .unwrap();

        assert_eq!(report.report.results.concentration, "72.5");
        assert_eq!(report.report.results.comprehension, "");
        assert_eq!(report.report.speech_analysis.transcription, "");
        assert_eq!(report.report.speech_analysis.fluency, "85");
        assert_eq!(
            report.report.feedback.recommended_activities,
            vec!["read aloud".to_string(), "3".to_string()]
        );
    }
}

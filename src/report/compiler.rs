use std::collections::BTreeMap;

use serde::Serialize;

use crate::sampling::GazeSample;
use crate::tracker::{AudioAnalysisResult, DiagnosisReport, GazeDirection};

use super::bands::{Metric, MetricBand};
use super::parse::parse_metric;
use super::render::render_text;

/// Seconds represented by one sample at the nominal sampling period.
pub const SECONDS_PER_SAMPLE: f64 = 0.5;
pub const MAX_ACTIVITIES: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionCounts {
    pub left: usize,
    pub center: usize,
    pub right: usize,
    pub unknown: usize,
}

impl DirectionCounts {
    fn tally(samples: &[GazeSample]) -> Self {
        let mut counts = Self::default();
        for sample in samples {
            match sample.direction {
                GazeDirection::Left => counts.left += 1,
                GazeDirection::Center => counts.center += 1,
                GazeDirection::Right => counts.right += 1,
                GazeDirection::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

/// The single summary message; checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Feedback {
    PracticeConcentration,
    PracticeComprehension,
    PracticeFluency,
    KeepGoing,
}

impl Feedback {
    fn choose(concentration: f64, comprehension: f64, fluency: f64) -> Self {
        if concentration < 40.0 {
            Feedback::PracticeConcentration
        } else if comprehension < 60.0 {
            Feedback::PracticeComprehension
        } else if fluency < 60.0 {
            Feedback::PracticeFluency
        } else {
            Feedback::KeepGoing
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Feedback::PracticeConcentration => {
                "Concentration needs practice! Start with short reading sessions."
            }
            Feedback::PracticeComprehension => {
                "Work on understanding the story! Ask questions while you read."
            }
            Feedback::PracticeFluency => {
                "Practise speaking and pronunciation more! Slowly and clearly."
            }
            Feedback::KeepGoing => "You're doing great! Keep reading regularly.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub child_name: String,
    pub diagnosis_date: String,
    pub next_diagnosis_date: String,
    pub directions: DirectionCounts,
    pub average_confidence: f64,
    pub total_measurements: usize,
    pub total_time_secs: f64,
    pub reading_time_secs: f64,
    pub focus_time_secs: f64,
    pub samples_per_story: BTreeMap<usize, usize>,
    pub concentration: MetricBand,
    pub comprehension: MetricBand,
    pub reading_speed: MetricBand,
    pub fluency: MetricBand,
    pub clarity: MetricBand,
    pub pronunciation_clarity: String,
    pub fluency_text: String,
    pub speaking_rate: String,
    pub transcription: String,
    pub eye_tracking_issues: String,
    pub feedback: Feedback,
    pub recommended_activities: Vec<String>,
    pub text: String,
}

/// Builds the report from the run's samples, the speech analysis and the
/// authority's diagnosis. Pure: the same inputs always give the same payload.
///
/// Values the diagnosis carries take precedence. Blank diagnosis fields fall
/// back to what the samples or the speech analysis say.
pub fn compile_report(
    samples: &[GazeSample],
    audio: &AudioAnalysisResult,
    diagnosis: &DiagnosisReport,
) -> ReportPayload {
    let body = &diagnosis.report;
    let directions = DirectionCounts::tally(samples);
    let total_measurements = samples.len();
    let total_time_secs = total_measurements as f64 * SECONDS_PER_SAMPLE;

    let average_confidence = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|s| s.confidence).sum::<f64>() / total_measurements as f64
    };

    let local_concentration = if samples.is_empty() {
        0.0
    } else {
        directions.center as f64 / total_measurements as f64 * 100.0
    };

    let mut samples_per_story = BTreeMap::new();
    for sample in samples {
        *samples_per_story.entry(sample.story_index).or_insert(0) += 1;
    }

    let concentration = metric_or(&body.results.concentration, local_concentration);
    let reading_speed = metric_or(&body.results.reading_speed, local_reading_speed(samples));
    let comprehension = parse_metric(first_present(&body.results.comprehension, &audio.comprehension));
    let fluency_text = first_present(&body.speech_analysis.fluency, &audio.fluency);
    let clarity_text = first_present(
        &body.speech_analysis.pronunciation_clarity,
        &audio.pronunciation_clarity,
    );
    let fluency = parse_metric(fluency_text);
    let clarity = parse_metric(clarity_text);

    let eye_tracking_issues = match body.eye_tracking.issues.trim() {
        "" => "normal".to_string(),
        issues => issues.to_string(),
    };

    let child_name = match body.child_name.trim() {
        "" => "Reader".to_string(),
        name => name.to_string(),
    };

    let mut payload = ReportPayload {
        child_name,
        diagnosis_date: body.diagnosis_date.clone(),
        next_diagnosis_date: body.feedback.next_diagnosis_date.clone(),
        directions,
        average_confidence,
        total_measurements,
        total_time_secs,
        reading_time_secs: metric_or(&body.reading_time, total_time_secs),
        focus_time_secs: metric_or(
            &body.eye_tracking.focus_time,
            directions.center as f64 * SECONDS_PER_SAMPLE,
        ),
        samples_per_story,
        concentration: MetricBand::new(Metric::Concentration, concentration),
        comprehension: MetricBand::new(Metric::Comprehension, comprehension),
        reading_speed: MetricBand::new(Metric::ReadingSpeed, reading_speed),
        fluency: MetricBand::new(Metric::Fluency, fluency),
        clarity: MetricBand::new(Metric::Clarity, clarity),
        pronunciation_clarity: clarity_text.to_string(),
        fluency_text: fluency_text.to_string(),
        speaking_rate: first_present(&body.speech_analysis.speaking_rate, &audio.speaking_rate)
            .to_string(),
        transcription: first_present(&body.speech_analysis.transcription, &audio.transcription)
            .to_string(),
        eye_tracking_issues,
        feedback: Feedback::choose(concentration, comprehension, fluency),
        recommended_activities: body
            .feedback
            .recommended_activities
            .iter()
            .take(MAX_ACTIVITIES)
            .cloned()
            .collect(),
        text: String::new(),
    };
    payload.text = render_text(&payload);
    payload
}

fn first_present<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() {
        fallback
    } else {
        preferred
    }
}

fn metric_or(text: &str, local: f64) -> f64 {
    if text.trim().is_empty() {
        local
    } else {
        parse_metric(text)
    }
}

/// Direction changes per minute, in capture order.
fn local_reading_speed(samples: &[GazeSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut ordered = samples.to_vec();
    ordered.sort_by_key(|sample| sample.captured_at_ms);
    let changes = ordered
        .windows(2)
        .filter(|pair| pair[0].direction != pair[1].direction)
        .count();
    let minutes = ordered.len() as f64 * SECONDS_PER_SAMPLE / 60.0;
    changes as f64 / minutes
}

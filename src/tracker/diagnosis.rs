//! Diagnosis compilation as the tracking authority performs it.

use chrono::{DateTime, Duration as ChronoDuration, Local};

use super::types::{
    AudioAnalysisResult, DiagnosisBody, DiagnosisReport, EyeTrackingSummary, FeedbackSummary,
    GazeDirection, ReadingResults, SpeechSummary,
};
use crate::report::parse_metric;

/// Nominal seconds between two tracked frames.
const SECONDS_PER_RESULT: f64 = 0.5;
const NEXT_DIAGNOSIS_DAYS: i64 = 30;

pub(crate) struct TrackedResult {
    pub direction: GazeDirection,
}

pub(crate) fn compile_diagnosis(
    results: &[TrackedResult],
    child_name: &str,
    user_id: u32,
    audio: &AudioAnalysisResult,
    now: DateTime<Local>,
) -> DiagnosisReport {
    let total = results.len();
    let count = |wanted: GazeDirection| results.iter().filter(|r| r.direction == wanted).count();
    let left = count(GazeDirection::Left);
    let right = count(GazeDirection::Right);
    let center = count(GazeDirection::Center);

    let total_time = total as f64 * SECONDS_PER_RESULT;
    let (concentration, reading_speed) = if total == 0 {
        (0.0, 0.0)
    } else {
        let direction_changes = results
            .windows(2)
            .filter(|pair| pair[0].direction != pair[1].direction)
            .count();
        (
            center as f64 / total as f64 * 100.0,
            direction_changes as f64 / (total_time / 60.0),
        )
    };

    let fluency = parse_metric(&audio.fluency);

    DiagnosisReport {
        id: now.timestamp(),
        user_id,
        diagnosis_type: "reading_analysis".into(),
        created_at: now.to_rfc3339(),
        report: DiagnosisBody {
            child_name: child_name.to_string(),
            diagnosis_date: now.format("%Y-%m-%d").to_string(),
            reading_time: format!("{total_time:.1}s"),
            results: ReadingResults {
                reading_speed: format!("{reading_speed:.1} changes/min"),
                concentration: format!("{concentration:.1}%"),
                comprehension: audio.comprehension.clone(),
            },
            eye_tracking: EyeTrackingSummary {
                issues: eye_tracking_issues(concentration, reading_speed, left, right),
                focus_time: format!("{:.1}s", center as f64 * SECONDS_PER_RESULT),
            },
            speech_analysis: SpeechSummary {
                transcription: audio.transcription.clone(),
                fluency: audio.fluency.clone(),
                pronunciation_clarity: audio.pronunciation_clarity.clone(),
                speaking_rate: audio.speaking_rate.clone(),
                duration: audio.duration.clone(),
                word_count: audio.word_count,
            },
            feedback: FeedbackSummary {
                summary: format!("{total} measurements, concentration {concentration:.1}%"),
                recommended_activities: recommended_activities(
                    concentration,
                    reading_speed,
                    fluency,
                ),
                next_diagnosis_date: (now + ChronoDuration::days(NEXT_DIAGNOSIS_DAYS))
                    .format("%Y-%m-%d")
                    .to_string(),
            },
        },
    }
}

fn eye_tracking_issues(concentration: f64, reading_speed: f64, left: usize, right: usize) -> String {
    let mut issues = Vec::new();

    if concentration < 40.0 {
        issues.push("severe lack of concentration");
    } else if concentration < 60.0 {
        issues.push("concentration needs improvement");
    }

    if reading_speed < 20.0 {
        issues.push("slow reading");
    } else if reading_speed > 80.0 {
        issues.push("excessively fast reading");
    }

    if left > right * 3 {
        issues.push("left-biased gaze");
    } else if right > left * 3 {
        issues.push("right-biased gaze");
    }

    if issues.is_empty() {
        "normal".to_string()
    } else {
        issues.join(", ")
    }
}

fn recommended_activities(concentration: f64, reading_speed: f64, fluency: f64) -> Vec<String> {
    let mut activities: Vec<&str> = Vec::new();

    if concentration < 60.0 {
        activities.extend([
            "Focused reading practice in 15-minute blocks",
            "Visual attention games",
            "A quieter reading environment",
        ]);
    }

    if reading_speed < 30.0 {
        activities.extend([
            "Step-by-step reading speed drills",
            "Eye movement exercises",
        ]);
    }

    if fluency < 70.0 {
        activities.extend([
            "Pronunciation practice and read-along",
            "Record yourself reading and listen back",
        ]);
    }

    if activities.is_empty() {
        activities.extend([
            "Keep up the current level",
            "Read books from different genres",
            "Keep a regular reading habit",
        ]);
    }

    activities.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn results(directions: &[GazeDirection]) -> Vec<TrackedResult> {
        directions
            .iter()
            .map(|&direction| TrackedResult { direction })
            .collect()
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn empty_session_yields_zero_scores() {
        let report = compile_diagnosis(&[], "Mina", 1, &AudioAnalysisResult::default(), fixed_now());

        assert_eq!(report.report.reading_time, "0.0s");
        assert_eq!(report.report.results.concentration, "0.0%");
        assert_eq!(report.report.results.reading_speed, "0.0 changes/min");
        assert_eq!(
            report.report.eye_tracking.issues,
            "severe lack of concentration, slow reading"
        );
        assert_eq!(report.report.feedback.next_diagnosis_date, "2026-04-01");
        assert_eq!(report.report.diagnosis_date, "2026-03-02");
    }

    #[test]
    fn centred_reading_counts_direction_changes() {
        use GazeDirection::*;
        // 8 results = 4 s, 4 changes => 60 changes/min; 6/8 centred.
        let tracked = results(&[Center, Left, Center, Center, Right, Center, Center, Center]);
        let audio = AudioAnalysisResult {
            fluency: "85.0%".into(),
            ..AudioAnalysisResult::default()
        };

        let report = compile_diagnosis(&tracked, "Mina", 3, &audio, fixed_now());
        let body = &report.report;

        assert_eq!(report.user_id, 3);
        assert_eq!(body.results.concentration, "75.0%");
        assert_eq!(body.results.reading_speed, "60.0 changes/min");
        assert_eq!(body.eye_tracking.issues, "normal");
        assert_eq!(body.eye_tracking.focus_time, "3.0s");
        assert_eq!(
            body.feedback.recommended_activities,
            vec![
                "Keep up the current level".to_string(),
                "Read books from different genres".to_string(),
                "Keep a regular reading habit".to_string(),
            ]
        );
    }

    #[test]
    fn lopsided_gaze_is_flagged() {
        use GazeDirection::*;
        let tracked = results(&[Left, Left, Left, Left, Center, Left, Left, Left]);
        let report = compile_diagnosis(&tracked, "Mina", 1, &AudioAnalysisResult::default(), fixed_now());
        assert!(report.report.eye_tracking.issues.contains("left-biased gaze"));
    }
}

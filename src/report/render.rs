use std::fmt::Write as _;

use crate::timer::format_elapsed;

use super::bands::MetricBand;
use super::compiler::ReportPayload;

/// Plain-text report as shown on the kiosk screen.
pub fn render_text(report: &ReportPayload) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}'s Reading Report", report.child_name);
    let _ = writeln!(out);
    let _ = writeln!(out, "Date: {}", dotted(&report.diagnosis_date));
    let _ = writeln!(
        out,
        "Total reading time: {} (focused: {})",
        format_elapsed(whole_seconds(report.reading_time_secs)),
        focus_text(report.focus_time_secs)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Reading");
    for band in [&report.reading_speed, &report.concentration, &report.comprehension] {
        let _ = writeln!(out, "- {}", band_line(band));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Speech");
    let _ = writeln!(
        out,
        "- {} ({})",
        band_line(&report.clarity),
        report.pronunciation_clarity
    );
    let _ = writeln!(out, "- {} ({})", band_line(&report.fluency), report.fluency_text);
    let _ = writeln!(out, "- Speaking rate: {}", report.speaking_rate);
    let _ = writeln!(out);

    let _ = writeln!(out, "What the reader said:");
    let _ = writeln!(out, "\"{}\"", report.transcription);
    let _ = writeln!(out);

    let _ = writeln!(out, "Gaze pattern:");
    if report.eye_tracking_issues == "normal" {
        let _ = writeln!(out, "Natural gaze movement observed.");
    } else {
        let _ = writeln!(out, "Observed: {}.", report.eye_tracking_issues);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Feedback");
    let _ = writeln!(out, "{}", report.feedback.message());

    if !report.recommended_activities.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recommended activities");
        for activity in &report.recommended_activities {
            let _ = writeln!(out, "- {activity}");
        }
    }

    if !report.next_diagnosis_date.is_empty() {
        let _ = writeln!(out);
        let _ = write!(out, "Next check: {}", dotted(&report.next_diagnosis_date));
    }

    out.trim_end().to_string()
}

fn band_line(band: &MetricBand) -> String {
    format!("{}: {}", band.metric.title(), band.label)
}

fn dotted(date: &str) -> String {
    if date.is_empty() {
        "-".to_string()
    } else {
        date.replace('-', ".")
    }
}

fn whole_seconds(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    }
}

fn focus_text(secs: f64) -> String {
    if secs > 0.0 {
        format!("{secs:.0}s")
    } else {
        "0s".to_string()
    }
}

/// Reads the leading number out of a display string such as `"85.0%"`,
/// `"12.5 changes/min"` or `"5.0s"`. Anything without one, or with a
/// non-finite one, reads as 0.
pub fn parse_metric(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_point = false;

    for (offset, ch) in text.char_indices() {
        match ch {
            '+' | '-' if offset == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => break,
        }
        end = offset + ch.len_utf8();
    }

    if !seen_digit {
        return 0.0;
    }
    text[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

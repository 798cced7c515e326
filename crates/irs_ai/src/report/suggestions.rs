//! Best-effort normalization of free-form generated suggestion text.
//!
//! Not a grammar: list markers are stripped, short fragments dropped, and the result is
//! always one to five items.

pub const MAX_SUGGESTIONS: usize = 5;
/// Fragments at or below this many characters are noise ("1.", "Yes", "See above").
pub const MIN_SUGGESTION_CHARS: usize = 10;

pub const GENERIC_SUGGESTIONS: [&str; 5] = [
    "Investigate system logs for error patterns",
    "Check resource utilization and system health",
    "Verify service dependencies and connectivity",
    "Consider restarting affected services",
    "Monitor system after resolution attempts",
];

fn is_list_item(line: &str) -> bool {
    line.chars()
        .next()
        .map(|c| c.is_ascii_digit() || matches!(c, '-' | '*' | '•'))
        .unwrap_or(false)
}

fn strip_marker(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•' | ' ' | '\t')
    })
    .trim()
}

fn long_enough(s: &str) -> bool {
    s.chars().count() > MIN_SUGGESTION_CHARS
}

pub fn parse_suggestions(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| is_list_item(l))
        .map(strip_marker)
        .filter(|s| long_enough(s))
        .map(str::to_string)
        .collect();

    // No list structure: fall back to sentences.
    if out.is_empty() {
        out = text
            .split('.')
            .map(str::trim)
            .filter(|s| long_enough(s))
            .map(str::to_string)
            .collect();
    }

    if out.is_empty() {
        out = GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
    }

    out.truncate(MAX_SUGGESTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numbering_and_bullets() {
        let got = parse_suggestions(
            "Here you go:\n1. Restart the loadsim service\n2) Check journalctl output\n- Scale the instance up\n* ok\n• Verify health checks pass",
        );
        assert_eq!(
            got,
            vec![
                "Restart the loadsim service",
                "Check journalctl output",
                "Scale the instance up",
                "Verify health checks pass",
            ]
        );
    }

    #[test]
    fn caps_at_five() {
        let text = (1..=8)
            .map(|i| format!("{i}. Suggestion number {i} is long enough"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_suggestions(&text).len(), MAX_SUGGESTIONS);
    }
}

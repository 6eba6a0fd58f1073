//! One-line summaries of agent output.

use std::sync::LazyLock;

use regex::Regex;

/// Default bound for summaries stored in logs and commit messages.
pub const DEFAULT_SUMMARY_LEN: usize = 100;

const STATUS_PREFIX: &str = "[GemStack]";
const EMPTY_SUMMARY: &str = "Completed";

static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[=\-]+$").expect("rule pattern should be valid"));

/// First meaningful line of `output`, truncated to `max_len` characters.
///
/// Skips blank lines, gemstack status lines and `===`/`---` rules. Falls back to
/// `"Completed"` when nothing remains. Truncated summaries end in `...`.
pub fn first_meaningful_line(output: &str, max_len: usize) -> String {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with(STATUS_PREFIX) && !RULE_RE.is_match(line)
        })
        .unwrap_or(EMPTY_SUMMARY);
    truncate_chars(line, max_len)
}

/// Truncate to at most `max_len` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return text.chars().take(max_len).collect();
    }
    let mut out: String = text.chars().take(max_len - 3).collect();
    out.push_str("...");
    out
}

//! Deterministic classification of agent output.

/// Substrings signalling that the backend model hit a rate or quota limit.
///
/// Matching is case-sensitive; common spellings are listed explicitly.
pub const EXHAUSTION_MARKERS: &[&str] = &[
    "rate limit",
    "Rate limit",
    "RATE_LIMIT",
    "quota exceeded",
    "Quota exceeded",
    "QUOTA_EXCEEDED",
    "resource exhausted",
    "Resource exhausted",
    "RESOURCE_EXHAUSTED",
    "too many requests",
    "Too many requests",
    "429",
    "limit reached",
    "exhausted",
];

/// Return the first exhaustion marker found in `output`, if any.
pub fn exhaustion_marker(output: &str) -> Option<&'static str> {
    EXHAUSTION_MARKERS
        .iter()
        .copied()
        .find(|marker| output.contains(marker))
}

/// True if `output` indicates model exhaustion (rate limit, quota, HTTP 429).
pub fn is_exhausted(output: &str) -> bool {
    exhaustion_marker(output).is_some()
}

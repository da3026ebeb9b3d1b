//! Email and phone extraction from free text.
//!
//! Pure pattern extraction: no validation, no external state. Matches are
//! normalized, deduplicated, and returned in order of first occurrence.
//! Absent or empty input always yields an empty list.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("valid email pattern")
});

// `+` or `00`, 1-4 digit country code, up to 14 digits, optional grouped suffix.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+|00)\d{1,4}[\s.-]?\d{1,14}(?:[\s.-]?\d{1,13})?")
        .expect("valid phone pattern")
});

/// Email addresses found in `text`, lowercased and trimmed.
pub fn extract_emails(text: Option<&str>) -> Vec<String> {
    collect_unique(&EMAIL_RE, text, |m| m.trim().to_lowercase())
}

/// International phone numbers found in `text`, trimmed.
pub fn extract_phones(text: Option<&str>) -> Vec<String> {
    collect_unique(&PHONE_RE, text, |m| m.trim().to_string())
}

fn collect_unique(re: &Regex, text: Option<&str>, normalize: impl Fn(&str) -> String) -> Vec<String> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    re.find_iter(text)
        .map(|m| normalize(m.as_str()))
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

//! Lecturer name extraction and normalization.
//!
//! A cell's lecturer field may list several co-teachers, carry role
//! prefixes or placeholders ("TBC", "Vacant"), and arrive in any case.
//! Only plausible personal names survive, normalized so the same person
//! collapses to one store row across cells and rooms.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static PARENTHETICAL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());
static SEPARATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:/|&|;|\band\b)\s*").unwrap());
static PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:[-–\s]+|(?:lecturer|tutor)\s*:\s*)+").unwrap());
static EXCLUDED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:tbc|tba|tbd|vacant|week|weeks|module|staff|various|unknown|n/a|none)\b")
        .unwrap()
});
static COMMA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").unwrap());

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 80;

/// Extracts the distinct lecturer names from a raw lecturer field.
///
/// Names come back normalized, in first-seen order, without
/// case-insensitive duplicates.
pub fn extract_names(raw_field: &str) -> Vec<String> {
    let without_notes = PARENTHETICAL_REGEX.replace_all(raw_field, " ");
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for candidate in SEPARATOR_REGEX.split(&without_notes) {
        let candidate = PREFIX_REGEX.replace(candidate.trim(), "");
        let candidate = candidate.trim();
        if !is_plausible_name(candidate) {
            continue;
        }

        let name = normalize_name(candidate);
        if seen.insert(lecturer_key(&name)) {
            names.push(name);
        }
    }

    names
}

/// Lowercase lookup key used for lecturer identity.
pub fn lecturer_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_plausible_name(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return false;
    }
    if candidate.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if !candidate.chars().any(char::is_alphabetic) {
        return false;
    }
    // Bare tokens are staff codes or usernames, not names
    if !candidate.contains(',') && !candidate.contains(' ') {
        return false;
    }
    !EXCLUDED_REGEX.is_match(candidate)
}

fn normalize_name(candidate: &str) -> String {
    let spaced = COMMA_REGEX.replace_all(candidate, ", ");
    let spaced = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let has_upper = spaced.chars().any(char::is_uppercase);
    let has_lower = spaced.chars().any(char::is_lowercase);
    if has_upper && has_lower {
        spaced
    } else {
        title_case(&spaced)
    }
}

/// Capitalizes each segment separated by spaces, hyphens or apostrophes.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_segment_start = true;
    for c in text.chars() {
        if at_segment_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_segment_start = matches!(c, ' ' | '-' | '\'' | '’');
    }
    out
}

//! Field classification for the lines of one timetable cell.
//!
//! The booking system renders every cell as loose lines of text with no
//! fixed order. Each line is offered to [`RULES`] in order; the first rule
//! whose predicate matches and whose slot is still empty claims it.
//! Results are best effort: anything unrecognised simply stays unset.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIME_RANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}\s*[-–]\s*\d{1,2}:\d{2}$").unwrap());
static MODULE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}\d{3,6}[A-Z]?\s*[-:–]").unwrap());
static MODULE_SPLIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{2,4}\d{3,6}[A-Z]?)\s*[-:–]\s*(.*)$").unwrap()
});
static GROUP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*group\s*:[^)]*\)").unwrap());
static SESSION_START_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(Lecture|Practical|Seminar|Workshop|Tutorial|Lab|Placement|Project|Exam|Assessment|Drop-in|Non-Teaching)\b",
    )
    .unwrap()
});
static DELIVERY_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\((On Campus|Online|Hybrid)\)\s*$").unwrap());
static COMMA_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z'’.\-]*(?:\s+[A-Za-z][A-Za-z'’.\-]*)*\s*,\s*[A-Za-z]").unwrap()
});
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._\-]{3,29}$").unwrap());

/// The field a rule fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Time,
    Module,
    Group,
    /// Session line, e.g. `Lecture (On Campus)`; becomes the group label
    /// only when no `(Group: ...)` line is present
    Session,
    Lecturer,
}

/// One classification heuristic.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub slot: Slot,
    pub matches: fn(&str) -> bool,
}

/// Classification policy, highest priority first.
pub static RULES: &[Rule] = &[
    Rule {
        name: "time-range",
        slot: Slot::Time,
        matches: is_time_range,
    },
    Rule {
        name: "module-code",
        slot: Slot::Module,
        matches: is_module_line,
    },
    Rule {
        name: "group-parenthetical",
        slot: Slot::Group,
        matches: has_group_parenthetical,
    },
    Rule {
        name: "session-line",
        slot: Slot::Session,
        matches: is_session_line,
    },
    Rule {
        name: "comma-name",
        slot: Slot::Lecturer,
        matches: is_comma_name,
    },
    Rule {
        name: "username",
        slot: Slot::Lecturer,
        matches: is_username,
    },
];

/// Fields recovered from one block of cell lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellFields {
    pub time: Option<String>,
    pub module: Option<String>,
    pub lecturer: Option<String>,
    pub session_type: Option<String>,
    pub group: Option<String>,
}

/// Lines claimed so far, one per slot.
#[derive(Default)]
struct Claims {
    time: Option<String>,
    module: Option<String>,
    group: Option<String>,
    session: Option<String>,
    lecturer: Option<String>,
}

impl Claims {
    fn slot(&self, slot: Slot) -> &Option<String> {
        match slot {
            Slot::Time => &self.time,
            Slot::Module => &self.module,
            Slot::Group => &self.group,
            Slot::Session => &self.session,
            Slot::Lecturer => &self.lecturer,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::Time => &mut self.time,
            Slot::Module => &mut self.module,
            Slot::Group => &mut self.group,
            Slot::Session => &mut self.session,
            Slot::Lecturer => &mut self.lecturer,
        }
    }
}

/// Classifies the lines of one block using [`RULES`].
pub fn classify<S: AsRef<str>>(lines: &[S]) -> CellFields {
    classify_with(RULES, lines)
}

/// Classifies the lines of one block with an explicit rule table.
pub fn classify_with<S: AsRef<str>>(rules: &[Rule], lines: &[S]) -> CellFields {
    let mut claims = Claims::default();
    let mut first_unclaimed: Option<String> = None;

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        let claimed = rules
            .iter()
            .find(|rule| claims.slot(rule.slot).is_none() && (rule.matches)(line));

        match claimed {
            Some(rule) => *claims.slot_mut(rule.slot) = Some(line.to_string()),
            None => {
                if first_unclaimed.is_none() {
                    first_unclaimed = Some(line.to_string());
                }
            }
        }
    }

    // Best effort: a free-text title is better than dropping the booking
    let module = claims.module.or(first_unclaimed);

    let session_type = claims
        .session
        .as_deref()
        .or(claims.group.as_deref())
        .and_then(session_keyword);
    let group = claims.group.or(claims.session);

    CellFields {
        time: claims.time,
        module,
        lecturer: claims.lecturer,
        session_type,
        group,
    }
}

/// `H:MM - H:MM` with one or two digit hours.
pub fn is_time_range(line: &str) -> bool {
    TIME_RANGE_REGEX.is_match(line)
}

/// Module code followed by a separator, e.g. `CO2401 - Software Development`.
pub fn is_module_line(line: &str) -> bool {
    MODULE_REGEX.is_match(line)
}

fn has_group_parenthetical(line: &str) -> bool {
    GROUP_REGEX.is_match(line)
}

fn is_session_line(line: &str) -> bool {
    SESSION_START_REGEX.is_match(line) || DELIVERY_SUFFIX_REGEX.is_match(line)
}

fn is_comma_name(line: &str) -> bool {
    let starts_with_digit = line.chars().next().is_some_and(|c| c.is_ascii_digit());
    !starts_with_digit && !is_module_line(line) && COMMA_NAME_REGEX.is_match(line)
}

fn is_username(line: &str) -> bool {
    USERNAME_REGEX.is_match(line)
        && line.chars().any(|c| c.is_ascii_uppercase())
        && line.chars().any(|c| c.is_ascii_lowercase())
        && !SESSION_START_REGEX.is_match(line)
}

/// Leading session keyword of a line, e.g. `Practical` for
/// `Practical (On Campus)`.
pub fn session_keyword(line: &str) -> Option<String> {
    SESSION_START_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Splits a module label into its code and name.
///
/// `CO2401 - Software Development` gives `(Some("CO2401"), "Software
/// Development")`; labels without a code come back whole as the name.
pub fn split_module(raw: &str) -> (Option<String>, String) {
    let raw = raw.trim();
    match MODULE_SPLIT_REGEX.captures(raw) {
        Some(caps) => {
            let code = caps.get(1).map(|m| m.as_str().to_string());
            let name = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let name = if name.is_empty() {
                code.clone().unwrap_or_default()
            } else {
                name.to_string()
            };
            (code, name)
        }
        None => (None, raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_standard_block() {
        let fields = classify(&[
            "09:00 - 10:00",
            "CO2401 - Software Development",
            "King, John",
            "Practical (On Campus)",
        ]);

        assert_eq!(fields.time.as_deref(), Some("09:00 - 10:00"));
        assert_eq!(fields.module.as_deref(), Some("CO2401 - Software Development"));
        assert_eq!(fields.lecturer.as_deref(), Some("King, John"));
        assert_eq!(fields.group.as_deref(), Some("Practical (On Campus)"));
        assert_eq!(fields.session_type.as_deref(), Some("Practical"));
    }

    #[test]
    fn test_line_order_does_not_matter() {
        let fields = classify(&[
            "Lecture (Group: Y2 Computing)",
            "Dimitriadou, Athanasia",
            "10:00 - 13:00",
            "CO3519 - Artificial Intelligence",
        ]);

        assert_eq!(fields.time.as_deref(), Some("10:00 - 13:00"));
        assert_eq!(fields.module.as_deref(), Some("CO3519 - Artificial Intelligence"));
        assert_eq!(fields.lecturer.as_deref(), Some("Dimitriadou, Athanasia"));
        assert_eq!(fields.group.as_deref(), Some("Lecture (Group: Y2 Computing)"));
        assert_eq!(fields.session_type.as_deref(), Some("Lecture"));
    }

    #[test]
    fn test_module_code_beats_other_patterns() {
        // Would also look like a session line and a comma name
        let fields = classify(&["9:00 - 11:00", "MA1101: Lecture, Calculus"]);
        assert_eq!(fields.module.as_deref(), Some("MA1101: Lecture, Calculus"));
        assert_eq!(fields.group, None);
        assert_eq!(fields.lecturer, None);
    }

    #[test]
    fn test_time_string_round_trips_exactly() {
        for time in ["9:00 - 10:00", "09:00-10:00", "13:30 – 15:00"] {
            let fields = classify(&[time, "CO1111 - Intro"]);
            assert_eq!(fields.time.as_deref(), Some(time));
        }
    }

    #[test]
    fn test_username_lecturer() {
        let fields = classify(&["14:00 - 15:00", "BM2020 - Marketing", "JSmith2"]);
        assert_eq!(fields.lecturer.as_deref(), Some("JSmith2"));

        // Session keywords are not usernames, all-lowercase tokens are not either
        assert!(!is_username("Workshop"));
        assert!(!is_username("jsmith"));
        assert!(!is_username("Abc"));
    }

    #[test]
    fn test_fallback_module_from_free_text() {
        let fields = classify(&["12:00 - 13:00", "Open Day Preparation", "Staff Only Event"]);
        assert_eq!(fields.module.as_deref(), Some("Open Day Preparation"));
        assert_eq!(fields.lecturer, None);
    }

    #[test]
    fn test_comma_name_excludes_digits() {
        assert!(is_comma_name("King, John"));
        assert!(is_comma_name("O'Neil-Smith, Mary Ann"));
        assert!(!is_comma_name("101, Main Hall"));
        assert!(!is_comma_name("CO2401 - Something, else"));
    }

    #[test]
    fn test_never_panics_on_garbage() {
        let garbage: Vec<String> = vec![
            String::new(),
            "   ".to_string(),
            "((((".to_string(),
            "99:99 - 99:99".to_string(),
            "\u{feff}\u{200b}".to_string(),
            "ÄÖÜ, ß".to_string(),
            ":".repeat(500),
        ];
        let fields = classify(&garbage);
        assert_eq!(fields.time.as_deref(), Some("99:99 - 99:99"));

        let empty: [&str; 0] = [];
        assert_eq!(classify(&empty), CellFields::default());
    }

    #[test]
    fn test_custom_rule_table() {
        let only_time = [RULES[0]];
        let fields = classify_with(&only_time, &["10:00 - 11:00", "King, John"]);
        assert_eq!(fields.time.as_deref(), Some("10:00 - 11:00"));
        assert_eq!(fields.lecturer, None);
        assert_eq!(fields.module.as_deref(), Some("King, John"));
    }

    #[test]
    fn test_split_module() {
        assert_eq!(
            split_module("CO2401 - Software Development"),
            (Some("CO2401".to_string()), "Software Development".to_string())
        );
        assert_eq!(
            split_module("NU4010A: Clinical Skills"),
            (Some("NU4010A".to_string()), "Clinical Skills".to_string())
        );
        assert_eq!(split_module("Open Day"), (None, "Open Day".to_string()));
    }

    #[test]
    fn test_group_and_session_lines_both_survive() {
        let fields = classify(&[
            "09:00 - 10:00",
            "CO2401 - Software Development",
            "Lecture (On Campus)",
            "(Group: Y2 Computing)",
        ]);

        assert_eq!(fields.group.as_deref(), Some("(Group: Y2 Computing)"));
        assert_eq!(fields.session_type.as_deref(), Some("Lecture"));
        assert_eq!(fields.module.as_deref(), Some("CO2401 - Software Development"));
    }
}

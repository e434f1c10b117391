//! Weekday name to calendar date resolution.

use crate::error::{Result, TimetableError};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};

/// Canonical weekday names in `Weekday::num_days_from_monday` order.
pub const CANONICAL_WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parses one of the seven canonical names. Exact spelling only.
pub fn parse_canonical(name: &str) -> Option<Weekday> {
    match name {
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        "Sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Maps a day label from a timetable row ("Mon", "tues", "THURSDAY") to its
/// canonical name. Needs at least three letters and must be a prefix of the
/// full name.
pub fn canonical_weekday(token: &str) -> Option<&'static str> {
    let lower = token.trim().trim_end_matches('.').to_ascii_lowercase();
    if lower.len() < 3 || !lower.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    CANONICAL_WEEKDAYS
        .iter()
        .copied()
        .find(|full| full.to_ascii_lowercase().starts_with(&lower))
}

/// Returns the next date falling on `weekday_name`, counting from the local
/// date of the running process. Today counts when it matches.
pub fn resolve_next_occurrence(weekday_name: &str) -> Result<NaiveDate> {
    resolve_next_occurrence_from(weekday_name, Local::now().date_naive())
}

/// Same as [`resolve_next_occurrence`], anchored to an explicit `today`.
pub fn resolve_next_occurrence_from(weekday_name: &str, today: NaiveDate) -> Result<NaiveDate> {
    let target = parse_canonical(weekday_name).ok_or_else(|| TimetableError::InvalidWeekday {
        name: weekday_name.to_string(),
    })?;

    let days_ahead = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    Ok(today + Duration::days(i64::from(days_ahead)))
}

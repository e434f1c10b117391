/// Database types for timetable data
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-room scrape state.
///
/// `Pending -> Success` on a successful attempt; `Pending -> Pending` on a
/// failed attempt while attempts remain, `Pending -> Failed` once the bound
/// is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Pending,
    Success,
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Pending => "pending",
            ScrapeStatus::Success => "success",
            ScrapeStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScrapeStatus::Pending),
            "success" => Some(ScrapeStatus::Success),
            "failed" => Some(ScrapeStatus::Failed),
            _ => None,
        }
    }

    /// Status of a room whose latest attempt failed, given the attempt count
    /// including that failure.
    pub fn after_failure(attempts: u32, max_attempts: u32) -> Self {
        if attempts >= max_attempts {
            ScrapeStatus::Failed
        } else {
            ScrapeStatus::Pending
        }
    }

    /// Whether the room may be attempted again in this generation.
    pub fn is_eligible(&self, attempts: u32, max_attempts: u32) -> bool {
        *self != ScrapeStatus::Success && attempts < max_attempts
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ScrapeStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScrapeStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ScrapeStatus::parse(text).ok_or(FromSqlError::InvalidType)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbEvent {
    pub event_id: i64,
    pub room: String,
    pub building_code: Option<String>,
    pub day: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_label: String,
    pub module_raw: String,
    pub module_code: Option<String>,
    pub module_name: String,
    pub lecturer_raw: Option<String>,
    pub group_label: Option<String>,
    pub session_type: Option<String>,
    /// Normalized names linked through `event_lecturers`
    pub lecturers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeLogRow {
    pub room: String,
    pub building_code: String,
    pub url: String,
    pub status: ScrapeStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub events_found: u32,
    pub content_sha256: Option<String>,
}

/// Room counts per scrape status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeLogSummary {
    pub pending: u32,
    pub success: u32,
    pub failed: u32,
}

impl ScrapeLogSummary {
    pub fn total(&self) -> u32 {
        self.pending + self.success + self.failed
    }
}

/// Rows written by one `save_room_result` call. Rows that already existed
/// are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub events_inserted: usize,
    pub lecturers_inserted: usize,
    pub links_inserted: usize,
}

/// Event totals for one building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingSummary {
    pub building_code: String,
    pub rooms: u32,
    pub events: u32,
}

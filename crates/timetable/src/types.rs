/// Domain types shared by the parser, the store and the scraper
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A bookable room and the page its timetable is published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub building_code: String,
    pub name: String,
    pub url: String,
}

impl Room {
    pub fn new(
        building_code: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            building_code: building_code.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Loads a room list from a JSON array of `{building_code, name, url}`
    /// objects.
    pub fn load_list(path: &Path) -> Result<Vec<Room>> {
        let content = fs::read_to_string(path)?;
        let rooms: Vec<Room> = serde_json::from_str(&content)?;
        Ok(rooms)
    }
}

/// A campus building. Loaded by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One booking extracted from a room's timetable page.
///
/// Produced fresh on every parse and never stored as-is; the store keeps
/// its event projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub room: String,
    /// Canonical weekday name ("Monday" .. "Sunday")
    pub day: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Raw time label exactly as it appeared in the cell
    pub time_label: String,
    pub module: String,
    pub lecturer: Option<String>,
    pub group: Option<String>,
    pub session_type: Option<String>,
    /// Provenance only
    pub row: usize,
    pub col: usize,
}

//! Error types for timetable ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while scraping, parsing or storing timetables.
#[derive(Debug, Error)]
pub enum TimetableError {
    /// Weekday name was not one of the seven canonical English names
    #[error("Invalid weekday name: {name:?}")]
    InvalidWeekday { name: String },

    /// Network/HTTP request failed before a response arrived
    #[error("Network error: {message}")]
    Network { message: String },

    /// Server answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Room URL could not be parsed
    #[error("URL error: {message}")]
    InvalidUrl { message: String },

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure (archiving, reading room lists)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Room list or metadata JSON could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No scrape run has completed against this store yet
    #[error("Timetable store at {path} is not ready (no completed scrape run)")]
    StoreNotReady { path: PathBuf },

    /// A store mutex was poisoned by a panicking holder
    #[error("Failed to acquire database lock: {message}")]
    LockPoisoned { message: String },
}

impl TimetableError {
    /// Returns true if this error comes from fetching a page and the room
    /// should be attempted again on a later pass.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TimetableError::Network { .. }
                | TimetableError::HttpStatus { .. }
                | TimetableError::InvalidUrl { .. }
        )
    }
}

impl From<reqwest::Error> for TimetableError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TimetableError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => TimetableError::Network {
                message: err.to_string(),
            },
        }
    }
}

impl From<url::ParseError> for TimetableError {
    fn from(err: url::ParseError) -> Self {
        TimetableError::InvalidUrl {
            message: err.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TimetableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_errors_are_retryable() {
        let status = TimetableError::HttpStatus {
            url: "https://example.org/room".to_string(),
            status: 503,
        };
        assert!(status.is_retryable());
        assert!(TimetableError::from(url::ParseError::EmptyHost).is_retryable());
        assert!(!TimetableError::InvalidWeekday {
            name: "Funday".to_string()
        }
        .is_retryable());
    }
}

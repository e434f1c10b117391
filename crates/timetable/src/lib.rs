//! Scraper and normalized SQLite store for room-booking timetables.
//!
//! A run fetches one HTML timetable per room, parses it into
//! [`TimetableEntry`] values and stores them, with lecturers normalized,
//! in a single store generation. See [`scrape::Scraper`].

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod lecturers;
pub mod parser;
pub mod scrape;
pub mod types;

pub use config::ScrapeConfig;
pub use db::TimetableDb;
pub use error::{Result, TimetableError};
pub use scrape::{RunMode, ScrapeStats, Scraper};
pub use types::{Building, Room, TimetableEntry};

//! Scrape orchestration: turns a room list into one store generation.
//!
//! Rooms are attempted one at a time with a fixed pause between requests.
//! Rooms whose attempt failed are retried in later passes, after a longer
//! backoff, until they succeed or run out of attempts. All progress lives in
//! the store's scrape_log, so an interrupted run can be resumed.

mod client;
mod state;

pub use client::{HttpFetcher, PageFetcher};
pub use state::{RunPhase, RunProgress, RunState};

use crate::config::ScrapeConfig;
use crate::db::{ScrapeStatus, TimetableDb, LAST_COMPLETED_KEY};
use crate::error::Result;
use crate::parser::parse_room_timetable;
use crate::types::Room;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Metadata keys written by a run.
pub mod meta {
    pub const RUN_ID: &str = "run_id";
    pub const RUN_STATUS: &str = "run_status";
    pub const STARTED_AT: &str = "started_at";
    pub const RESUMED_AT: &str = "resumed_at";
    pub const FINISHED_AT: &str = "finished_at";
    pub const ROOM_COUNT: &str = "room_count";
    pub const MAX_ATTEMPTS: &str = "max_attempts";
    pub const REQUEST_DELAY_MS: &str = "request_delay_ms";
    pub const RETRY_BACKOFF_MS: &str = "retry_backoff_ms";
    pub const PASSES: &str = "passes";
    pub const ROOMS_SUCCEEDED: &str = "rooms_succeeded";
    pub const ROOMS_FAILED: &str = "rooms_failed";
    pub const EVENTS_TOTAL: &str = "events_total";
    pub const LECTURERS_TOTAL: &str = "lecturers_total";

    pub const STATUS_RUNNING: &str = "running";
    pub const STATUS_COMPLETED: &str = "completed";
}

/// How a run treats an existing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Archive whatever is there and start a new generation
    Fresh,
    /// Continue the generation in the existing store
    Resume,
    /// Resume an interrupted run, otherwise start fresh
    Auto,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeStats {
    pub run_id: String,
    pub resumed: bool,
    pub archived_store: Option<PathBuf>,
    pub passes: u32,
    pub rooms_total: u32,
    pub rooms_succeeded: u32,
    pub rooms_failed: u32,
    pub events_total: u32,
    pub lecturers_total: u32,
    pub duration_ms: u64,
}

/// Drives fetching, parsing and storing across a room list.
pub struct Scraper<F: PageFetcher> {
    config: ScrapeConfig,
    fetcher: F,
    state: Arc<RunState>,
}

impl Scraper<HttpFetcher> {
    /// Creates a scraper that fetches over HTTP.
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::with_fetcher(config, fetcher))
    }
}

impl<F: PageFetcher> Scraper<F> {
    pub fn with_fetcher(config: ScrapeConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher,
            state: Arc::new(RunState::new()),
        }
    }

    /// Shared handle on this scraper's run progress.
    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// Runs until every room has succeeded or used up its attempts.
    pub async fn run(&self, rooms: &[Room], mode: RunMode) -> Result<ScrapeStats> {
        let started = Instant::now();
        let (db, archived_store, resumed) = self.open_store(mode)?;

        let result = self.run_on(&db, rooms, resumed).await;
        match result {
            Ok((run_id, passes)) => {
                let stats = self.finish_run(&db, run_id, resumed, archived_store, passes, started)?;
                self.state.finish(RunPhase::Completed);
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, "Scrape run aborted");
                self.state.finish(RunPhase::Aborted);
                Err(e)
            }
        }
    }

    /// Opens the store for `mode`. Returns the store, the archive location of
    /// the previous generation, and whether an interrupted run is resumed.
    fn open_store(&self, mode: RunMode) -> Result<(TimetableDb, Option<PathBuf>, bool)> {
        let path = &self.config.db_path;
        match mode {
            RunMode::Fresh => {
                let (db, archived) = TimetableDb::open_fresh(path)?;
                Ok((db, archived, false))
            }
            RunMode::Resume => Ok((TimetableDb::open(path)?, None, true)),
            RunMode::Auto => {
                if path.exists() {
                    let db = TimetableDb::open(path)?;
                    if db.metadata(meta::RUN_STATUS)?.as_deref() == Some(meta::STATUS_RUNNING) {
                        info!(path = %path.display(), "Resuming interrupted scrape run");
                        return Ok((db, None, true));
                    }
                    drop(db);
                }
                let (db, archived) = TimetableDb::open_fresh(path)?;
                Ok((db, archived, false))
            }
        }
    }

    async fn run_on(&self, db: &TimetableDb, rooms: &[Room], resumed: bool) -> Result<(String, u32)> {
        let seeded = db.seed_rooms(rooms)?;
        let summary = db.scrape_log_summary()?;

        let run_id = match db.metadata(meta::RUN_ID)? {
            Some(existing) if resumed => existing,
            _ => generate_run_id(),
        };
        self.write_start_metadata(db, &run_id, resumed, summary.total())?;
        self.state
            .begin(&run_id, resumed, summary.total(), summary.success, summary.failed);

        info!(
            run_id = %run_id,
            rooms = rooms.len(),
            newly_seeded = seeded,
            already_done = summary.success,
            resumed = resumed,
            "Starting scrape run"
        );

        let mut passes = 0u32;
        loop {
            let eligible = db.eligible_rooms(self.config.max_attempts)?;
            if eligible.is_empty() {
                break;
            }

            if passes > 0 {
                info!(
                    remaining = eligible.len(),
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "Waiting before retry pass"
                );
                pause(self.config.retry_backoff).await;
            }
            passes += 1;
            self.state.start_pass(passes, eligible.len() as u32);
            info!(pass = passes, rooms = eligible.len(), "Starting pass");

            for (index, room) in eligible.iter().enumerate() {
                if index > 0 {
                    pause(self.config.request_delay).await;
                }
                self.attempt_room(db, room).await?;
            }
        }

        self.state.set_current_room(None);
        Ok((run_id, passes))
    }

    /// Makes one attempt at a room and records the outcome.
    ///
    /// Fetch and per-room store failures are recorded against the room;
    /// only a failure to record that outcome is returned as an error.
    async fn attempt_room(&self, db: &TimetableDb, room: &Room) -> Result<ScrapeStatus> {
        self.state.set_current_room(Some(&room.name));
        let start = Instant::now();

        let attempt = match self.fetcher.fetch(&room.url).await {
            Ok(html) => {
                let entries = parse_room_timetable(&html, &room.name);
                let content_sha256 = sha256_hex(&html);
                db.save_room_result(room, &entries, &content_sha256)
                    .map(|outcome| (entries.len(), outcome))
            }
            Err(e) => Err(e),
        };

        match attempt {
            Ok((found, outcome)) => {
                self.state.room_succeeded();
                info!(
                    room = %room.name,
                    entries = found,
                    new_events = outcome.events_inserted,
                    new_lecturers = outcome.lecturers_inserted,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Room scraped"
                );
                Ok(ScrapeStatus::Success)
            }
            Err(e) => {
                let status = db.record_failure(room, &e.to_string(), self.config.max_attempts)?;
                if status == ScrapeStatus::Failed {
                    self.state.room_failed();
                    error!(
                        room = %room.name,
                        error = %e,
                        "Room failed on its last attempt"
                    );
                } else {
                    warn!(
                        room = %room.name,
                        error = %e,
                        retryable = e.is_retryable(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Room attempt failed, will retry"
                    );
                }
                Ok(status)
            }
        }
    }

    fn write_start_metadata(
        &self,
        db: &TimetableDb,
        run_id: &str,
        resumed: bool,
        room_count: u32,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        db.set_metadata(meta::RUN_ID, run_id)?;
        db.set_metadata(meta::RUN_STATUS, meta::STATUS_RUNNING)?;
        if resumed {
            db.set_metadata(meta::RESUMED_AT, &now)?;
        } else {
            db.set_metadata(meta::STARTED_AT, &now)?;
        }
        db.set_metadata(meta::ROOM_COUNT, &room_count.to_string())?;
        db.set_metadata(meta::MAX_ATTEMPTS, &self.config.max_attempts.to_string())?;
        db.set_metadata(
            meta::REQUEST_DELAY_MS,
            &self.config.request_delay.as_millis().to_string(),
        )?;
        db.set_metadata(
            meta::RETRY_BACKOFF_MS,
            &self.config.retry_backoff.as_millis().to_string(),
        )?;
        Ok(())
    }

    fn finish_run(
        &self,
        db: &TimetableDb,
        run_id: String,
        resumed: bool,
        archived_store: Option<PathBuf>,
        passes: u32,
        started: Instant,
    ) -> Result<ScrapeStats> {
        let summary = db.scrape_log_summary()?;
        let stats = ScrapeStats {
            run_id,
            resumed,
            archived_store,
            passes,
            rooms_total: summary.total(),
            rooms_succeeded: summary.success,
            rooms_failed: summary.failed,
            events_total: db.event_count()?,
            lecturers_total: db.lecturer_count()?,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let now = Utc::now().to_rfc3339();
        db.set_metadata(meta::PASSES, &stats.passes.to_string())?;
        db.set_metadata(meta::ROOMS_SUCCEEDED, &stats.rooms_succeeded.to_string())?;
        db.set_metadata(meta::ROOMS_FAILED, &stats.rooms_failed.to_string())?;
        db.set_metadata(meta::EVENTS_TOTAL, &stats.events_total.to_string())?;
        db.set_metadata(meta::LECTURERS_TOTAL, &stats.lecturers_total.to_string())?;
        db.set_metadata(meta::FINISHED_AT, &now)?;
        db.set_metadata(LAST_COMPLETED_KEY, &now)?;
        db.set_metadata(meta::RUN_STATUS, meta::STATUS_COMPLETED)?;

        info!(
            run_id = %stats.run_id,
            passes = stats.passes,
            succeeded = stats.rooms_succeeded,
            failed = stats.rooms_failed,
            events = stats.events_total,
            lecturers = stats.lecturers_total,
            duration_ms = stats.duration_ms,
            "Scrape run completed"
        );
        Ok(stats)
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Hex SHA-256 of a fetched page.
fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Unique-enough id for a run: low timestamp bits plus a random suffix.
fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

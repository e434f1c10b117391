/// Database module for one generation of scraped timetable data

mod types;

pub use types::{BuildingSummary, DbEvent, SaveOutcome, ScrapeLogRow, ScrapeLogSummary, ScrapeStatus};

use crate::error::{Result, TimetableError};
use crate::lecturers::{extract_names, lecturer_key};
use crate::parser::split_module;
use crate::types::{Room, TimetableEntry};
use chrono::{Local, NaiveDateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_timetable.sql");

/// Metadata key written when a run finishes; readers require it.
pub const LAST_COMPLETED_KEY: &str = "last_completed_at";

const EVENT_COLUMNS: &str = "e.event_id, e.room, e.building_code, e.day, e.start_time, e.end_time,
     e.time_label, e.module_raw, e.module_code, e.module_name, e.lecturer_raw,
     e.group_label, e.session_type";

pub struct TimetableDb {
    db: Mutex<Connection>,
}

impl TimetableDb {
    /// Opens (creating if needed) the store at `path` and applies the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Archives any store already at `path`, then opens an empty one there.
    ///
    /// Returns the store and the archive location, if something was archived.
    pub fn open_fresh(path: &Path) -> Result<(Self, Option<PathBuf>)> {
        let archived = Self::archive_existing(path)?;
        Ok((Self::open(path)?, archived))
    }

    /// Opens a store for downstream readers.
    ///
    /// Fails with `StoreNotReady` unless a scrape run has completed against
    /// it, so readers never trigger scraping themselves. Any other SQLite
    /// failure, such as a file that is not a timetable store, is returned
    /// as `Database`.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let not_ready = || TimetableError::StoreNotReady {
            path: path.to_path_buf(),
        };
        if !path.exists() {
            return Err(not_ready());
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;

        match read_metadata(&conn, LAST_COMPLETED_KEY)? {
            Some(_) => Ok(Self {
                db: Mutex::new(conn),
            }),
            None => Err(not_ready()),
        }
    }

    /// Renames the store at `path` (and its WAL side files) out of the way.
    ///
    /// The archive is named `<stem>.<YYYYmmdd-HHMMSS>.<ext>`; an existing
    /// archive is never overwritten, a counter is appended instead.
    pub fn archive_existing(path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "timetable".to_string());
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Local::now().format("%Y%m%d-%H%M%S");

        let mut target = path.with_file_name(format!("{stem}.{stamp}{ext}"));
        let mut counter = 1;
        while target.exists() {
            target = path.with_file_name(format!("{stem}.{stamp}-{counter}{ext}"));
            counter += 1;
        }

        fs::rename(path, &target)?;
        for suffix in ["-wal", "-shm"] {
            let side = with_suffix(path, suffix);
            if side.exists() {
                fs::rename(&side, with_suffix(&target, suffix))?;
            }
        }

        info!(from = %path.display(), to = %target.display(), "Archived previous timetable store");
        Ok(Some(target))
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        // WAL keeps downstream readers unblocked while a run writes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| TimetableError::LockPoisoned {
            message: e.to_string(),
        })
    }

    /// Adds a `pending` scrape_log row for every room not logged yet.
    ///
    /// Returns the number of rooms added; rooms from an interrupted run keep
    /// their state.
    pub fn seed_rooms(&self, rooms: &[Room]) -> Result<usize> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        let mut added = 0;
        for room in rooms {
            added += tx.execute(
                "INSERT OR IGNORE INTO scrape_log (room, building_code, url, status, attempts)
                 VALUES (?1, ?2, ?3, 'pending', 0)",
                (&room.name, &room.building_code, &room.url),
            )?;
        }
        tx.commit()?;
        Ok(added)
    }

    /// Rooms that still need an attempt, in seeding order
    pub fn eligible_rooms(&self, max_attempts: u32) -> Result<Vec<Room>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT building_code, room, url FROM scrape_log
             WHERE status IN ('pending', 'failed') AND attempts < ?1
             ORDER BY rowid",
        )?;
        let rooms = stmt.query_map([max_attempts], |row| {
            Ok(Room {
                building_code: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
            })
        })?;
        Ok(rooms.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Stores the outcome of a successful attempt in one transaction:
    /// events, lecturers, their links, and the room's scrape_log row.
    ///
    /// Saving the same entries again adds no rows.
    pub fn save_room_result(
        &self,
        room: &Room,
        entries: &[TimetableEntry],
        content_sha256: &str,
    ) -> Result<SaveOutcome> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        let mut outcome = SaveOutcome::default();

        for entry in entries {
            let event_id = insert_event(&tx, room, entry, &mut outcome)?;

            let Some(raw) = entry.lecturer.as_deref() else {
                continue;
            };
            for name in extract_names(raw) {
                let key = lecturer_key(&name);
                outcome.lecturers_inserted += tx.execute(
                    "INSERT OR IGNORE INTO lecturers (name, name_key) VALUES (?1, ?2)",
                    (&name, &key),
                )?;
                let lecturer_id: i64 = tx.query_row(
                    "SELECT lecturer_id FROM lecturers WHERE name_key = ?1",
                    [&key],
                    |row| row.get(0),
                )?;
                outcome.links_inserted += tx.execute(
                    "INSERT OR IGNORE INTO event_lecturers (event_id, lecturer_id) VALUES (?1, ?2)",
                    (event_id, lecturer_id),
                )?;
            }
        }

        tx.execute(
            "INSERT INTO scrape_log (room, building_code, url, status, attempts, last_attempt,
                                     last_error, events_found, content_sha256)
             VALUES (?1, ?2, ?3, 'success', 1, ?4, NULL, ?5, ?6)
             ON CONFLICT (room) DO UPDATE SET
                status = 'success',
                attempts = attempts + 1,
                last_attempt = excluded.last_attempt,
                last_error = NULL,
                events_found = excluded.events_found,
                content_sha256 = excluded.content_sha256",
            (
                &room.name,
                &room.building_code,
                &room.url,
                Utc::now(),
                entries.len() as i64,
                content_sha256,
            ),
        )?;

        tx.commit()?;
        Ok(outcome)
    }

    /// Records a failed attempt and returns the room's new status.
    pub fn record_failure(&self, room: &Room, error: &str, max_attempts: u32) -> Result<ScrapeStatus> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;

        let previous: u32 = tx
            .query_row(
                "SELECT attempts FROM scrape_log WHERE room = ?1",
                [&room.name],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let attempts = previous + 1;
        let status = ScrapeStatus::after_failure(attempts, max_attempts);

        tx.execute(
            "INSERT INTO scrape_log (room, building_code, url, status, attempts, last_attempt, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (room) DO UPDATE SET
                status = excluded.status,
                attempts = excluded.attempts,
                last_attempt = excluded.last_attempt,
                last_error = excluded.last_error",
            (
                &room.name,
                &room.building_code,
                &room.url,
                status,
                attempts,
                Utc::now(),
                error,
            ),
        )?;

        tx.commit()?;
        Ok(status)
    }

    /// Gets the scrape_log row of one room
    pub fn scrape_log(&self, room: &str) -> Result<Option<ScrapeLogRow>> {
        let db = self.lock()?;
        let row = db
            .query_row(
                "SELECT room, building_code, url, status, attempts, last_attempt, last_error,
                        events_found, content_sha256
                 FROM scrape_log WHERE room = ?1",
                [room],
                |row| {
                    Ok(ScrapeLogRow {
                        room: row.get(0)?,
                        building_code: row.get(1)?,
                        url: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        last_attempt: row.get(5)?,
                        last_error: row.get(6)?,
                        events_found: row.get(7)?,
                        content_sha256: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Counts rooms per status
    pub fn scrape_log_summary(&self) -> Result<ScrapeLogSummary> {
        let db = self.lock()?;
        let mut stmt = db.prepare("SELECT status, COUNT(*) FROM scrape_log GROUP BY status")?;
        let mut summary = ScrapeLogSummary::default();
        let counts = stmt.query_map([], |row| {
            Ok((row.get::<_, ScrapeStatus>(0)?, row.get::<_, u32>(1)?))
        })?;
        for count in counts {
            match count? {
                (ScrapeStatus::Pending, n) => summary.pending = n,
                (ScrapeStatus::Success, n) => summary.success = n,
                (ScrapeStatus::Failed, n) => summary.failed = n,
            }
        }
        Ok(summary)
    }

    /// Sets a run metadata value, replacing any previous one
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO scrape_metadata (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value),
        )?;
        Ok(())
    }

    /// Gets a run metadata value
    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        let db = self.lock()?;
        Ok(read_metadata(&db, key)?)
    }

    pub fn event_count(&self) -> Result<u32> {
        let db = self.lock()?;
        Ok(db.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
    }

    pub fn lecturer_count(&self) -> Result<u32> {
        let db = self.lock()?;
        Ok(db.query_row("SELECT COUNT(*) FROM lecturers", [], |row| row.get(0))?)
    }

    /// Gets all events in a room, earliest first
    pub fn room_events(&self, room: &str) -> Result<Vec<DbEvent>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e
             WHERE e.room = ?1
             ORDER BY e.start_time, e.event_id"
        ))?;
        let events = stmt
            .query_map([room], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        with_lecturers(&db, events)
    }

    /// Gets all events taught by a lecturer, matched case-insensitively
    pub fn lecturer_events(&self, name: &str) -> Result<Vec<DbEvent>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e
             JOIN event_lecturers el ON el.event_id = e.event_id
             JOIN lecturers l ON l.lecturer_id = el.lecturer_id
             WHERE l.name_key = ?1
             ORDER BY e.start_time, e.event_id"
        ))?;
        let events = stmt
            .query_map([lecturer_key(name)], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        with_lecturers(&db, events)
    }

    /// Whether no event in `room` overlaps `[start, end)`
    pub fn is_room_free(&self, room: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<bool> {
        let db = self.lock()?;
        let busy: bool = db.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM events
                WHERE room = ?1 AND start_time < ?3 AND end_time > ?2
             )",
            (room, start, end),
            |row| row.get(0),
        )?;
        Ok(!busy)
    }

    /// Rooms and events per building
    pub fn building_summaries(&self) -> Result<Vec<BuildingSummary>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT COALESCE(building_code, ''), COUNT(DISTINCT room), COUNT(*)
             FROM events
             GROUP BY building_code
             ORDER BY building_code",
        )?;
        let summaries = stmt.query_map([], |row| {
            Ok(BuildingSummary {
                building_code: row.get(0)?,
                rooms: row.get(1)?,
                events: row.get(2)?,
            })
        })?;
        Ok(summaries.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn insert_event(
    tx: &Transaction<'_>,
    room: &Room,
    entry: &TimetableEntry,
    outcome: &mut SaveOutcome,
) -> Result<i64> {
    let (module_code, module_name) = split_module(&entry.module);

    outcome.events_inserted += tx.execute(
        "INSERT OR IGNORE INTO events (
            room, building_code, day, start_time, end_time, time_label,
            module_raw, module_code, module_name, lecturer_raw, group_label,
            session_type, row_index, col_index, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, datetime('now'))",
        rusqlite::params![
            &entry.room,
            &room.building_code,
            &entry.day,
            entry.start,
            entry.end,
            &entry.time_label,
            &entry.module,
            module_code,
            module_name,
            &entry.lecturer,
            &entry.group,
            &entry.session_type,
            (entry.row as i64),
            (entry.col as i64),
        ],
    )?;

    let event_id = tx.query_row(
        "SELECT event_id FROM events
         WHERE room = ?1 AND start_time = ?2 AND end_time = ?3 AND module_raw = ?4",
        (&entry.room, entry.start, entry.end, &entry.module),
        |row| row.get(0),
    )?;
    Ok(event_id)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<DbEvent> {
    Ok(DbEvent {
        event_id: row.get(0)?,
        room: row.get(1)?,
        building_code: row.get(2)?,
        day: row.get(3)?,
        start: row.get(4)?,
        end: row.get(5)?,
        time_label: row.get(6)?,
        module_raw: row.get(7)?,
        module_code: row.get(8)?,
        module_name: row.get(9)?,
        lecturer_raw: row.get(10)?,
        group_label: row.get(11)?,
        session_type: row.get(12)?,
        lecturers: Vec::new(),
    })
}

fn with_lecturers(db: &Connection, mut events: Vec<DbEvent>) -> Result<Vec<DbEvent>> {
    let mut stmt = db.prepare(
        "SELECT l.name FROM lecturers l
         JOIN event_lecturers el ON el.lecturer_id = l.lecturer_id
         WHERE el.event_id = ?1
         ORDER BY l.name",
    )?;
    for event in &mut events {
        event.lecturers = stmt
            .query_map([event.event_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
    }
    Ok(events)
}

fn read_metadata(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM scrape_metadata WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

//! Observable progress of a scrape run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Point-in-time view of a run, safe to hand to status pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub phase: RunPhase,
    pub run_id: Option<String>,
    pub resumed: bool,
    pub total_rooms: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Current pass over the eligible rooms, starting at 1
    pub pass: u32,
    /// Rooms queued in the current pass
    pub pass_rooms: u32,
    pub current_room: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunProgress {
    /// Rooms that are neither done nor given up on.
    pub fn remaining(&self) -> u32 {
        self.total_rooms
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

/// Run state owned by one scraper.
///
/// Only the scraper mutates it; anyone holding the `Arc` can read a
/// [`RunProgress`] snapshot.
#[derive(Debug, Default)]
pub struct RunState {
    progress: Mutex<RunProgress>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current progress.
    pub fn snapshot(&self) -> RunProgress {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RunProgress> {
        // Progress stays readable even if a writer panicked mid-update
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn begin(&self, run_id: &str, resumed: bool, total_rooms: u32, succeeded: u32, failed: u32) {
        *self.lock() = RunProgress {
            phase: RunPhase::Running,
            run_id: Some(run_id.to_string()),
            resumed,
            total_rooms,
            succeeded,
            failed,
            started_at: Some(Utc::now()),
            ..RunProgress::default()
        };
    }

    pub(crate) fn start_pass(&self, pass: u32, pass_rooms: u32) {
        let mut progress = self.lock();
        progress.pass = pass;
        progress.pass_rooms = pass_rooms;
    }

    pub(crate) fn set_current_room(&self, room: Option<&str>) {
        self.lock().current_room = room.map(str::to_string);
    }

    pub(crate) fn room_succeeded(&self) {
        self.lock().succeeded += 1;
    }

    pub(crate) fn room_failed(&self) {
        self.lock().failed += 1;
    }

    pub(crate) fn finish(&self, phase: RunPhase) {
        let mut progress = self.lock();
        progress.phase = phase;
        progress.current_room = None;
        progress.finished_at = Some(Utc::now());
    }
}

//! TTL-based caching for downstream aggregate queries.

use crate::db::{BuildingSummary, TimetableDb};
use crate::error::Result;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// A cached value with metadata.
#[derive(Clone)]
struct CachedValue<V> {
    value: V,
    cached_at: Instant,
    ttl: Duration,
}

impl<V> CachedValue<V> {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Thread-safe cache for values computed from the store, such as building
/// summaries or free-room listings.
///
/// Concurrent `get_or_build` callers for one key share a single rebuild.
pub struct AggregateCache<V: Clone> {
    entries: DashMap<String, CachedValue<V>>,
    /// Per-key locks serializing rebuilds
    build_locks: DashMap<String, Arc<Mutex<()>>>,
    default_ttl: Duration,
}

impl<V: Clone> AggregateCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            build_locks: DashMap::new(),
            default_ttl,
        }
    }

    /// Creates a cache with a 5-minute default TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }

    /// Gets a cached value if it exists and hasn't expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if entry.is_fresh() {
                Some(entry.value.clone())
            } else {
                drop(entry);
                self.entries.remove(key);
                None
            }
        })
    }

    /// Inserts a value with the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CachedValue {
                value,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Returns the cached value for `key`, building and caching it if absent
    /// or expired.
    ///
    /// Build errors are returned to the caller and nothing is cached.
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let lock = self.build_lock(key);
        let _guard = lock.lock().await;

        // Another caller may have rebuilt while we waited
        if let Some(value) = self.get(key) {
            debug!(key = key, "Aggregate rebuilt by concurrent caller");
            return Ok(value);
        }

        let start = Instant::now();
        let value = build().await?;
        debug!(
            key = key,
            duration_ms = start.elapsed().as_millis() as u64,
            "Aggregate rebuilt"
        );
        self.insert(key, value.clone());
        Ok(value)
    }

    fn build_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.build_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Clears all entries, e.g. after a new store generation is published.
    pub fn clear(&self) {
        self.entries.clear();
        self.prune_build_locks();
    }

    /// Number of entries, including expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries, and build locks nobody holds for keys
    /// without an entry.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| entry.is_fresh());
        self.prune_build_locks();
    }

    fn prune_build_locks(&self) {
        // A lock cloned out by a waiting caller has more than one owner
        self.build_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || self.entries.contains_key(key));
    }

    /// Build locks currently tracked.
    pub fn lock_count(&self) -> usize {
        self.build_locks.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut total = 0;
        let mut expired = 0;

        for entry in self.entries.iter() {
            total += 1;
            if !entry.is_fresh() {
                expired += 1;
            }
        }

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

impl<V: Clone> Default for AggregateCache<V> {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

/// Cache key of the per-building event totals.
pub const BUILDING_SUMMARIES_KEY: &str = "building_summaries";

impl AggregateCache<Vec<BuildingSummary>> {
    /// Per-building totals of `db`, rebuilt at most once per TTL.
    pub async fn building_summaries(&self, db: &TimetableDb) -> Result<Vec<BuildingSummary>> {
        self.get_or_build(BUILDING_SUMMARIES_KEY, || async { db.building_summaries() })
            .await
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimetableError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_expiry() {
        let cache = AggregateCache::new(Duration::from_secs(60));
        cache.insert("fresh", 1u32);
        cache.insert_with_ttl("stale", 2u32, Duration::ZERO);

        assert_eq!(cache.get("fresh"), Some(1));
        assert_eq!(
            cache.stats(),
            CacheStats {
                total_entries: 2,
                expired_entries: 1,
                active_entries: 1,
            }
        );

        cache.cleanup_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("stale"), None);

        cache.invalidate("fresh");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let cache = Arc::new(AggregateCache::<u32>::with_default_ttl());
        let builds = Arc::new(AtomicU32::new(0));

        let callers = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            tokio::spawn(async move {
                cache
                    .get_or_build("summaries", || async {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            })
        });

        for result in futures::future::join_all(callers).await {
            assert_eq!(result.unwrap().unwrap(), 42);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = AggregateCache::<u32>::with_default_ttl();

        let err = cache
            .get_or_build("rooms", || async {
                Err(TimetableError::LockPoisoned {
                    message: "test".to_string(),
                })
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        let value = cache.get_or_build("rooms", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_building_summaries_are_served_from_cache() {
        use crate::types::{Room, TimetableEntry};
        use chrono::{NaiveDate, NaiveTime};

        let db = TimetableDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let booking = |room: &str, hour: u32| TimetableEntry {
            room: room.to_string(),
            day: "Monday".to_string(),
            start: date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
            end: date.and_time(NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap()),
            time_label: format!("{hour:02}:00 - {:02}:00", hour + 1),
            module: "CO2401 - Software Development".to_string(),
            lecturer: None,
            group: None,
            session_type: None,
            row: 1,
            col: 1,
        };
        let room = Room::new("CM", "CM034", "https://timetable.example.ac.uk/rooms/CM034");
        db.save_room_result(&room, &[booking("CM034", 9)], "a").unwrap();

        let cache = AggregateCache::<Vec<BuildingSummary>>::with_default_ttl();
        let first = cache.building_summaries(&db).await.unwrap();
        assert_eq!(first[0].events, 1);

        db.save_room_result(&room, &[booking("CM034", 11)], "b").unwrap();
        assert_eq!(cache.building_summaries(&db).await.unwrap(), first);

        cache.invalidate(BUILDING_SUMMARIES_KEY);
        assert_eq!(cache.building_summaries(&db).await.unwrap()[0].events, 2);
    }

    #[tokio::test]
    async fn test_idle_build_locks_are_pruned() {
        let cache = AggregateCache::<u32>::with_default_ttl();
        cache.get_or_build("a", || async { Ok(1) }).await.unwrap();
        cache.get_or_build("b", || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.lock_count(), 2);

        // Entry "a" still cached, so its lock stays
        cache.invalidate("b");
        cache.cleanup_expired();
        assert_eq!(cache.lock_count(), 1);

        cache.clear();
        assert_eq!(cache.lock_count(), 0);
    }
}

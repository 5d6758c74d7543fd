//! Dedup cache and in-progress table shared by the task execution engine
//! (C8) and swept periodically by housekeeping (C11).

use crate::types::{CachedResult, PendingTask, MAX_IN_PROGRESS_AGE_SECS, MAX_PROCESSED_TASKS_AGE_SECS};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Tracks executions that have started but not yet finished, keyed by
/// `idempotencyKey`. Invariant: at most one entry per key.
#[derive(Default)]
pub struct InProgressTable {
    inner: DashMap<String, PendingTask>,
}

impl InProgressTable {
    /// Returns `true` if this key is already executing. Otherwise inserts
    /// it and returns `false`. Callers rely on this being atomic so two
    /// concurrent deliveries of the same key can't both "win" the check.
    pub fn begin(&self, idempotency_key: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.inner.entry(idempotency_key.to_string()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                slot.insert(PendingTask {
                    start_time: Instant::now(),
                });
                false
            }
        }
    }

    /// Removes the in-progress entry. Called unconditionally when
    /// execution finishes, success or failure.
    pub fn finish(&self, idempotency_key: &str) {
        self.inner.remove(idempotency_key);
    }

    /// Evicts entries older than [`MAX_IN_PROGRESS_AGE_SECS`] (stuck
    /// handlers). Returns the number of entries evicted.
    pub fn evict_stale(&self) -> usize {
        let max_age = Duration::from_secs(MAX_IN_PROGRESS_AGE_SECS);
        let before = self.inner.len();
        self.inner
            .retain(|_, task| task.start_time.elapsed() < max_age);
        before - self.inner.len()
    }

    /// Number of currently tracked in-progress executions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Caches the outcome of finished executions, keyed by `idempotencyKey`,
/// so a later delivery with the same key is answered directly without
/// re-invoking the handler.
#[derive(Default)]
pub struct DedupCache {
    inner: DashMap<String, CachedResult>,
}

impl DedupCache {
    /// Looks up a cached outcome without mutating anything.
    pub fn get(&self, idempotency_key: &str) -> Option<CachedResult> {
        self.inner.get(idempotency_key).map(|e| e.clone())
    }

    /// Caches an outcome, overwriting any prior entry for this key (which
    /// should never happen given the in-progress gate, but last-write-wins
    /// is the safe default if it somehow does).
    pub fn insert(&self, idempotency_key: String, result: CachedResult) {
        self.inner.insert(idempotency_key, result);
    }

    /// Evicts entries older than [`MAX_PROCESSED_TASKS_AGE_SECS`]. Returns
    /// the number of entries evicted.
    pub fn evict_stale(&self) -> usize {
        let max_age = Duration::from_secs(MAX_PROCESSED_TASKS_AGE_SECS);
        let before = self.inner.len();
        self.inner
            .retain(|_, cached| cached.timestamp.elapsed() < max_age);
        before - self.inner.len()
    }

    /// Number of currently cached outcomes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CachedError;

    #[test]
    fn in_progress_begin_is_exclusive() {
        let table = InProgressTable::default();
        assert!(!table.begin("k1"));
        assert!(table.begin("k1"));
        table.finish("k1");
        assert!(!table.begin("k1"));
    }

    #[test]
    fn dedup_cache_round_trips() {
        let cache = DedupCache::default();
        assert!(cache.get("k1").is_none());

        cache.insert(
            "k1".to_string(),
            CachedResult {
                outcome: Err(CachedError {
                    message: "boom".to_string(),
                    details: None,
                }),
                timestamp: Instant::now(),
            },
        );

        let cached = cache.get("k1").unwrap();
        assert!(cached.outcome.is_err());
    }
}

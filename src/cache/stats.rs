//! Per-cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one entity cache.
#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    store_fetches: AtomicU64,
    write_backs: AtomicU64,
    write_back_failures: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.store_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back(&self, ok: bool) {
        if ok {
            self.write_backs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_back_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
            write_backs: self.write_backs.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Reads answered from memory.
    pub hits: u64,
    /// Reads that found no live entry in memory.
    pub misses: u64,
    /// Read-through fetches issued to the store.
    pub store_fetches: u64,
    /// Values successfully written back.
    pub write_backs: u64,
    /// Write-backs that failed and were dropped.
    pub write_back_failures: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of a sync pass over one or more caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.written += other.written;
        self.failed += other.failed;
    }
}

//! Operation counters for storage instances.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by a store on every call.
#[derive(Debug, Default)]
pub struct StoreStats {
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    dels: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completed gets, hits and misses together
    pub gets: u64,
    /// Gets that found a value
    pub hits: u64,
    /// Gets that found nothing
    pub misses: u64,
    /// Completed sets
    pub sets: u64,
    /// Completed deletes
    pub dels: u64,
    /// Calls rejected because the context had fired
    pub errors: u64,
}

impl StatsSnapshot {
    /// Fraction of gets that found a value.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }
}

impl StoreStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self, hit: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_del(&self) {
        self.dels.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            dels: self.dels.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.gets,
            &self.hits,
            &self.misses,
            &self.sets,
            &self.dels,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

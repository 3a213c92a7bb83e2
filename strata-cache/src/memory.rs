//! In-memory leaf store.

use crate::config::MemoryConfig;
use crate::context::CallContext;
use crate::error::CacheResult;
use crate::lock::{KeyGuard, KeyLockTable};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::traits::{Storage, StorageKey, StorageValue};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Concurrent in-memory map implementing [`Storage`].
///
/// No eviction and no expiry. It is the simplest possible backend: usable as
/// an L1 tier, as the ultimate source in tests, or as a stand-in for a real
/// network or disk backend.
///
/// Although map access never blocks, every operation honours the call context
/// the way a real backend would: an already-fired context fails the call
/// without touching the map, and a context that fires during the call is
/// reported after the map access.
pub struct MemoryStorage<K, V> {
    data: DashMap<K, V>,
    locks: KeyLockTable<K>,
    stats: StoreStats,
    config: MemoryConfig,
}

impl<K, V> MemoryStorage<K, V>
where
    K: StorageKey,
    V: StorageValue,
{
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create an empty store with custom configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        debug!(timeout = ?config.default_timeout, "Creating in-memory store");
        Self {
            data: DashMap::new(),
            locks: KeyLockTable::new(),
            stats: StoreStats::new(),
            config,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every entry. Lock table entries are kept.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the operation counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// The store's own lock table.
    pub fn lock_table(&self) -> &KeyLockTable<K> {
        &self.locks
    }

    fn admit(&self, ctx: &CallContext, timeout: Duration) -> CacheResult<CallContext> {
        let ctx = ctx.with_timeout(timeout);
        if let Err(e) = ctx.check() {
            self.stats.record_error();
            return Err(e);
        }
        Ok(ctx)
    }

    fn settle(&self, ctx: &CallContext) -> CacheResult<()> {
        ctx.check().inspect_err(|_| self.stats.record_error())
    }
}

impl<K, V> Default for MemoryStorage<K, V>
where
    K: StorageKey,
    V: StorageValue,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Storage<K, V> for MemoryStorage<K, V>
where
    K: StorageKey,
    V: StorageValue,
{
    async fn get(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<Option<V>> {
        let ctx = self.admit(ctx, timeout)?;
        let value = self.data.get(key).map(|entry| entry.value().clone());
        self.settle(&ctx)?;
        self.stats.record_get(value.is_some());
        Ok(value)
    }

    async fn set(&self, ctx: &CallContext, key: &K, value: V, timeout: Duration) -> CacheResult<()> {
        let ctx = self.admit(ctx, timeout)?;
        self.data.insert(key.clone(), value);
        self.settle(&ctx)?;
        self.stats.record_set();
        Ok(())
    }

    async fn del(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<()> {
        let ctx = self.admit(ctx, timeout)?;
        self.data.remove(key);
        self.settle(&ctx)?;
        self.stats.record_del();
        Ok(())
    }

    async fn lock(&self, key: &K) -> KeyGuard {
        self.locks.lock(key).await
    }

    fn timeout(&self) -> Duration {
        self.config.default_timeout
    }
}

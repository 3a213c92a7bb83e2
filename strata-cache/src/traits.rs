//! Storage contract shared by leaf backends and coherent composites.

use crate::context::CallContext;
use crate::error::CacheResult;
use crate::lock::KeyGuard;
use async_trait::async_trait;
use std::hash::Hash;
use std::time::Duration;

/// Requirements on storage keys.
pub trait StorageKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> StorageKey for T where T: Eq + Hash + Clone + Send + Sync + 'static {}

/// Requirements on stored values.
pub trait StorageValue: Clone + Send + Sync + 'static {}

impl<T> StorageValue for T where T: Clone + Send + Sync + 'static {}

/// A key/value store that can serve as the cache or the source of a
/// [`CoherentStorage`](crate::CoherentStorage), including another coherent
/// storage.
///
/// Every data operation is bounded by the earlier of the context's deadline and
/// the explicit `timeout`. An elapsed budget yields
/// [`CacheError::DeadlineExceeded`](crate::CacheError::DeadlineExceeded), a
/// cancelled context yields [`CacheError::Cancelled`](crate::CacheError::Cancelled).
#[async_trait]
pub trait Storage<K, V>: Send + Sync
where
    K: StorageKey,
    V: StorageValue,
{
    /// Get a value.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(value))` if the key exists, `Ok(None)` if not found,
    /// or an error if the operation fails.
    async fn get(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<Option<V>>;

    /// Store a value. Once this returns `Ok`, subsequent gets observe it.
    async fn set(&self, ctx: &CallContext, key: &K, value: V, timeout: Duration) -> CacheResult<()>;

    /// Remove a value. Deleting an absent key is not an error.
    async fn del(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<()>;

    /// Acquire this instance's own lock for `key`.
    ///
    /// Composing layers use this to coordinate with the instance at its own
    /// granularity. The lock is held until the guard is dropped or passed to
    /// [`unlock`](Storage::unlock).
    async fn lock(&self, key: &K) -> KeyGuard;

    /// Release a lock acquired through [`lock`](Storage::lock).
    fn unlock(&self, guard: KeyGuard) {
        drop(guard);
    }

    /// Preferred timeout for calls into this instance.
    fn timeout(&self) -> Duration;

    // ========== Batch Operations (Parallel) ==========

    /// Get multiple keys concurrently.
    ///
    /// Returns values in the same order as `keys`. The first failing key
    /// fails the whole batch.
    async fn get_many(
        &self,
        ctx: &CallContext,
        keys: &[K],
        timeout: Duration,
    ) -> CacheResult<Vec<Option<V>>> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.get(ctx, key, timeout));
        try_join_all(futures).await
    }

    /// Set multiple key-value pairs concurrently.
    async fn set_many(
        &self,
        ctx: &CallContext,
        items: &[(K, V)],
        timeout: Duration,
    ) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = items
            .iter()
            .map(|(key, value)| self.set(ctx, key, value.clone(), timeout));
        try_join_all(futures).await?;
        Ok(())
    }

    /// Delete multiple keys concurrently.
    async fn del_many(&self, ctx: &CallContext, keys: &[K], timeout: Duration) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.del(ctx, key, timeout));
        try_join_all(futures).await?;
        Ok(())
    }
}

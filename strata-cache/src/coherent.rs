//! Coherent two-tier storage (cache-aside reads, write-through writes).
//!
//! A [`CoherentStorage`] is itself a [`Storage`], so it can be the cache or the
//! source of another coherent storage:
//!
//! ```text
//! L1 = Coherent(memory, L2)
//! L2 = Coherent(memory, L3)
//! L3 = persistent store
//! ```
//!
//! Each instance owns a lock table distinct from those of its tiers. Nesting
//! two levels therefore involves three independent locking domains, and
//! duplicate-population protection holds per instance, not across the whole
//! hierarchy.

use crate::config::{CoherentConfig, WritePolicy};
use crate::context::CallContext;
use crate::error::{CacheResult, Tier};
use crate::lock::{KeyGuard, KeyLockTable};
use crate::traits::{Storage, StorageKey, StorageValue};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Cache tier in front of an authoritative source tier.
///
/// # Reads
///
/// A cache hit (or a cache error) returns immediately. On a miss the key's lock
/// in this instance's table is taken and the cache is checked again, so callers
/// queued behind a populating call are served from the freshly warmed cache
/// instead of reading the source again. A source miss returns `None` without
/// writing the cache. A source hit is written into the cache before it is
/// returned; if that write fails the whole get fails, even though the value
/// exists in the source.
///
/// # Writes
///
/// `set` and `del` update the source under the source's own key lock, then the
/// cache under the cache's own key lock. A failed source write never reaches
/// the cache. A failed cache write after a successful source write is reported
/// to the caller: for `set`, the next get after a cache miss repopulates from
/// the source; for `del`, the stale cache entry stays visible until the key is
/// written or deleted again.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> CacheResult<()> {
/// let cache = Arc::new(MemoryStorage::<String, String>::new());
/// let source = Arc::new(MemoryStorage::new());
/// let store = CoherentStorage::new(cache, source);
///
/// let ctx = CallContext::background();
/// let key = "user:1".to_string();
/// store.set(&ctx, &key, "alice".to_string(), Duration::from_millis(150)).await?;
/// assert_eq!(store.get(&ctx, &key, Duration::from_secs(1)).await?, Some("alice".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct CoherentStorage<K, V, C, S> {
    /// Fast tier
    cache: Arc<C>,

    /// Authoritative tier
    source: Arc<S>,

    /// Locks serializing cache population, distinct from the tiers' own
    locks: KeyLockTable<K>,

    config: CoherentConfig,

    _value: PhantomData<fn() -> V>,
}

impl<K, V, C, S> CoherentStorage<K, V, C, S>
where
    K: StorageKey,
    V: StorageValue,
    C: Storage<K, V>,
    S: Storage<K, V>,
{
    /// Compose `cache` in front of `source`.
    pub fn new(cache: Arc<C>, source: Arc<S>) -> Self {
        Self::with_config(cache, source, CoherentConfig::default())
    }

    /// Compose with custom configuration.
    pub fn with_config(cache: Arc<C>, source: Arc<S>, config: CoherentConfig) -> Self {
        debug!(
            populate_on_miss = config.populate_on_miss,
            write_policy = ?config.write_policy,
            "Creating coherent store"
        );
        Self {
            cache,
            source,
            locks: KeyLockTable::new(),
            config,
            _value: PhantomData,
        }
    }

    /// The cache tier.
    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// The source tier.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Active configuration.
    pub fn config(&self) -> &CoherentConfig {
        &self.config
    }

    /// This instance's own lock table.
    pub fn lock_table(&self) -> &KeyLockTable<K> {
        &self.locks
    }

    async fn on_tier<T, F>(ctx: &CallContext, tier: Tier, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        ctx.race(fut).await.map_err(|e| e.in_tier(tier))
    }

    async fn acquire<St>(ctx: &CallContext, storage: &St, key: &K) -> CacheResult<KeyGuard>
    where
        St: Storage<K, V> + ?Sized,
    {
        ctx.race(async { Ok(storage.lock(key).await) }).await
    }

    async fn cache_get(&self, ctx: &CallContext, key: &K) -> CacheResult<Option<V>> {
        Self::on_tier(
            ctx,
            Tier::Cache,
            self.cache.get(ctx, key, self.cache.timeout()),
        )
        .await
    }

    /// Bring the cache in line with a source write that already succeeded.
    async fn update_cache(&self, ctx: &CallContext, key: &K, value: Option<V>) -> CacheResult<()> {
        let result = async {
            let guard = Self::acquire(ctx, self.cache.as_ref(), key).await?;
            let timeout = self.cache.timeout();
            let written = match (value, self.config.write_policy) {
                (Some(value), WritePolicy::WriteThrough) => {
                    Self::on_tier(ctx, Tier::Cache, self.cache.set(ctx, key, value, timeout)).await
                }
                _ => Self::on_tier(ctx, Tier::Cache, self.cache.del(ctx, key, timeout)).await,
            };
            self.cache.unlock(guard);
            written
        }
        .await;

        result.inspect_err(|e| {
            warn!(error = %e, "Source updated but cache update failed");
        })
    }
}

#[async_trait]
impl<K, V, C, S> Storage<K, V> for CoherentStorage<K, V, C, S>
where
    K: StorageKey,
    V: StorageValue,
    C: Storage<K, V>,
    S: Storage<K, V>,
{
    async fn get(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<Option<V>> {
        let ctx = ctx.with_timeout(timeout);

        if let Some(value) = self.cache_get(&ctx, key).await? {
            trace!("Cache hit");
            return Ok(Some(value));
        }

        debug!("Cache miss, waiting for key lock");
        let _guard = ctx.race(async { Ok(self.locks.lock(key).await) }).await?;

        if let Some(value) = self.cache_get(&ctx, key).await? {
            debug!("Cache populated while waiting for key lock");
            return Ok(Some(value));
        }

        let value = match Self::on_tier(
            &ctx,
            Tier::Source,
            self.source.get(&ctx, key, self.source.timeout()),
        )
        .await?
        {
            Some(value) => value,
            None => {
                trace!("Source miss");
                return Ok(None);
            }
        };

        if self.config.populate_on_miss {
            Self::on_tier(
                &ctx,
                Tier::Cache,
                self.cache.set(&ctx, key, value.clone(), self.cache.timeout()),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Source hit but cache population failed"))?;
            debug!("Populated cache from source");
        }

        Ok(Some(value))
    }

    async fn set(&self, ctx: &CallContext, key: &K, value: V, timeout: Duration) -> CacheResult<()> {
        let ctx = ctx.with_timeout(timeout);

        let guard = Self::acquire(&ctx, self.source.as_ref(), key).await?;
        let written = Self::on_tier(
            &ctx,
            Tier::Source,
            self.source.set(&ctx, key, value.clone(), self.source.timeout()),
        )
        .await;
        self.source.unlock(guard);
        written?;

        self.update_cache(&ctx, key, Some(value)).await
    }

    async fn del(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<()> {
        let ctx = ctx.with_timeout(timeout);

        let guard = Self::acquire(&ctx, self.source.as_ref(), key).await?;
        let deleted = Self::on_tier(
            &ctx,
            Tier::Source,
            self.source.del(&ctx, key, self.source.timeout()),
        )
        .await;
        self.source.unlock(guard);
        deleted?;

        self.update_cache(&ctx, key, None).await
    }

    async fn lock(&self, key: &K) -> KeyGuard {
        self.locks.lock(key).await
    }

    fn timeout(&self) -> Duration {
        self.config
            .timeout_override
            .unwrap_or_else(|| self.cache.timeout())
    }
}

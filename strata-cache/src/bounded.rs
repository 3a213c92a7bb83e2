//! Timeout-bounded calls.
//!
//! [`call_with_timeout`] and [`spawn_with_timeout`] run an operation on its own
//! task and race its result against a budget. Whichever finishes first wins.
//!
//! **The operation is not cancelled when the budget wins.** It keeps running
//! in the background until it finishes on its own, and its result is dropped.
//! Side effects it performs after the caller has given up (writes, network
//! calls) still happen and are not rolled back. Operations that must stop
//! promptly should watch the [`CallContext`] they are given.

use crate::context::CallContext;
use crate::error::{CacheError, CacheResult};
use crate::lock::KeyGuard;
use crate::traits::{Storage, StorageKey, StorageValue};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

async fn race_result<T, E>(ctx: &CallContext, rx: oneshot::Receiver<Result<T, E>>) -> Result<T, E>
where
    E: From<CacheError>,
{
    tokio::select! {
        biased;
        received = rx => match received {
            Ok(result) => result,
            Err(_) => Err(CacheError::Aborted.into()),
        },
        reason = ctx.done() => {
            debug!(reason = %reason, "Abandoning bounded call");
            Err(reason.into())
        }
    }
}

/// Run blocking `f` on the blocking thread pool, giving up after `timeout` or
/// when `ctx` fires.
///
/// Returns `f`'s own result if it finishes first. Otherwise returns
/// [`CacheError::DeadlineExceeded`] or [`CacheError::Cancelled`], converted
/// into `E`, and leaves `f` running to completion in the background. If `ctx`
/// has already fired, `f` is never started.
///
/// # Examples
///
/// ```
/// use strata_cache::{call_with_timeout, CacheError, CallContext};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), CacheError> {
/// let answer = call_with_timeout(&CallContext::background(), Duration::from_secs(1), || {
///     Ok::<_, CacheError>(6 * 7)
/// })
/// .await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
pub async fn call_with_timeout<T, E, F>(ctx: &CallContext, timeout: Duration, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<CacheError> + Send + 'static,
{
    let bounded = ctx.with_timeout(timeout);
    bounded.check()?;

    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        // The receiver is gone once the caller has given up.
        let _ = tx.send(f());
    });

    race_result(&bounded, rx).await
}

/// Run `fut` on its own task, giving up after `timeout` or when `ctx` fires.
///
/// The async counterpart of [`call_with_timeout`], with the same
/// fire-and-abandon semantics: a losing `fut` is detached, not aborted.
pub async fn spawn_with_timeout<T, E, Fut>(
    ctx: &CallContext,
    timeout: Duration,
    fut: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<CacheError> + Send + 'static,
{
    let bounded = ctx.with_timeout(timeout);
    bounded.check()?;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tx.send(fut.await);
    });

    race_result(&bounded, rx).await
}

/// Decorator enforcing the call budget on a store that may not honour it.
///
/// Every data operation on the inner store runs through
/// [`spawn_with_timeout`], so a backend stuck on I/O cannot hold the caller
/// past its deadline. An abandoned inner operation may still complete later;
/// for writes this means the value can land after the caller saw
/// `DeadlineExceeded`.
pub struct BoundedStorage<K, V, S> {
    inner: Arc<S>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S> BoundedStorage<K, V, S>
where
    K: StorageKey,
    V: StorageValue,
    S: Storage<K, V> + 'static,
{
    /// Wrap `inner`.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<K, V, S> Storage<K, V> for BoundedStorage<K, V, S>
where
    K: StorageKey,
    V: StorageValue,
    S: Storage<K, V> + 'static,
{
    async fn get(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<Option<V>> {
        let inner = Arc::clone(&self.inner);
        let call_ctx = ctx.clone();
        let key = key.clone();
        spawn_with_timeout(ctx, timeout, async move {
            inner.get(&call_ctx, &key, timeout).await
        })
        .await
    }

    async fn set(&self, ctx: &CallContext, key: &K, value: V, timeout: Duration) -> CacheResult<()> {
        let inner = Arc::clone(&self.inner);
        let call_ctx = ctx.clone();
        let key = key.clone();
        spawn_with_timeout(ctx, timeout, async move {
            inner.set(&call_ctx, &key, value, timeout).await
        })
        .await
    }

    async fn del(&self, ctx: &CallContext, key: &K, timeout: Duration) -> CacheResult<()> {
        let inner = Arc::clone(&self.inner);
        let call_ctx = ctx.clone();
        let key = key.clone();
        spawn_with_timeout(ctx, timeout, async move {
            inner.del(&call_ctx, &key, timeout).await
        })
        .await
    }

    async fn lock(&self, key: &K) -> KeyGuard {
        self.inner.lock(key).await
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }
}

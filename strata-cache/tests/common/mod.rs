//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_cache::*;

pub const T: Duration = Duration::from_millis(100);
pub const LONG: Duration = Duration::from_secs(10);

pub fn init_logging() {
    strata_log::init_for_tests();
}

/// Log output captured on the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events here until the guard is dropped.
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Memory store whose operations can be switched to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage<String, String>,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_del: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_dels(&self, fail: bool) {
        self.fail_del.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage<String, String> for FlakyStorage {
    async fn get(
        &self,
        ctx: &CallContext,
        key: &String,
        timeout: Duration,
    ) -> CacheResult<Option<String>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected get failure"));
        }
        self.inner.get(ctx, key, timeout).await
    }

    async fn set(
        &self,
        ctx: &CallContext,
        key: &String,
        value: String,
        timeout: Duration,
    ) -> CacheResult<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected set failure"));
        }
        self.inner.set(ctx, key, value, timeout).await
    }

    async fn del(&self, ctx: &CallContext, key: &String, timeout: Duration) -> CacheResult<()> {
        if self.fail_del.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected del failure"));
        }
        self.inner.del(ctx, key, timeout).await
    }

    async fn lock(&self, key: &String) -> KeyGuard {
        self.inner.lock(key).await
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }
}

/// Memory store that sleeps before every read, ignoring the call context
/// while asleep, like a backend stuck on I/O.
pub struct SlowStorage {
    pub delay: Duration,
    pub inner: MemoryStorage<String, String>,
}

impl SlowStorage {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: MemoryStorage::new(),
        }
    }
}

#[async_trait]
impl Storage<String, String> for SlowStorage {
    async fn get(
        &self,
        ctx: &CallContext,
        key: &String,
        timeout: Duration,
    ) -> CacheResult<Option<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .get(&CallContext::background(), key, timeout.max(self.delay))
            .await
            .and_then(|value| ctx.check().map(|_| value))
    }

    async fn set(
        &self,
        ctx: &CallContext,
        key: &String,
        value: String,
        timeout: Duration,
    ) -> CacheResult<()> {
        self.inner.set(ctx, key, value, timeout).await
    }

    async fn del(&self, ctx: &CallContext, key: &String, timeout: Duration) -> CacheResult<()> {
        self.inner.del(ctx, key, timeout).await
    }

    async fn lock(&self, key: &String) -> KeyGuard {
        self.inner.lock(key).await
    }

    fn timeout(&self) -> Duration {
        LONG
    }
}

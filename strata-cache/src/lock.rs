//! Per-key lock table.

use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Exclusive hold on one key of a [`KeyLockTable`].
///
/// The lock is released when the guard is dropped.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard").finish_non_exhaustive()
    }
}

/// Lazily populated map from key to mutex.
///
/// Exactly one mutex exists per key for the lifetime of the table. Entries are
/// never evicted, so memory grows with the number of distinct keys locked.
pub struct KeyLockTable<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyLockTable<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        // The shard guard is released before the caller awaits the mutex.
        let entry = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Wait until `key` is exclusively held by the caller.
    pub async fn lock(&self, key: &K) -> KeyGuard {
        let mutex = self.mutex_for(key);
        let guard = mutex.lock_owned().await;
        trace!(locks = self.locks.len(), "Acquired key lock");
        KeyGuard { _guard: guard }
    }

    /// Acquire `key` only if nobody holds it.
    pub fn try_lock(&self, key: &K) -> Option<KeyGuard> {
        self.mutex_for(key)
            .try_lock_owned()
            .ok()
            .map(|guard| KeyGuard { _guard: guard })
    }

    /// Release a previously acquired key.
    pub fn unlock(&self, guard: KeyGuard) {
        drop(guard);
    }

    /// Whether a mutex has ever been created for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of resident mutexes.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyLockTable<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for KeyLockTable<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLockTable")
            .field("len", &self.locks.len())
            .finish()
    }
}

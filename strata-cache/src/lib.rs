//! Coherent multi-tier key/value caching.
//!
//! Provides a storage contract ([`Storage`]) and a composite
//! ([`CoherentStorage`]) that places a fast cache in front of an authoritative
//! source, keeping the two consistent under concurrent access. Because the
//! composite satisfies the same contract, hierarchies of any depth can be
//! built by nesting.
//!
//! # Features
//!
//! - **Cache-aside reads** - one population per key per instance, even under
//!   a burst of concurrent misses
//! - **Write-through writes** - source first, then cache, each under its own
//!   per-key lock
//! - **Budgeted calls** - every operation takes a [`CallContext`] and a
//!   timeout; the tighter one wins
//! - **Bounded calls** - [`call_with_timeout`] and [`BoundedStorage`] cap
//!   backends that ignore their budget
//!
//! # Examples
//!
//! ## Two tiers
//!
//! ```
//! use strata_cache::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> CacheResult<()> {
//! let l1 = Arc::new(MemoryStorage::<String, String>::new());
//! let db = Arc::new(MemoryStorage::new());
//! let store = CoherentStorage::new(l1.clone(), db.clone());
//!
//! let ctx = CallContext::background();
//! let key = "k2".to_string();
//! db.set(&ctx, &key, "v2".to_string(), db.timeout()).await?;
//!
//! // Misses L1, reads the source and warms L1.
//! assert_eq!(store.get(&ctx, &key, Duration::from_secs(1)).await?, Some("v2".to_string()));
//! assert_eq!(l1.get(&ctx, &key, l1.timeout()).await?, Some("v2".to_string()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Three levels
//!
//! ```
//! use strata_cache::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let l3 = Arc::new(MemoryStorage::<u64, String>::new());
//! let l2 = Arc::new(CoherentStorage::new(Arc::new(MemoryStorage::new()), l3.clone()));
//! let l1 = CoherentStorage::new(Arc::new(MemoryStorage::new()), l2.clone());
//!
//! let ctx = CallContext::background();
//! l1.set(&ctx, &7, "seven".to_string(), l1.timeout()).await?;
//! assert_eq!(l3.get(&ctx, &7, l3.timeout()).await?, Some("seven".to_string()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod bounded;
pub mod coherent;
pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod memory;
pub mod stats;
pub mod traits;

pub use bounded::{call_with_timeout, spawn_with_timeout, BoundedStorage};
pub use coherent::CoherentStorage;
pub use config::{CoherentConfig, MemoryConfig, WritePolicy, DEFAULT_MEMORY_TIMEOUT};
pub use context::{CallContext, CancelHandle};
pub use error::{CacheError, CacheResult, Tier};
pub use lock::{KeyGuard, KeyLockTable};
pub use memory::MemoryStorage;
pub use stats::{StatsSnapshot, StoreStats};
pub use traits::{Storage, StorageKey, StorageValue};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bounded::{call_with_timeout, spawn_with_timeout, BoundedStorage};
    pub use crate::coherent::CoherentStorage;
    pub use crate::config::{CoherentConfig, MemoryConfig, WritePolicy};
    pub use crate::context::{CallContext, CancelHandle};
    pub use crate::error::{CacheError, CacheResult, Tier};
    pub use crate::memory::MemoryStorage;
    pub use crate::traits::Storage;
}

// Strata - coherent multi-tier key/value caching for Rust
//
// A cache tier in front of an authoritative source, kept consistent under
// concurrent access, composable into hierarchies of any depth.

// Re-export the storage layer
pub use strata_cache::*;

pub use strata_cache as cache;

// Re-export optional crates
#[cfg(feature = "log")]
pub use strata_log as log;

//! Store configuration types.
//!
//! # Environment Variables
//!
//! - `STRATA_DEFAULT_TIMEOUT_MS` - Default timeout of in-memory stores
//! - `STRATA_POPULATE_ON_MISS=1|0` - Whether coherent gets warm the cache
//! - `STRATA_WRITE_POLICY=write-through|invalidate` - Cache handling on writes
//! - `STRATA_TIMEOUT_OVERRIDE_MS` - Default timeout of coherent stores
//!
//! Flags accept `1`, `true`, `yes` or `on` and `0`, `false`, `no` or `off`,
//! case-insensitively. Empty values count as unset.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Default operation timeout of in-memory stores.
pub const DEFAULT_MEMORY_TIMEOUT: Duration = Duration::from_millis(100);

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parse_millis(name: &str, raw: &str) -> CacheResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| CacheError::Config(format!("{}={:?}: {}", name, raw, e)))
}

fn parse_flag(name: &str, raw: &str) -> CacheResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::Config(format!(
            "{}={:?}: expected a boolean",
            name, raw
        ))),
    }
}

/// In-memory store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Value reported by `Storage::timeout`
    pub default_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_MEMORY_TIMEOUT,
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Read `STRATA_DEFAULT_TIMEOUT_MS`, rejecting malformed values.
    pub fn try_from_env() -> CacheResult<Self> {
        Self::try_from_lookup(env_var)
    }

    /// Read the environment, falling back to defaults on malformed values.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Like [`try_from_env`](Self::try_from_env), reading variables through
    /// `lookup`.
    pub fn try_from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = non_empty(&lookup, "STRATA_DEFAULT_TIMEOUT_MS") {
            config.default_timeout = parse_millis("STRATA_DEFAULT_TIMEOUT_MS", &raw)?;
        }
        Ok(config)
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::try_from_lookup(lookup).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring memory store environment configuration");
            Self::default()
        })
    }
}

/// What a coherent store does to its cache tier on set/del.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Write the new value (or delete) in the cache after the source
    #[default]
    WriteThrough,
    /// Delete the cache entry after the source write; the next get repopulates
    Invalidate,
}

impl WritePolicy {
    /// Parse a policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "write-through" | "write_through" | "writethrough" => Some(Self::WriteThrough),
            "invalidate" => Some(Self::Invalidate),
            _ => None,
        }
    }
}

/// Coherent store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoherentConfig {
    /// Write source hits back into the cache
    pub populate_on_miss: bool,

    /// Cache handling on set/del
    pub write_policy: WritePolicy,

    /// Replaces the cache's timeout as this store's default
    pub timeout_override: Option<Duration>,
}

impl Default for CoherentConfig {
    fn default() -> Self {
        Self {
            populate_on_miss: true,
            write_policy: WritePolicy::WriteThrough,
            timeout_override: None,
        }
    }
}

impl CoherentConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether source hits warm the cache.
    pub fn with_populate_on_miss(mut self, populate: bool) -> Self {
        self.populate_on_miss = populate;
        self
    }

    /// Set the write policy.
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Override the default timeout.
    pub fn with_timeout_override(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Read `STRATA_*` variables, rejecting malformed values.
    pub fn try_from_env() -> CacheResult<Self> {
        Self::try_from_lookup(env_var)
    }

    /// Read the environment, falling back to defaults on malformed values.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Like [`try_from_env`](Self::try_from_env), reading variables through
    /// `lookup`.
    pub fn try_from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = non_empty(&lookup, "STRATA_POPULATE_ON_MISS") {
            config.populate_on_miss = parse_flag("STRATA_POPULATE_ON_MISS", &raw)?;
        }

        if let Some(raw) = non_empty(&lookup, "STRATA_WRITE_POLICY") {
            config.write_policy = WritePolicy::parse(&raw).ok_or_else(|| {
                CacheError::Config(format!("STRATA_WRITE_POLICY={:?}: unknown policy", raw))
            })?;
        }

        if let Some(raw) = non_empty(&lookup, "STRATA_TIMEOUT_OVERRIDE_MS") {
            config.timeout_override = Some(parse_millis("STRATA_TIMEOUT_OVERRIDE_MS", &raw)?);
        }

        Ok(config)
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::try_from_lookup(lookup).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring coherent store environment configuration");
            Self::default()
        })
    }
}

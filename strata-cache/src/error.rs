//! Error types for storage operations.

use std::fmt;
use thiserror::Error;

/// Result type for storage operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Which side of a coherent store produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// The fast tier that serves reads
    Cache,
    /// The authoritative tier behind the cache
    Source,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Cache => write!(f, "cache"),
            Tier::Source => write!(f, "source"),
        }
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The effective deadline elapsed before the operation completed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The call context was cancelled for a reason other than its deadline
    #[error("Operation cancelled")]
    Cancelled,

    /// Error raised by one tier of a coherent store
    #[error("{tier} tier error: {source}")]
    Tier {
        /// Tier that failed
        tier: Tier,
        /// Underlying error
        #[source]
        source: Box<CacheError>,
    },

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A bounded task ended without producing a result (panic or runtime shutdown)
    #[error("Bounded call aborted before producing a result")]
    Aborted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Wrap any backend error.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }

    /// Attribute this error to a tier.
    ///
    /// Deadline and cancellation errors describe the caller's budget rather
    /// than a tier, so they pass through unchanged. An error that already
    /// carries a tier is wrapped again, so nested stores build up the path
    /// from the outermost tier inwards.
    pub fn in_tier(self, tier: Tier) -> Self {
        match self {
            Self::DeadlineExceeded | Self::Cancelled => self,
            other => Self::Tier {
                tier,
                source: Box::new(other),
            },
        }
    }

    /// The outermost tier this error was attributed to, if any.
    ///
    /// This is the tier of the store the caller talked to.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::Tier { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Every tier the error passed through, outermost first.
    pub fn tier_path(&self) -> Vec<Tier> {
        let mut path = Vec::new();
        let mut current = self;
        while let Self::Tier { tier, source } = current {
            path.push(*tier);
            current = source;
        }
        path
    }

    /// Check if this is a deadline error, looking through tier wrappers.
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Self::DeadlineExceeded => true,
            Self::Tier { source, .. } => source.is_deadline_exceeded(),
            _ => false,
        }
    }

    /// Check if this is a cancellation error, looking through tier wrappers.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Tier { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

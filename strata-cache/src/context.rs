//! Call contexts: the deadline and cancellation signal carried by every
//! storage operation.
//!
//! A [`CallContext`] is cheap to clone and immutable. Tighter contexts are
//! derived from looser ones with [`CallContext::with_timeout`] and
//! [`CallContext::with_cancel`]; a derived context fires when either its own
//! signal or any ancestor's signal fires.

use crate::error::{CacheError, CacheResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Deadline plus cancellation signals for one logical call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Cancels the context it was created with, and every context derived from it.
///
/// Dropping the handle does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated contexts.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CallContext {
    /// A context that never expires and is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context whose deadline is the earlier of this context's
    /// deadline and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a context with an absolute deadline. The earlier deadline wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            signals: self.signals.clone(),
        }
    }

    /// Derive a cancellable context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut signals = self.signals.clone();
        signals.push(rx);
        (
            Self {
                deadline: self.deadline,
                signals,
            },
            CancelHandle { tx },
        )
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The error this context has already fired with, if any.
    ///
    /// Cancellation takes precedence when both signals have fired.
    pub fn err(&self) -> Option<CacheError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(CacheError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CacheError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail fast if the context has already fired.
    pub fn check(&self) -> CacheResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolve once the context fires, yielding the reason.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> CacheError {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancelled = async {
            if self.signals.is_empty() {
                return std::future::pending::<()>().await;
            }
            let waits = self.signals.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        // Handle dropped without cancelling; this signal can never fire.
                        std::future::pending::<()>().await;
                    }
                })
            });
            futures::future::select_all(waits).await;
        };

        tokio::select! {
            biased;
            _ = cancelled => CacheError::Cancelled,
            _ = expired => CacheError::DeadlineExceeded,
        }
    }

    /// Drive `fut` until it completes or this context fires, whichever is first.
    ///
    /// When the context wins, `fut` is dropped.
    pub async fn race<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            result = fut => result,
            err = self.done() => Err(err),
        }
    }
}

/// Cancellable, deadline-bounded context threaded through every fetch and load
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl LoadContext {
    /// Context without a deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the context. Clones share the flag, so this may be called from another thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True once the context is cancelled or past its deadline
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Request timeout for a single network call: the smaller of `limit` and what is left
    pub fn request_timeout(&self, limit: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(limit),
            None => limit,
        }
    }

    /// Fail with `Cancelled` or `Timeout` if the context is done
    pub fn check(&self, uri: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                uri: uri.to_string(),
            });
        }
        if self.is_expired() {
            return Err(Error::Timeout {
                uri: uri.to_string(),
            });
        }
        Ok(())
    }
}

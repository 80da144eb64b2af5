//! Execution context carried by every operation.
//!
//! A [`Context`] holds a cancellation signal and an optional deadline.
//! Drivers call [`Context::check`] before each action and before committing
//! a write, so an already-canceled or expired context fails fast without
//! touching the backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::{ContextError, DocstoreResult};

/// Cancellation and deadline scope for document store operations.
///
/// Cloning a context, or deriving one with [`Context::with_timeout`] or
/// [`Context::with_deadline`], shares the cancellation signal: canceling any
/// of them cancels all.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancel: Arc::new(tx),
            deadline: None,
        }
    }

    /// Derives a context whose deadline is `timeout` from now, or the
    /// current deadline if that is earlier. A timeout too large to represent
    /// adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derives a context with the given deadline, or the current deadline if
    /// that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancel: Arc::clone(&self.cancel),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context sharing its signal.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns an error if the context is canceled or past its deadline.
    pub fn check(&self) -> DocstoreResult<()> {
        if self.is_cancelled() {
            return Err(ContextError::Canceled.into());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ContextError::DeadlineExceeded.into());
            }
        }
        Ok(())
    }

    /// Completes once the context is canceled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as self, so wait_for only ends on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

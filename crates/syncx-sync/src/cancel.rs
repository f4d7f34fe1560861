//! Cooperative cancellation signal with an optional deadline
//!
//! A [`CancelSignal`] is handed by reference to every operation that may
//! wait. It fires either when someone calls [`CancelSignal::cancel`] (on it,
//! a clone, or an ancestor) or when its deadline elapses. Nothing is ever
//! preempted: waiting operations observe the signal at their own checkpoints.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use syncx_sync::{CancelReason, CancelSignal};
//!
//! let root = CancelSignal::new();
//! let bounded = root.with_timeout(Duration::from_secs(30));
//! assert!(bounded.deadline().is_some());
//!
//! root.cancel();
//! assert_eq!(bounded.reason(), Some(CancelReason::Canceled));
//! ```

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`CancelSignal`] fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called on the signal or one of its ancestors
    Canceled,
    /// The deadline attached to the signal elapsed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("canceled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// A cloneable cancellation handle with an optional deadline
///
/// Clones share the same cancel flag. Derived signals ([`child`],
/// [`with_timeout`], [`with_deadline`]) fire whenever their parent fires, but
/// cancelling a derived signal never affects the parent.
///
/// [`child`]: CancelSignal::child
/// [`with_timeout`]: CancelSignal::with_timeout
/// [`with_deadline`]: CancelSignal::with_deadline
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    /// Manually triggerable flag, linked to the parent's flag
    token: CancellationToken,
    /// Earliest deadline along the derivation chain
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Create a root signal with no deadline that fires only on `cancel()`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a signal that can be cancelled independently of this one
    ///
    /// The child keeps this signal's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a signal that additionally fires `timeout` from now
    ///
    /// A timeout too large to represent leaves the deadline unchanged.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derive a signal that additionally fires at `deadline`
    ///
    /// If this signal already has an earlier deadline, the earlier one wins.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Fire the signal for this handle, its clones and every derived signal
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline carried by this signal, if any
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the signal fired, or `None` if it has not
    ///
    /// An elapsed deadline takes precedence over an explicit cancel.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(CancelReason::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(CancelReason::Canceled)
        } else {
            None
        }
    }

    /// Wait until the signal fires
    ///
    /// Completes immediately if it already has. Cancel safe.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

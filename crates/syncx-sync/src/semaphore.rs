//! Cancellable counting semaphore
//!
//! Held permits are tokens in a bounded queue whose capacity is the permit
//! count: acquiring pushes a token, releasing pops one. The queue does all the
//! bookkeeping, so `held + available == max_permits` holds at every
//! observable point without any extra lock.
//!
//! Permits are not RAII guards. Whoever acquires is responsible for calling
//! [`Semaphore::release`], which also makes partial bulk acquisition possible.
//!
//! # Example
//!
//! ```rust,no_run
//! use syncx_sync::{CancelSignal, Semaphore};
//!
//! # async fn example() -> Result<(), syncx_sync::SemaphoreError> {
//! let semaphore = Semaphore::new(4)?;
//! let signal = CancelSignal::new();
//!
//! semaphore.acquire(&signal).await?;
//! // Do work while holding the permit
//! semaphore.release().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::cancel::CancelSignal;

/// Errors returned by [`Semaphore`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemaphoreError {
    /// A count argument was out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// More permits were requested than the semaphore will ever have
    #[error("Requested {requested} permits but capacity is {capacity}")]
    CapacityExceeded {
        /// Permits requested by the caller
        requested: usize,
        /// Total capacity of the semaphore
        capacity: usize,
    },

    /// The cancellation signal fired before the acquisition completed
    ///
    /// `acquired` permits were taken before that and are still held by the
    /// caller.
    #[error("Acquire canceled after {acquired} permit(s)")]
    AcquireCanceled {
        /// Permits taken before cancellation
        acquired: usize,
    },

    /// The token queue was closed; cannot happen while a handle is alive
    #[error("Semaphore closed")]
    Closed,
}

/// A cancellable counting semaphore for bounding concurrency
///
/// # Design
///
/// - **Token queue**: held permits are tokens in a bounded `tokio::sync::mpsc`
///   queue sized to the permit count
/// - **FIFO waiters**: blocked acquirers and releasers are served in the
///   queue's arrival order
/// - **Manual release**: no guard type; releasing is explicit
/// - **Cloneable**: clones share the same permits
///
/// # Hazard: over-release hangs
///
/// [`release`](Self::release) withdraws a token. With no permit held there is
/// no token to withdraw, so the call waits until some other task acquires
/// one. Releasing more than you acquired therefore suspends the caller
/// indefinitely instead of returning an error.
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner>,
}

/// Internal shared state for the semaphore
struct SemaphoreInner {
    /// Pushing a token acquires a permit
    acquire_tx: mpsc::Sender<()>,
    /// Popping a token releases a permit
    release_rx: Mutex<mpsc::Receiver<()>>,
    /// Total permits (fixed at construction)
    max_permits: usize,
}

impl Semaphore {
    /// Create a new semaphore with the given number of permits
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::InvalidArgument`] if `permits` is 0 or larger
    /// than the runtime supports.
    ///
    /// # Example
    ///
    /// ```rust
    /// use syncx_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1024).unwrap();
    /// assert_eq!(sem.available_permits(), 1024);
    /// assert!(Semaphore::new(0).is_err());
    /// ```
    pub fn new(permits: usize) -> Result<Self, SemaphoreError> {
        if permits < 1 {
            return Err(SemaphoreError::InvalidArgument(
                "invalid number of permits, less than 1".to_string(),
            ));
        }
        if permits > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(SemaphoreError::InvalidArgument(format!(
                "invalid number of permits, more than {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }

        let (acquire_tx, release_rx) = mpsc::channel(permits);
        Ok(Self {
            inner: Arc::new(SemaphoreInner {
                acquire_tx,
                release_rx: Mutex::new(release_rx),
                max_permits: permits,
            }),
        })
    }

    /// Acquire one permit, waiting until one is free or `signal` fires
    ///
    /// A signal that has already fired wins over a free permit.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::AcquireCanceled`] (with `acquired: 0`) if the
    /// signal fires first. No permit is taken in that case.
    pub async fn acquire(&self, signal: &CancelSignal) -> Result<(), SemaphoreError> {
        tokio::select! {
            biased;
            () = signal.cancelled() => {
                trace!("acquire canceled");
                Err(SemaphoreError::AcquireCanceled { acquired: 0 })
            }
            sent = self.inner.acquire_tx.send(()) => {
                sent.map_err(|_| SemaphoreError::Closed)?;
                trace!(available = self.available_permits(), "permit acquired");
                Ok(())
            }
        }
    }

    /// Acquire `n` permits one at a time
    ///
    /// Returns the number of permits acquired, which is `n` on success.
    ///
    /// Partial acquisition is kept: if `signal` fires midway, the permits
    /// already taken stay held and are reported through
    /// [`SemaphoreError::AcquireCanceled`]. Release them if the partial result
    /// is not wanted.
    ///
    /// # Errors
    ///
    /// - [`SemaphoreError::CapacityExceeded`] if `n` exceeds
    ///   [`max_permits`](Self::max_permits); nothing is acquired
    /// - [`SemaphoreError::AcquireCanceled`] if the signal fires first
    pub async fn acquire_many(
        &self,
        signal: &CancelSignal,
        n: usize,
    ) -> Result<usize, SemaphoreError> {
        if n > self.max_permits() {
            return Err(SemaphoreError::CapacityExceeded {
                requested: n,
                capacity: self.max_permits(),
            });
        }

        for acquired in 0..n {
            if let Err(err) = self.acquire(signal).await {
                return match err {
                    SemaphoreError::AcquireCanceled { .. } => {
                        debug!(acquired, requested = n, "bulk acquire canceled");
                        Err(SemaphoreError::AcquireCanceled { acquired })
                    }
                    other => Err(other),
                };
            }
        }
        Ok(n)
    }

    /// Try to acquire a permit without waiting
    ///
    /// Returns `true` if a permit was taken.
    ///
    /// # Example
    ///
    /// ```rust
    /// use syncx_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1).unwrap();
    /// assert!(sem.try_acquire());
    /// assert!(!sem.try_acquire());
    /// ```
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.inner.acquire_tx.try_send(()).is_ok()
    }

    /// Release one permit
    ///
    /// # Hangs
    ///
    /// If no permit is currently held this waits until another task acquires
    /// one, which may be never. It does not return an error. Only release
    /// permits you acquired.
    pub async fn release(&self) {
        let mut release_rx = self.inner.release_rx.lock().await;
        if release_rx.recv().await.is_some() {
            trace!(available = self.available_permits(), "permit released");
        }
    }

    /// Release `n` permits, one at a time
    ///
    /// Inherits the over-release hang of [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::InvalidArgument`] if `n` exceeds
    /// [`max_permits`](Self::max_permits); nothing is released.
    pub async fn release_many(&self, n: usize) -> Result<(), SemaphoreError> {
        if n > self.max_permits() {
            return Err(SemaphoreError::InvalidArgument(format!(
                "too many requested releases: {n} > {}",
                self.max_permits()
            )));
        }

        for _ in 0..n {
            self.release().await;
        }
        Ok(())
    }

    /// Get the number of available permits
    ///
    /// Never waits. The value may change immediately after reading.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.acquire_tx.capacity()
    }

    /// Get the maximum number of permits (configured limit)
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.inner.max_permits
    }

    /// Get the number of permits currently held (max - available)
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.max_permits() - self.available_permits()
    }

    /// Acquire every permit that is available right now
    ///
    /// Samples [`available_permits`](Self::available_permits) once and then
    /// acquires that many, so permits released during the call are not
    /// picked up. Returns the number acquired.
    ///
    /// # Errors
    ///
    /// Same as [`acquire_many`](Self::acquire_many); on cancellation the
    /// partial count is kept and reported.
    pub async fn drain_permits(&self, signal: &CancelSignal) -> Result<usize, SemaphoreError> {
        let available = self.available_permits();
        if available == 0 {
            return Ok(0);
        }
        self.acquire_many(signal, available).await
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("max_permits", &self.max_permits())
            .field("available_permits", &self.available_permits())
            .finish()
    }
}

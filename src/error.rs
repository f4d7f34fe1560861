//! Error handling and types

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from batch tasks
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A fault reported by one batch task
///
/// Cloning is cheap: the underlying error and backtrace are shared.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The task returned an error; kept verbatim
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync + 'static>),

    /// The task panicked and the panic was recovered
    #[error("Task panicked: {message}\n{stack}")]
    Panicked {
        /// Panic payload rendered as text
        message: String,
        /// Stack captured where the panic was recovered
        stack: Arc<Backtrace>,
    },
}

impl TaskError {
    /// Wrap an error returned by a task
    pub fn failed(err: impl Into<BoxError>) -> Self {
        let boxed: BoxError = err.into();
        Self::Failed(Arc::from(boxed))
    }

    /// Build a recovered-panic fault from a panic payload
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        Self::Panicked {
            message: panic_message(payload),
            stack: Arc::new(Backtrace::force_capture()),
        }
    }

    /// Whether this fault came from a recovered panic
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Downcast the task's own error to a concrete type
    ///
    /// Always `None` for recovered panics.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Failed(err) => err.downcast_ref::<E>(),
            Self::Panicked { .. } => None,
        }
    }
}

/// Extract a human-readable message from a panic payload
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! syncx: cancellable concurrency primitives for tokio
//!
//! This library provides two independent building blocks for coordinating
//! parallel work inside a process: a counting [`Semaphore`] with cancellable
//! single and bulk acquisition, and an [`AdvancedWaitGroup`] that runs a batch
//! of fallible tasks concurrently, recovers panics as errors, and honours
//! stop-on-error, cancellation and deadlines.

pub mod cli;
pub mod demo;
pub mod error;
pub mod wait_group;

// Re-export commonly used types
pub use error::{BoxError, TaskError};
pub use syncx_sync::{CancelReason, CancelSignal, Semaphore, SemaphoreError};
pub use wait_group::{AdvancedWaitGroup, Status, Task};

//! Cancellable synchronization primitives for the tokio runtime
//!
//! # Primitives
//!
//! - [`Semaphore`] - Counting semaphore with cancellable single and bulk acquire
//! - [`CancelSignal`] - Cooperative cancellation handle with an optional deadline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use syncx_sync::{CancelSignal, Semaphore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sem = Semaphore::new(100).unwrap();
//!     let signal = CancelSignal::new().with_timeout(Duration::from_secs(5));
//!
//!     // Spawn many tasks, but only 100 run concurrently
//!     for i in 0..1000 {
//!         let sem = sem.clone();
//!         let signal = signal.clone();
//!         tokio::spawn(async move {
//!             if sem.acquire(&signal).await.is_ok() {
//!                 println!("Task {}", i);
//!                 sem.release().await;
//!             }
//!         });
//!     }
//! }
//! ```

mod cancel;
mod semaphore;

pub use cancel::{CancelReason, CancelSignal};
pub use semaphore::{Semaphore, SemaphoreError};

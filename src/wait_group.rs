//! Advanced wait group: run a batch of fallible tasks concurrently
//!
//! Tasks are registered up front, then [`AdvancedWaitGroup::start`] dispatches
//! each one onto its own tokio task and waits until one of:
//!
//! - every dispatched task has reported (`Success`, failures allowed unless
//!   stop-on-error is set)
//! - a task fails while stop-on-error is set (`Error`)
//! - the cancellation signal fires (`Timeout` if it carries a deadline,
//!   `Canceled` otherwise)
//!
//! A task that panics is caught on its own task and reported as
//! [`TaskError::Panicked`], exactly like a returned error. When `start` exits
//! early, tasks that are still running are left to finish in the background;
//! their results are discarded.
//!
//! # Locking
//!
//! Tasks and configuration sit behind one async mutex that `start` holds for
//! the whole run, so setters, `add` and `reset` wait for a running batch.
//! Status and errors live in a separate snapshot that `start` updates as
//! reports arrive; reading them never waits. This departs from a design
//! where reads share the run's lock and block until `start` returns; here a
//! run in progress is visible as [`Status::Running`].
//!
//! If the `start` future is dropped before the batch finishes (a timeout
//! around it, a lost `select!`), the run is marked [`Status::Canceled`] and
//! its dispatched tasks are left to finish in the background.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use syncx::{AdvancedWaitGroup, Status};
//!
//! # async fn example() {
//! let wg = AdvancedWaitGroup::new();
//! wg.add(|| async { Ok::<_, std::io::Error>(()) })
//!     .await
//!     .set_timeout(Duration::from_secs(5))
//!     .await
//!     .set_stop_on_error(true)
//!     .await
//!     .start()
//!     .await;
//!
//! assert_eq!(wg.status(), Status::Success);
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use syncx_sync::CancelSignal;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{BoxError, TaskError};

/// Outcome of the most recent [`AdvancedWaitGroup::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Not started since creation or the last reset
    #[default]
    Idle,
    /// A batch is in progress
    Running,
    /// Every dispatched task reported
    Success,
    /// The signal fired and it carries a deadline
    Timeout,
    /// The signal was cancelled explicitly
    Canceled,
    /// A task failed while stop-on-error was set
    Error,
}

impl Status {
    /// Whether this is one of the final outcomes of a run
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Timeout | Self::Canceled | Self::Error
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

type AsyncFn = dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;
type BlockingFn = dyn Fn() -> Result<(), BoxError> + Send + Sync;

/// One result sent back by a dispatched task: its index and outcome
type Report = (usize, Result<(), TaskError>);

/// A zero-argument fallible operation that can be registered with a wait group
///
/// The operation is called once per `start`, so a batch can be run again.
#[derive(Clone)]
pub struct Task {
    kind: TaskKind,
}

#[derive(Clone)]
enum TaskKind {
    Async(Arc<AsyncFn>),
    Blocking(Arc<BlockingFn>),
}

impl Task {
    /// Wrap an async operation; it runs on `tokio::spawn`
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let run = move || -> BoxFuture<'static, Result<(), BoxError>> {
            f().map(|result| result.map_err(Into::into)).boxed()
        };
        Self {
            kind: TaskKind::Async(Arc::new(run)),
        }
    }

    /// Wrap a blocking operation; it runs on tokio's blocking thread pool
    pub fn blocking<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let run = move || -> Result<(), BoxError> { f().map_err(Into::into) };
        Self {
            kind: TaskKind::Blocking(Arc::new(run)),
        }
    }

    /// Run the task detached, reporting exactly once on `reports`
    fn dispatch(&self, index: usize, reports: mpsc::Sender<Report>) {
        match &self.kind {
            TaskKind::Async(run) => {
                let run = Arc::clone(run);
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(async move { run().await })
                        .catch_unwind()
                        .await;
                    send_report(&reports, index, outcome);
                });
            }
            TaskKind::Blocking(run) => {
                let run = Arc::clone(run);
                tokio::task::spawn_blocking(move || {
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| run()));
                    send_report(&reports, index, outcome);
                });
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TaskKind::Async(_) => "async",
            TaskKind::Blocking(_) => "blocking",
        };
        f.debug_struct("Task").field("kind", &kind).finish()
    }
}

/// Convert a task outcome into a report and hand it to the coordinator
///
/// The queue holds one slot per task, so this never waits. A closed queue
/// means the coordinator already returned.
fn send_report(
    reports: &mpsc::Sender<Report>,
    index: usize,
    outcome: std::thread::Result<Result<(), BoxError>>,
) {
    let result = match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskError::failed(err)),
        Err(payload) => {
            let fault = TaskError::from_panic(&*payload);
            warn!(task = index, "recovered panic in batch task");
            Err(fault)
        }
    };

    if reports.try_send((index, result)).is_err() {
        trace!(task = index, "batch already finished, result discarded");
    }
}

/// Wait for `signal` to fire; never completes without one
async fn signal_fired(signal: Option<&CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Terminal status for a fired signal: `Timeout` if it carries a deadline
fn fired_status(signal: Option<&CancelSignal>) -> Status {
    match signal.and_then(CancelSignal::deadline) {
        Some(_) => Status::Timeout,
        None => Status::Canceled,
    }
}

/// Settles the status of a run whose `start` future was dropped midway
///
/// Tasks already dispatched keep running; their reports are discarded.
struct RunGuard<'a> {
    wg: &'a AdvancedWaitGroup,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    const fn new(wg: &'a AdvancedWaitGroup) -> Self {
        Self { wg, finished: false }
    }

    fn finish(mut self, status: Status) {
        self.wg.write_outcome().status = status;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut outcome = self.wg.write_outcome();
        if outcome.status == Status::Running {
            outcome.status = Status::Canceled;
            warn!("start dropped before the batch finished, marked canceled");
        }
    }
}

/// Registered tasks and configuration
#[derive(Default)]
struct Batch {
    tasks: Vec<Task>,
    signal: Option<CancelSignal>,
    stop_on_error: bool,
}

/// Snapshot readable while a batch runs
#[derive(Default)]
struct Outcome {
    status: Status,
    errors: Vec<TaskError>,
}

/// Runs a batch of fallible tasks concurrently and records how it ended
///
/// See the [module documentation](self) for the full behaviour.
#[derive(Default)]
pub struct AdvancedWaitGroup {
    batch: Mutex<Batch>,
    outcome: RwLock<Outcome>,
}

impl AdvancedWaitGroup {
    /// Create an idle wait group with no tasks, no signal and stop-on-error off
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole batch by `timeout`, measured from this call
    ///
    /// The deadline is layered on top of the current signal (or a fresh one
    /// if none is set).
    pub async fn set_timeout(&self, timeout: Duration) -> &Self {
        let mut batch = self.batch.lock().await;
        let base = batch.signal.take().unwrap_or_default();
        batch.signal = Some(base.with_timeout(timeout));
        self
    }

    /// Replace the cancellation signal
    pub async fn set_context(&self, signal: CancelSignal) -> &Self {
        self.batch.lock().await.signal = Some(signal);
        self
    }

    /// Stop waiting as soon as any task fails
    pub async fn set_stop_on_error(&self, stop_on_error: bool) -> &Self {
        self.batch.lock().await.stop_on_error = stop_on_error;
        self
    }

    /// Register one async task
    pub async fn add<F, Fut, E>(&self, f: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.extend([Task::new(f)]).await
    }

    /// Register several tasks at once, keeping their order
    pub async fn extend<I>(&self, tasks: I) -> &Self
    where
        I: IntoIterator<Item = Task>,
    {
        self.batch.lock().await.tasks.extend(tasks);
        self
    }

    /// Number of registered tasks
    pub async fn task_count(&self) -> usize {
        self.batch.lock().await.tasks.len()
    }

    /// The current cancellation signal, if any
    pub async fn context(&self) -> Option<CancelSignal> {
        self.batch.lock().await.signal.clone()
    }

    /// Whether stop-on-error is set
    pub async fn stop_on_error(&self) -> bool {
        self.batch.lock().await.stop_on_error
    }

    /// Run every registered task and wait for a terminal status
    ///
    /// Must be called from within a tokio runtime. Task failures never
    /// surface here; read them with [`status`](Self::status),
    /// [`last_error`](Self::last_error) and [`all_errors`](Self::all_errors).
    pub async fn start(&self) -> &Self {
        let batch = self.batch.lock().await;
        {
            let mut outcome = self.write_outcome();
            outcome.status = Status::Running;
            outcome.errors.clear();
        }

        // Declared after `batch`, so an abandoned run is settled before the lock is released
        let run_guard = RunGuard::new(self);
        let status = self.run(&batch).await;
        run_guard.finish(status);
        debug!(%status, errors = self.read_outcome().errors.len(), "batch finished");
        self
    }

    async fn run(&self, batch: &Batch) -> Status {
        let total = batch.tasks.len();
        if total == 0 {
            return Status::Success;
        }

        let signal = batch.signal.as_ref();
        debug!(
            tasks = total,
            stop_on_error = batch.stop_on_error,
            deadline = signal.is_some_and(|s| s.deadline().is_some()),
            "starting batch"
        );

        // One slot per task: a late report never waits on a departed coordinator
        let (reports_tx, mut reports_rx) = mpsc::channel(total);
        let mut dispatched = 0;
        for task in &batch.tasks {
            if signal.is_some_and(CancelSignal::is_cancelled) {
                debug!(dispatched, total, "signal fired, dispatch stopped");
                return fired_status(signal);
            }
            task.dispatch(dispatched, reports_tx.clone());
            dispatched += 1;
        }
        drop(reports_tx);

        let mut pending = dispatched;
        while pending > 0 {
            tokio::select! {
                report = reports_rx.recv() => {
                    let Some((index, result)) = report else {
                        // Every task reports once, so this means a task was dropped unfinished
                        warn!(pending, "report queue closed with tasks outstanding");
                        return Status::Canceled;
                    };
                    pending -= 1;
                    if let Err(fault) = result {
                        debug!(task = index, panic = fault.is_panic(), "task failed");
                        self.write_outcome().errors.push(fault);
                        if batch.stop_on_error {
                            debug!(pending, "stopping on first error");
                            return Status::Error;
                        }
                    }
                }
                () = signal_fired(signal) => {
                    debug!(pending, "signal fired while waiting");
                    return fired_status(signal);
                }
            }
        }
        Status::Success
    }

    /// The most recently reported fault, if any
    #[must_use]
    pub fn last_error(&self) -> Option<TaskError> {
        self.read_outcome().errors.last().cloned()
    }

    /// Every fault of the current or most recent run, in completion order
    #[must_use]
    pub fn all_errors(&self) -> Vec<TaskError> {
        self.read_outcome().errors.clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        self.read_outcome().status
    }

    /// Drop all tasks, configuration, status and errors
    ///
    /// Waits for a running batch to finish first.
    pub async fn reset(&self) {
        let mut batch = self.batch.lock().await;
        *batch = Batch::default();
        *self.write_outcome() = Outcome::default();
    }

    fn read_outcome(&self) -> RwLockReadGuard<'_, Outcome> {
        self.outcome.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_outcome(&self) -> RwLockWriteGuard<'_, Outcome> {
        self.outcome.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AdvancedWaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.read_outcome();
        f.debug_struct("AdvancedWaitGroup")
            .field("status", &outcome.status)
            .field("errors", &outcome.errors.len())
            .finish_non_exhaustive()
    }
}

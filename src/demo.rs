//! Synthetic batch driven by the `syncx` binary
//!
//! Every task takes one permit from a shared [`Semaphore`], holds it for a
//! while and gives it back, so the semaphore bounds how many tasks of the
//! batch run at once. Failures and panics can be injected to exercise the
//! wait group's fault handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{BoxError, TaskError};
use crate::wait_group::{AdvancedWaitGroup, Status, Task};
use syncx_sync::{CancelSignal, Semaphore};

/// Shape of the synthetic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Number of tasks
    pub tasks: usize,
    /// Permits in the shared semaphore
    pub permits: usize,
    /// How long each task holds its permit
    pub task_duration: Duration,
    /// Every K-th task (1-based) fails; 0 disables
    pub fail_every: usize,
    /// Every K-th task (1-based) panics; 0 disables
    pub panic_every: usize,
    /// Deadline for the whole batch
    pub timeout: Option<Duration>,
    /// Stop on the first failure
    pub stop_on_error: bool,
}

/// How the batch ended
#[derive(Debug, Clone)]
pub struct DemoReport {
    /// Terminal status of the wait group
    pub status: Status,
    /// Faults in completion order
    pub errors: Vec<TaskError>,
    /// Tasks that finished without error before `start` returned
    pub completed: usize,
    /// Wall time spent in `start`
    pub elapsed: Duration,
}

/// Error returned by tasks selected with `fail_every`
#[derive(Debug, Error, PartialEq, Eq)]
#[error("task {index} failed on purpose")]
pub struct InjectedFailure {
    /// 1-based task number
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
struct TaskPlan {
    index: usize,
    hold: Duration,
    fails: bool,
    panics: bool,
}

impl TaskPlan {
    fn for_task(index: usize, config: &DemoConfig) -> Self {
        Self {
            index,
            hold: config.task_duration,
            fails: config.fail_every > 0 && index % config.fail_every == 0,
            panics: config.panic_every > 0 && index % config.panic_every == 0,
        }
    }
}

async fn demo_task(
    plan: TaskPlan,
    semaphore: &Semaphore,
    signal: &CancelSignal,
    completed: &AtomicUsize,
) -> Result<(), BoxError> {
    if plan.panics {
        panic!("task {} panicked on purpose", plan.index);
    }

    semaphore.acquire(signal).await?;
    debug!(task = plan.index, in_use = semaphore.in_use(), "permit held");
    tokio::time::sleep(plan.hold).await;
    semaphore.release().await;

    if plan.fails {
        return Err(InjectedFailure { index: plan.index }.into());
    }
    completed.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Build the batch described by `config`, run it and report the outcome
///
/// Must be called from within a multi-threaded tokio runtime.
///
/// # Errors
///
/// Returns an error if the semaphore cannot be created. Task faults are part
/// of the report, not errors.
pub async fn run_demo(config: &DemoConfig) -> Result<DemoReport> {
    let semaphore = Semaphore::new(config.permits).context("Invalid permit count")?;
    let signal = match config.timeout {
        Some(timeout) => CancelSignal::new().with_timeout(timeout),
        None => CancelSignal::new(),
    };
    let completed = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<Task> = (1..=config.tasks)
        .map(|index| {
            let plan = TaskPlan::for_task(index, config);
            let semaphore = semaphore.clone();
            let signal = signal.clone();
            let completed = Arc::clone(&completed);
            Task::new(move || {
                let semaphore = semaphore.clone();
                let signal = signal.clone();
                let completed = Arc::clone(&completed);
                async move { demo_task(plan, &semaphore, &signal, &completed).await }
            })
        })
        .collect();

    let wg = AdvancedWaitGroup::new();
    wg.set_context(signal)
        .await
        .set_stop_on_error(config.stop_on_error)
        .await
        .extend(tasks)
        .await;

    info!(
        tasks = config.tasks,
        permits = config.permits,
        "Running batch"
    );
    let started = Instant::now();
    wg.start().await;
    let elapsed = started.elapsed();

    Ok(DemoReport {
        status: wg.status(),
        errors: wg.all_errors(),
        completed: completed.load(Ordering::Relaxed),
        elapsed,
    })
}

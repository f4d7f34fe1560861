//! Command-line interface definitions

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::demo::DemoConfig;

/// Run a synthetic batch through the advanced wait group and a shared semaphore
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of tasks in the batch
    #[arg(long, default_value = "8")]
    pub tasks: usize,

    /// Semaphore permits shared by the tasks (maximum concurrency)
    #[arg(long, default_value = "2")]
    pub permits: usize,

    /// How long each task holds its permit, in milliseconds
    #[arg(long, default_value = "100")]
    pub task_ms: u64,

    /// Every K-th task returns an error (0 = never)
    #[arg(long, default_value = "0")]
    pub fail_every: usize,

    /// Every K-th task panics before acquiring a permit (0 = never)
    #[arg(long, default_value = "0")]
    pub panic_every: usize,

    /// Deadline for the whole batch, in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    pub timeout_ms: u64,

    /// Stop waiting as soon as one task fails
    #[arg(long)]
    pub stop_on_error: bool,

    /// Number of runtime worker threads (0 = auto-detect)
    #[arg(long, default_value = "0")]
    pub worker_threads: usize,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if a count is out of range or options conflict
    pub fn validate(&self) -> Result<()> {
        if self.tasks > 100_000 {
            anyhow::bail!("Task count must be at most 100000, got: {}", self.tasks);
        }

        if self.permits < 1 || self.permits > 10_000 {
            anyhow::bail!(
                "Permits must be between 1 and 10000, got: {}",
                self.permits
            );
        }

        if self.effective_worker_threads() == 0 {
            anyhow::bail!("No CPU cores available");
        }

        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Get the actual worker thread count to use
    #[must_use]
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// Batch settings derived from the arguments
    #[must_use]
    pub fn demo_config(&self) -> DemoConfig {
        DemoConfig {
            tasks: self.tasks,
            permits: self.permits,
            task_duration: Duration::from_millis(self.task_ms),
            fail_every: self.fail_every,
            panic_every: self.panic_every,
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
            stop_on_error: self.stop_on_error,
        }
    }
}

//! syncx: run a synthetic batch through the advanced wait group
//!
//! The tasks share a counting semaphore, so the batch doubles as a
//! demonstration of both primitives under failures, panics and deadlines.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use syncx::cli::Args;
use syncx::demo::run_demo;
use syncx::Status;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    args.validate().context("Invalid arguments")?;

    info!("Starting syncx v{}", env!("CARGO_PKG_VERSION"));
    info!("Worker threads: {}", args.effective_worker_threads());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.effective_worker_threads())
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let report = runtime.block_on(run_demo(&args.demo_config()))?;

    if !args.quiet {
        println!("Status: {}", report.status);
        println!("Completed: {}/{}", report.completed, args.tasks);
        println!("Errors: {}", report.errors.len());
        println!("Elapsed: {:?}", report.elapsed);
    }
    for (i, err) in report.errors.iter().enumerate() {
        eprintln!("Error {}: {}", i + 1, err);
    }

    // Tasks still running after an early exit are dropped with the runtime
    runtime.shutdown_background();

    if report.status != Status::Success {
        anyhow::bail!("Batch ended with status {}", report.status);
    }
    Ok(())
}

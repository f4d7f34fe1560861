#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct TestTimeoutGuard {
    cancelled: Arc<AtomicBool>,
}

impl Drop for TestTimeoutGuard {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Abort the test process if the guard is still alive after `duration`
///
/// A hung `release()` or `start()` would otherwise stall the suite forever.
pub fn test_timeout_guard(duration: Duration) -> TestTimeoutGuard {
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = Arc::clone(&cancelled);
    std::thread::spawn(move || {
        std::thread::sleep(duration);
        if !cancelled_clone.load(Ordering::SeqCst) {
            eprintln!("Test timeout exceeded ({}s). Aborting.", duration.as_secs());
            std::process::abort();
        }
    });
    TestTimeoutGuard { cancelled }
}

/// Route `tracing` output through the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Counts task bodies that have started but not yet finished
#[derive(Clone, Default)]
pub struct LiveTasks {
    count: Arc<AtomicUsize>,
}

/// Held by a running task body; decrements the count on drop
pub struct LiveTaskToken {
    count: Arc<AtomicUsize>,
}

impl LiveTasks {
    pub fn enter(&self) -> LiveTaskToken {
        self.count.fetch_add(1, Ordering::SeqCst);
        LiveTaskToken {
            count: Arc::clone(&self.count),
        }
    }

    pub fn live(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Drop for LiveTaskToken {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

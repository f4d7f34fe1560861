//! Integration tests for the cancellable semaphore
//!
//! Timing-sensitive tests run on a paused clock, so "2 seconds" is measured
//! in virtual time and the suite stays fast.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use syncx::{CancelSignal, Semaphore, SemaphoreError};
use tokio::time::Instant;

use common::test_timeout_guard;

#[rstest]
#[case(1)]
#[case(4)]
#[case(10)]
#[case(1024)]
fn test_fresh_semaphore_reports_capacity(#[case] capacity: usize) {
    let sem = Semaphore::new(capacity).expect("valid capacity");
    assert_eq!(sem.available_permits(), capacity);
    assert_eq!(sem.max_permits(), capacity);
    assert_eq!(sem.in_use(), 0);
}

#[test]
fn test_zero_capacity_fails_construction() {
    let err = Semaphore::new(0).expect_err("zero permits must be rejected");
    assert!(matches!(err, SemaphoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_blocked_acquire_unblocks_on_release() {
    let _guard = test_timeout_guard(Duration::from_secs(10));
    let sem = Semaphore::new(1).unwrap();
    let signal = CancelSignal::new();
    sem.acquire(&signal).await.unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let handle = {
        let sem = sem.clone();
        let signal = signal.clone();
        let acquired = Arc::clone(&acquired);
        tokio::spawn(async move {
            sem.acquire(&signal).await.unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    tokio::task::yield_now().await;
    assert!(!acquired.load(Ordering::SeqCst));

    sem.release().await;
    handle.await.unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(sem.available_permits(), 0);
}

#[tokio::test]
async fn test_acquire_many_release_many_and_drain() {
    let _guard = test_timeout_guard(Duration::from_secs(10));
    let sem = Semaphore::new(4).unwrap();
    let signal = CancelSignal::new();

    assert_eq!(sem.acquire_many(&signal, 2).await, Ok(2));
    assert_eq!(sem.available_permits(), 2);

    sem.release_many(2).await.unwrap();
    assert_eq!(sem.available_permits(), 4);

    assert_eq!(sem.drain_permits(&signal).await, Ok(4));
    assert_eq!(sem.available_permits(), 0);

    // A waiter proceeds once the drained permits come back
    let waiter = {
        let sem = sem.clone();
        let signal = signal.clone();
        tokio::spawn(async move {
            sem.acquire(&signal).await.unwrap();
            sem.release().await;
        })
    };
    sem.release_many(4).await.unwrap();
    waiter.await.unwrap();
    assert_eq!(sem.available_permits(), 4);
}

#[tokio::test]
async fn test_bulk_argument_checks() {
    let sem = Semaphore::new(4).unwrap();
    let signal = CancelSignal::new();

    assert_eq!(
        sem.acquire_many(&signal, 10).await,
        Err(SemaphoreError::CapacityExceeded {
            requested: 10,
            capacity: 4
        })
    );
    assert_eq!(sem.available_permits(), 4);

    assert!(matches!(
        sem.release_many(10).await,
        Err(SemaphoreError::InvalidArgument(_))
    ));
    assert_eq!(sem.available_permits(), 4);

    assert_eq!(sem.acquire_many(&signal, 0).await, Ok(0));
    assert_eq!(sem.available_permits(), 4);
}

#[tokio::test]
async fn test_drain_of_empty_semaphore_acquires_nothing() {
    let sem = Semaphore::new(3).unwrap();
    let signal = CancelSignal::new();

    assert_eq!(sem.drain_permits(&signal).await, Ok(3));
    assert_eq!(sem.drain_permits(&signal).await, Ok(0));
    assert_eq!(sem.available_permits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_canceled_by_deadline() {
    let deadline = Duration::from_secs(2);
    let sem = Semaphore::new(4).unwrap();
    let signal = CancelSignal::new().with_timeout(deadline);

    sem.drain_permits(&signal).await.unwrap();
    assert_eq!(sem.available_permits(), 0);

    let start = Instant::now();
    let err = sem.acquire(&signal).await.unwrap_err();
    assert_eq!(err, SemaphoreError::AcquireCanceled { acquired: 0 });
    assert_eq!(start.elapsed().as_secs(), deadline.as_secs());

    sem.release_many(4).await.unwrap();
    assert_eq!(sem.available_permits(), 4);

    let signal = CancelSignal::new().with_timeout(deadline);
    assert_eq!(sem.acquire_many(&signal, 4).await, Ok(4));
    assert_eq!(sem.available_permits(), 0);

    let start = Instant::now();
    let signal = CancelSignal::new().with_timeout(deadline);
    let err = sem.acquire_many(&signal, 4).await.unwrap_err();
    assert_eq!(err, SemaphoreError::AcquireCanceled { acquired: 0 });
    assert_eq!(start.elapsed().as_secs(), deadline.as_secs());
}

#[tokio::test]
async fn test_explicit_cancel_unblocks_waiter() {
    let _guard = test_timeout_guard(Duration::from_secs(10));
    let sem = Semaphore::new(1).unwrap();
    assert!(sem.try_acquire());

    let signal = CancelSignal::new();
    let waiter = {
        let sem = sem.clone();
        let signal = signal.clone();
        tokio::spawn(async move { sem.acquire(&signal).await })
    };

    tokio::task::yield_now().await;
    signal.cancel();

    assert_eq!(
        waiter.await.unwrap(),
        Err(SemaphoreError::AcquireCanceled { acquired: 0 })
    );
    assert_eq!(sem.in_use(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_with_nothing_held_hangs() {
    let sem = Semaphore::new(2).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(30), sem.release_many(1)).await;

    assert!(result.is_err(), "over-release should still be waiting");
    assert_eq!(sem.available_permits(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_permits_are_never_lost_or_duplicated() {
    const CAPACITY: usize = 3;
    let _guard = test_timeout_guard(Duration::from_secs(30));
    let sem = Semaphore::new(CAPACITY).unwrap();
    let signal = CancelSignal::new();
    let holders = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let sem = sem.clone();
        let signal = signal.clone();
        let holders = Arc::clone(&holders);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            for _ in 0..20 {
                sem.acquire(&signal).await.unwrap();
                let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(sem.available_permits() <= CAPACITY);
                tokio::task::yield_now().await;
                holders.fetch_sub(1, Ordering::SeqCst);
                sem.release().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(sem.available_permits(), CAPACITY);
    assert_eq!(sem.in_use(), 0);
}

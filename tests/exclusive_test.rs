/*!
 * Exclusive Protocol Integration Tests
 *
 * Mutual exclusion, contention handoff, timed and interruptible acquires
 */

mod common;

use common::MutexPolicy;
use pretty_assertions::assert_eq;
use qsync::{Parker, QueuedSync, SyncConfig, SyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_race_for_state_exactly_one_wins() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let sync_clone = sync.clone();
            let wins_clone = wins.clone();
            thread::spawn(move || {
                // Both race the 0 -> 1 transition; the loser queues and
                // acquires only after the winner releases
                sync_clone.acquire(1).unwrap();
                wins_clone.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                sync_clone.release(1).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(wins.load(Ordering::SeqCst), 2);
    assert_eq!(sync.state().get(), 0);
    assert!(!sync.has_queued_threads());
}

#[test]
fn test_mutual_exclusion_under_contention() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sync_clone = sync.clone();
            let inside_clone = inside.clone();
            let max_clone = max_inside.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    sync_clone.acquire(1).unwrap();
                    let now = inside_clone.fetch_add(1, Ordering::SeqCst) + 1;
                    max_clone.fetch_max(now, Ordering::SeqCst);
                    inside_clone.fetch_sub(1, Ordering::SeqCst);
                    sync_clone.release(1).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    // At most one thread ever observed itself inside the critical section
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(sync.state().get(), 0);
}

#[test]
fn test_timed_acquire_returns_within_tolerance() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    sync.acquire(1).unwrap();

    let sync_clone = sync.clone();
    let handle = thread::spawn(move || {
        let start = Instant::now();
        let acquired = sync_clone
            .try_acquire_for(1, Duration::from_millis(50))
            .unwrap();
        (acquired, start.elapsed())
    });

    let (acquired, elapsed) = handle.join().unwrap();
    assert!(!acquired);
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250)); // generous scheduling slack

    // The queue holds no trace of the timed-out waiter
    assert_eq!(sync.queue_len(), 0);
    assert!(sync.queued_threads().is_empty());
    sync.release(1).unwrap();
}

#[test]
fn test_timed_acquire_succeeds_when_released_in_time() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    sync.acquire(1).unwrap();

    let sync_clone = sync.clone();
    let handle = thread::spawn(move || {
        let acquired = sync_clone
            .try_acquire_for(1, Duration::from_secs(2))
            .unwrap();
        if acquired {
            sync_clone.release(1).unwrap();
        }
        acquired
    });

    thread::sleep(Duration::from_millis(50));
    sync.release(1).unwrap();
    assert!(handle.join().unwrap());
}

#[test]
fn test_interrupted_waiter_leaves_queue() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    sync.acquire(1).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let sync_clone = sync.clone();
    let handle = thread::spawn(move || {
        tx.send(Parker::current()).unwrap();
        sync_clone.acquire_interruptibly(1)
    });

    let parker = rx.recv().unwrap();
    // Let the waiter park before interrupting it
    thread::sleep(Duration::from_millis(50));
    assert!(sync.is_queued(parker.thread().id()));

    parker.interrupt();
    assert_eq!(handle.join().unwrap(), Err(SyncError::Interrupted));

    assert!(!sync.is_queued(parker.thread().id()));
    assert!(sync.queued_threads().is_empty());
    sync.release(1).unwrap();
}

#[test]
fn test_uninterruptible_acquire_reasserts_interrupt() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    sync.acquire(1).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let sync_clone = sync.clone();
    let handle = thread::spawn(move || {
        let parker = Parker::current();
        tx.send(parker.clone()).unwrap();
        sync_clone.acquire(1).unwrap();
        // The interrupt did not abort the acquire; it is pending again
        let pending = parker.take_interrupted();
        sync_clone.release(1).unwrap();
        pending
    });

    let parker = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    parker.interrupt();
    // Interrupt alone must not grant the lock; release does
    thread::sleep(Duration::from_millis(50));
    sync.release(1).unwrap();

    assert!(handle.join().unwrap());
}

#[test]
fn test_fair_mode_orders_arrivals() {
    let sync = Arc::new(QueuedSync::with_config(
        MutexPolicy::new(),
        0,
        SyncConfig::fair(),
    ));
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    sync.acquire(1).unwrap();

    let mut handles = Vec::new();
    for id in 0..4 {
        let sync_clone = sync.clone();
        let order_clone = order.clone();
        handles.push(thread::spawn(move || {
            sync_clone.acquire(1).unwrap();
            order_clone.lock().push(id);
            sync_clone.release(1).unwrap();
        }));
        // Stagger arrivals so queue order is deterministic
        thread::sleep(Duration::from_millis(30));
    }

    sync.release(1).unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_introspection_sees_queued_waiters() {
    let sync = Arc::new(QueuedSync::new(MutexPolicy::new(), 0));
    sync.acquire(1).unwrap();
    assert!(!sync.has_contended());

    let sync_clone = sync.clone();
    let handle = thread::spawn(move || {
        sync_clone.acquire(1).unwrap();
        sync_clone.release(1).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert!(sync.has_contended());
    assert!(sync.has_queued_threads());
    assert_eq!(sync.queue_len(), 1);
    assert_eq!(sync.exclusive_queued_threads().len(), 1);
    assert!(sync.shared_queued_threads().is_empty());
    assert!(sync.first_queued_thread().is_some());
    assert!(sync.has_queued_predecessors());

    sync.release(1).unwrap();
    handle.join().unwrap();
    assert!(!sync.has_queued_threads());
}

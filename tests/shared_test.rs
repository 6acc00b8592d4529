/*!
 * Shared Protocol Integration Tests
 *
 * Permit counting, wake-up propagation, and state accounting properties
 */

mod common;

use common::{LatchPolicy, SemaphorePolicy};
use proptest::prelude::*;
use qsync::QueuedSync;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_ten_holders_do_not_block_eleventh_does() {
    let sync = Arc::new(QueuedSync::new(SemaphorePolicy, 10));
    let holding = Arc::new(AtomicUsize::new(0));

    // Ten concurrent holders all get through without blocking
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let sync_clone = sync.clone();
            let holding_clone = holding.clone();
            thread::spawn(move || {
                sync_clone.acquire_shared(1).unwrap();
                holding_clone.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(holding.load(Ordering::SeqCst), 10);
    assert_eq!(sync.state().get(), 0);

    // The eleventh blocks until one permit comes back
    let sync_clone = sync.clone();
    let eleventh = thread::spawn(move || {
        sync_clone.acquire_shared(1).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert!(sync.has_queued_threads());
    assert_eq!(sync.shared_queued_threads().len(), 1);

    sync.release_shared(1).unwrap();
    eleventh.join().unwrap();
    assert!(!sync.has_queued_threads());

    // Drain
    for _ in 0..10 {
        sync.release_shared(1).unwrap();
    }
    assert_eq!(sync.state().get(), 10);
}

#[test]
fn test_latch_release_propagates_to_all_waiters() {
    let sync = Arc::new(QueuedSync::new(LatchPolicy, 1));
    let released = Arc::new(AtomicUsize::new(0));

    // No lost wake-ups: one countdown must cascade through every parked
    // waiter without each needing its own release
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sync_clone = sync.clone();
            let released_clone = released.clone();
            thread::spawn(move || {
                sync_clone.acquire_shared(1).unwrap();
                released_clone.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    // Let all eight park behind the closed gate
    thread::sleep(Duration::from_millis(100));
    assert_eq!(released.load(Ordering::SeqCst), 0);

    sync.release_shared(1).unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(released.load(Ordering::SeqCst), 8);
}

#[test]
fn test_latch_passthrough_once_open() {
    let sync = Arc::new(QueuedSync::new(LatchPolicy, 1));
    sync.release_shared(1).unwrap();

    // An open latch never blocks
    sync.acquire_shared(1).unwrap();
    sync.acquire_shared(1).unwrap();
    assert!(!sync.has_queued_threads());
}

#[test]
fn test_semaphore_timed_acquire_times_out_without_permits() {
    let sync = QueuedSync::new(SemaphorePolicy, 0);
    let acquired = sync
        .try_acquire_shared_for(1, Duration::from_millis(50))
        .unwrap();
    assert!(!acquired);
    assert_eq!(sync.queue_len(), 0);
}

#[test]
fn test_interleaved_acquire_release_stress() {
    let sync = Arc::new(QueuedSync::new(SemaphorePolicy, 4));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sync_clone = sync.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    sync_clone.acquire_shared(1).unwrap();
                    std::hint::spin_loop();
                    sync_clone.release_shared(1).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    // Every permit came home
    assert_eq!(sync.state().get(), 4);
    assert!(!sync.has_queued_threads());
}

proptest! {
    /// Permits are conserved across arbitrary single-threaded schedules
    #[test]
    fn prop_semaphore_accounting(ops in prop::collection::vec(any::<bool>(), 1..64)) {
        let sync = QueuedSync::new(SemaphorePolicy, 4);
        let mut held = 0usize;
        for acquire in ops {
            if acquire {
                if sync.try_acquire_shared_for(1, Duration::ZERO).unwrap() {
                    held += 1;
                }
            } else if held > 0 {
                sync.release_shared(1).unwrap();
                held -= 1;
            }
            prop_assert!(held <= 4);
            prop_assert_eq!(sync.state().get() + held, 4);
        }
    }
}

//! Property and concurrency tests for the blocking primitives.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test sync_properties -- --nocapture
//! ```

mod common;

use common::*;
use proptest::prelude::*;
use rightsize::sync::{Barrier, CountingSemaphore, ExclusiveLock, FairRwLock};
use rightsize::Cx;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// Semaphore
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(64))]

    /// After k successful takes and m releases, p0 - k + m permits remain.
    #[test]
    fn semaphore_count_is_conserved(initial in 0u32..16, ops in prop::collection::vec(any::<bool>(), 0..64)) {
        init_test_logging();
        let sem = CountingSemaphore::with_permits(initial);
        let cx = Cx::for_testing();
        let mut taken = 0i64;
        let mut released = 0i64;
        for take in ops {
            if take {
                if sem.try_acquire_for(&cx, Duration::ZERO) {
                    taken += 1;
                }
            } else {
                sem.release();
                released += 1;
            }
            prop_assert!(sem.available_permits() >= 0);
        }
        prop_assert_eq!(sem.available_permits(), i64::from(initial) - taken + released);
    }

    /// N acquisitions by one owner need exactly N releases.
    #[test]
    fn reentrant_lock_needs_matching_releases(depth in 1u32..24) {
        init_test_logging();
        let lock = ExclusiveLock::new();
        let owner = Cx::for_testing();
        let other = Cx::for_testing();
        for _ in 0..depth {
            lock.acquire(&owner).expect("acquire");
        }
        prop_assert_eq!(lock.depth(), depth);
        for remaining in (0..depth).rev() {
            prop_assert!(!lock.try_acquire(&other));
            lock.release(&owner).expect("release");
            prop_assert_eq!(lock.depth(), remaining);
        }
        prop_assert!(lock.owner().is_none());
        prop_assert!(lock.try_acquire(&other));
        prop_assert!(lock.release(&owner).is_err());
    }
}

#[test]
fn semaphore_permits_bound_concurrency() {
    init_test_logging();
    test_phase("semaphore_permits_bound_concurrency");
    let sem = Arc::new(CountingSemaphore::with_permits(3));
    let inside = Arc::new(AtomicI64::new(0));
    let peak = Arc::new(AtomicI64::new(0));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let sem = Arc::clone(&sem);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                let cx = Cx::new();
                for _ in 0..20 {
                    sem.acquire(&cx).expect("acquire");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sem.release();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("worker thread");
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(sem.available_permits(), 3);
    test_complete("semaphore_permits_bound_concurrency");
}

#[test]
fn cancelled_semaphore_wait_is_interrupted() {
    init_test_logging();
    test_phase("cancelled_semaphore_wait_is_interrupted");
    let sem = Arc::new(CountingSemaphore::with_permits(0));
    let cx = Cx::new();
    let cancel = cx.cancel_handle();

    let waiter = {
        let sem = Arc::clone(&sem);
        thread::spawn(move || sem.acquire(&cx))
    };
    thread::sleep(Duration::from_millis(30));
    cancel.cancel();

    let err = waiter.join().expect("waiter").expect_err("cancelled");
    assert!(err.is_interrupted());
    assert_eq!(sem.available_permits(), 0);
    test_complete("cancelled_semaphore_wait_is_interrupted");
}

// ============================================================================
// Exclusive lock
// ============================================================================

#[test]
fn exclusive_lock_serializes_owners() {
    init_test_logging();
    test_phase("exclusive_lock_serializes_owners");
    let lock = Arc::new(ExclusiveLock::new());
    let holders = Arc::new(AtomicUsize::new(0));
    let violated = Arc::new(AtomicBool::new(false));

    let threads: Vec<_> = (0..6)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let holders = Arc::clone(&holders);
            let violated = Arc::clone(&violated);
            thread::spawn(move || {
                let cx = Cx::new();
                for _ in 0..25 {
                    let _outer = lock.lock(&cx).expect("outer");
                    let _inner = lock.lock(&cx).expect("reentrant");
                    if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                        violated.store(true, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    holders.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("worker thread");
    }

    assert!(!violated.load(Ordering::SeqCst));
    assert!(lock.owner().is_none());
    test_complete("exclusive_lock_serializes_owners");
}

// ============================================================================
// Fair read/write lock
// ============================================================================

#[test]
fn rwlock_writers_exclude_readers() {
    init_test_logging();
    test_phase("rwlock_writers_exclude_readers");
    let lock = Arc::new(FairRwLock::new());
    let readers = Arc::new(AtomicI64::new(0));
    let writers = Arc::new(AtomicI64::new(0));
    let violated = Arc::new(AtomicBool::new(false));

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let lock = Arc::clone(&lock);
            let readers = Arc::clone(&readers);
            let writers = Arc::clone(&writers);
            let violated = Arc::clone(&violated);
            thread::spawn(move || {
                let cx = Cx::new();
                for _ in 0..25 {
                    if i % 3 == 0 {
                        lock.lock_write(&cx).expect("write");
                        let w = writers.fetch_add(1, Ordering::SeqCst) + 1;
                        if w != 1 || readers.load(Ordering::SeqCst) != 0 {
                            violated.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        writers.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        lock.lock_read(&cx).expect("read");
                        readers.fetch_add(1, Ordering::SeqCst);
                        if writers.load(Ordering::SeqCst) != 0 {
                            violated.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        readers.fetch_sub(1, Ordering::SeqCst);
                    }
                    lock.unlock(&cx).expect("unlock");
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("worker thread");
    }

    assert!(!violated.load(Ordering::SeqCst));
    assert_eq!(lock.queue_len(), 0);
    test_complete("rwlock_writers_exclude_readers");
}

#[test]
fn rwlock_reader_queues_behind_pending_writer() {
    init_test_logging();
    test_phase("rwlock_reader_queues_behind_pending_writer");
    let lock = Arc::new(FairRwLock::new());
    let first_reader = Cx::new();
    lock.lock_read(&first_reader).expect("read");

    let writer_done = Arc::new(AtomicBool::new(false));
    let writer = {
        let lock = Arc::clone(&lock);
        let writer_done = Arc::clone(&writer_done);
        thread::spawn(move || {
            let cx = Cx::new();
            lock.lock_write(&cx).expect("write");
            writer_done.store(true, Ordering::SeqCst);
            lock.unlock(&cx).expect("unlock");
        })
    };
    assert!(wait_until(Duration::from_secs(2), || lock.queue_len() == 2));

    // A late reader may not overtake the queued writer.
    let late = Cx::new();
    assert!(!lock.try_lock_read(&late).expect("try read"));
    assert!(!writer_done.load(Ordering::SeqCst));

    lock.unlock(&first_reader).expect("unlock");
    writer.join().expect("writer thread");
    assert!(writer_done.load(Ordering::SeqCst));
    assert!(lock.try_lock_read(&late).expect("try read"));
    lock.unlock(&late).expect("unlock");
    test_complete("rwlock_reader_queues_behind_pending_writer");
}

// ============================================================================
// Barrier
// ============================================================================

#[test]
fn barrier_releases_all_waiters_with_one_leader() {
    init_test_logging();
    test_phase("barrier_releases_all_waiters_with_one_leader");
    let barrier = Arc::new(Barrier::new(5).expect("barrier"));
    let leaders = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..5)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let leaders = Arc::clone(&leaders);
            thread::spawn(move || {
                let cx = Cx::new();
                if barrier.arrive(&cx).expect("arrive").is_leader() {
                    leaders.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("arriving thread");
    }

    assert_eq!(leaders.load(Ordering::SeqCst), 1);
    assert!(barrier.is_tripped());

    // Arriving after the trip returns at once.
    let late = barrier.arrive(&Cx::new()).expect("late arrival");
    assert!(!late.is_leader());
    test_complete("barrier_releases_all_waiters_with_one_leader");
}

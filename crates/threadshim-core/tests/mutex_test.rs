#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use threadshim_core::{Mutex, SyncError, errno};

#[test]
fn reentrant_lock_needs_matching_unlocks() {
    let mutex = Arc::new(Mutex::new().unwrap());
    mutex.lock().unwrap();
    mutex.lock().unwrap();
    mutex.lock().unwrap();

    let check_busy = |expect_busy: bool| {
        let m = Arc::clone(&mutex);
        std::thread::spawn(move || {
            let result = m.try_lock();
            if expect_busy {
                assert!(result.unwrap_err().is_busy());
            } else {
                result.unwrap();
                // SAFETY: acquired just above on this thread.
                unsafe { m.unlock().unwrap() };
            }
        })
        .join()
        .unwrap();
    };

    check_busy(true);
    // SAFETY: this thread holds three locks.
    unsafe { mutex.unlock().unwrap() };
    check_busy(true);
    unsafe { mutex.unlock().unwrap() };
    check_busy(true);
    unsafe { mutex.unlock().unwrap() };
    check_busy(false);

    Arc::try_unwrap(mutex).unwrap().destroy().unwrap();
}

#[test]
fn trylock_on_held_mutex_does_not_block() {
    let mutex = Arc::new(Mutex::new().unwrap());
    let held = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let holder = {
        let (m, held, release) = (Arc::clone(&mutex), Arc::clone(&held), Arc::clone(&release));
        std::thread::spawn(move || {
            let guard = m.lock_guard().unwrap();
            held.wait();
            release.wait();
            drop(guard);
        })
    };

    held.wait();
    let start = Instant::now();
    let err = mutex.try_lock().unwrap_err();
    let elapsed = start.elapsed();
    assert!(matches!(err, SyncError::Busy { .. }));
    assert_eq!(err.status(), errno::EBUSY);
    assert!(elapsed < Duration::from_millis(10), "trylock took {elapsed:?}");

    release.wait();
    holder.join().unwrap();
    mutex.try_lock().unwrap();
    unsafe { mutex.unlock().unwrap() };
}

#[test]
fn lock_blocks_until_owner_releases() {
    let mutex = Arc::new(Mutex::new().unwrap());
    let entered = Arc::new(AtomicBool::new(false));

    mutex.lock().unwrap();
    let waiter = {
        let (m, entered) = (Arc::clone(&mutex), Arc::clone(&entered));
        std::thread::spawn(move || {
            let _guard = m.lock_guard().unwrap();
            entered.store(true, Ordering::Release);
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    assert!(
        !entered.load(Ordering::Acquire),
        "waiter acquired mutex while owner still held it"
    );
    unsafe { mutex.unlock().unwrap() };
    waiter.join().unwrap();
    assert!(entered.load(Ordering::Acquire));
}

#[test]
fn unlock_by_non_owner_is_refused() {
    let mutex = Arc::new(Mutex::new().unwrap());
    mutex.lock().unwrap();
    let m = Arc::clone(&mutex);
    std::thread::spawn(move || {
        // SAFETY: deliberately unpaired to exercise the ownership check.
        let err = unsafe { m.unlock() }.unwrap_err();
        assert_eq!(err.status(), errno::EPERM);
    })
    .join()
    .unwrap();
    unsafe { mutex.unlock().unwrap() };
}

#[test]
fn guards_serialize_a_shared_counter() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let mutex = Arc::new(Mutex::new().unwrap());
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let (m, c) = (Arc::clone(&mutex), Arc::clone(&counter));
            std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let _g = m.lock_guard().unwrap();
                    // Non-atomic read-modify-write under the lock.
                    let v = c.load(Ordering::Relaxed);
                    c.store(v + 1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), THREADS * ROUNDS);
}

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;

use threadshim_core::{RefCount, decrement, increment};

#[test]
fn n_threads_observe_distinct_values() {
    const THREADS: i32 = 32;

    let counter = Arc::new(AtomicI32::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let c = Arc::clone(&counter);
            std::thread::spawn(move || increment(&c))
        })
        .collect();
    let seen: HashSet<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(seen.len(), THREADS as usize);
    assert_eq!(seen, (1..=THREADS).collect());
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), THREADS);
}

#[test]
fn exactly_one_release_is_last() {
    const THREADS: i32 = 16;

    let rc = Arc::new(RefCount::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let rc = Arc::clone(&rc);
            std::thread::spawn(move || rc.release())
        })
        .collect();
    let last = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&was_last| was_last)
        .count();
    assert_eq!(last, 1);
    assert_eq!(rc.get(), 0);
}

#[test]
fn decrement_from_one_reaches_zero() {
    let v = AtomicI32::new(1);
    assert_eq!(decrement(&v), 0);
}

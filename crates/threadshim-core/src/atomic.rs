//! Atomic reference counting on a shared 32-bit integer.
//!
//! Both operations are lock-free, sequentially consistent, wrap on overflow
//! and return the value *after* the update, so a [`decrement`] returning `0`
//! means the last reference was released.

use std::sync::atomic::{AtomicI32, Ordering};

/// Adds one and returns the new value.
#[inline]
pub fn increment(value: &AtomicI32) -> i32 {
    value.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
}

/// Subtracts one and returns the new value.
#[inline]
pub fn decrement(value: &AtomicI32) -> i32 {
    value.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
}

/// Owned reference counter built on [`increment`] and [`decrement`].
#[derive(Debug, Default)]
pub struct RefCount {
    count: AtomicI32,
}

impl RefCount {
    #[must_use]
    pub const fn new(initial: i32) -> Self {
        Self {
            count: AtomicI32::new(initial),
        }
    }

    /// Takes a reference; returns the new count.
    pub fn acquire(&self) -> i32 {
        increment(&self.count)
    }

    /// Drops a reference; true when it was the last one.
    #[must_use]
    pub fn release(&self) -> bool {
        decrement(&self.count) == 0
    }

    #[must_use]
    pub fn get(&self) -> i32 {
        self.count.load(Ordering::SeqCst)
    }

    /// The underlying integer, for callers that share it through the C ABI.
    #[must_use]
    pub fn as_atomic(&self) -> &AtomicI32 {
        &self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_new_value() {
        let v = AtomicI32::new(0);
        assert_eq!(increment(&v), 1);
        assert_eq!(increment(&v), 2);
        assert_eq!(decrement(&v), 1);
        assert_eq!(decrement(&v), 0);
        assert_eq!(decrement(&v), -1);
    }

    #[test]
    fn wraps_on_overflow() {
        let v = AtomicI32::new(i32::MAX);
        assert_eq!(increment(&v), i32::MIN);
        assert_eq!(decrement(&v), i32::MAX);
    }

    #[test]
    fn refcount_reports_last_release() {
        let rc = RefCount::new(1);
        assert_eq!(rc.acquire(), 2);
        assert!(!rc.release());
        assert!(rc.release());
        assert_eq!(rc.get(), 0);
    }
}

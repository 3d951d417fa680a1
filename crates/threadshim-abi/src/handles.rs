//! Opaque handle types. Each primitive kind has its own type so a C compiler
//! rejects passing one where another is expected.

use std::marker::{PhantomData, PhantomPinned};

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            _private: [u8; 0],
            _marker: PhantomData<(*mut u8, PhantomPinned)>,
        }
    };
}

opaque_handle!(
    /// Recursive mutex created by `threadshim_mutex_init`.
    ThreadshimMutex
);
opaque_handle!(
    /// Reader/writer lock created by `threadshim_rwlock_init`.
    ThreadshimRwLock
);
opaque_handle!(
    /// Lock file returned by `threadshim_lock_fd`.
    ThreadshimFileLock
);

/// Thread-local storage slot created by `threadshim_tls_create`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadshimTls {
    pub key: u64,
}

/// `struct timeval` with 64-bit fields.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadshimTimeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

/// `struct timezone`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadshimTimezone {
    pub tz_minuteswest: i32,
    pub tz_dsttime: i32,
}

/// Leading fields of `struct tm`, in C order.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadshimTm {
    pub tm_sec: i32,
    pub tm_min: i32,
    pub tm_hour: i32,
    pub tm_mday: i32,
    pub tm_mon: i32,
    pub tm_year: i32,
    pub tm_wday: i32,
    pub tm_yday: i32,
    pub tm_isdst: i32,
}

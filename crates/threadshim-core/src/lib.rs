//! # threadshim-core
//!
//! Uniform concurrency primitives for the logging engine: recursive mutexes,
//! read/write locks, thread-local storage slots, atomic reference counting,
//! thread/process identity and create-exclusive lock files.
//!
//! Every primitive is a thin owner of one native object. The native backend is
//! chosen at build time:
//!
//! ```text
//! unix      -> pthreads
//! windows   -> Win32 (CRITICAL_SECTION, SRWLOCK, FLS)
//! portable  -> parking_lot (feature `portable`, or any other target)
//! ```
//!
//! The [`compat`] module carries the small POSIX shims (`gettimeofday`,
//! `localtime_r`, `fsync`, `gethostname`) the logging engine expects on every
//! platform.

#![deny(unsafe_code)]

pub mod atomic;
#[allow(unsafe_code)]
pub mod compat;
pub mod config;
pub mod diag;
pub mod errno;
pub mod error;
#[allow(unsafe_code)]
pub mod file_lock;
pub mod identity;
#[allow(unsafe_code)]
pub mod mutex;
#[allow(unsafe_code)]
pub mod rwlock;
#[allow(unsafe_code)]
mod sys;
#[allow(unsafe_code)]
pub mod tls;

pub use atomic::{RefCount, decrement, increment};
pub use config::DiagLevel;
pub use error::{Result, SyncError};
pub use file_lock::FileLock;
pub use identity::{ProcessId, ThreadId, process_self, thread_self};
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use sys::TlsDestructor;
pub use tls::TlsSlot;

/// Name of the native backend compiled into this build (`pthread`, `win32`
/// or `portable`).
#[must_use]
pub const fn backend_name() -> &'static str {
    sys::BACKEND_NAME
}

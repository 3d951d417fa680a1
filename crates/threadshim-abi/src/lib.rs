// Every export takes raw pointers from C callers; the contract is documented
// once per module rather than per function.
#![allow(clippy::missing_safety_doc)]
//! # threadshim-abi
//!
//! C ABI over `threadshim-core`.
//!
//! ```text
//! C caller -> threadshim_* export (this crate) -> threadshim-core handle -> native backend
//! ```
//!
//! Status convention for every `int`-returning export: `0` on success, a
//! positive native error code on failure, `EBUSY` for trylock contention and
//! `-1` for allocation failure. Null handles are rejected with `EINVAL`
//! instead of being dereferenced.
//!
//! Handles are opaque: `ThreadshimMutex *`, `ThreadshimRwLock *` and
//! `ThreadshimFileLock *` point at memory owned by this library, and
//! `ThreadshimTls` is a 64-bit value. Using a handle after it was destroyed
//! is undefined behaviour.

mod handles;

pub mod atomic_abi;
pub mod compat_abi;
pub mod file_lock_abi;
pub mod identity_abi;
pub mod mutex_abi;
pub mod rwlock_abi;
pub mod tls_abi;

pub use handles::{
    ThreadshimFileLock, ThreadshimMutex, ThreadshimRwLock, ThreadshimTimeval, ThreadshimTimezone,
    ThreadshimTls, ThreadshimTm,
};

use std::ffi::c_int;

use threadshim_core::Result;

#[inline]
pub(crate) fn to_status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => err.status(),
    }
}

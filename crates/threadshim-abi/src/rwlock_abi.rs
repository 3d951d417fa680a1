//! `threadshim_rwlock_*`.

use std::ffi::c_int;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use threadshim_core::{RwLock, errno};

use crate::handles::ThreadshimRwLock;
use crate::to_status;

unsafe fn borrow(handle: *mut ThreadshimRwLock) -> Option<ManuallyDrop<RwLock>> {
    let raw = NonNull::new(handle)?;
    // SAFETY: caller passes a live handle from threadshim_rwlock_init.
    Some(ManuallyDrop::new(unsafe { RwLock::from_raw(raw.cast()) }))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_rwlock_init(out: *mut *mut ThreadshimRwLock) -> c_int {
    if out.is_null() {
        return errno::EINVAL;
    }
    let (handle, rc) = match RwLock::new() {
        Ok(lock) => (lock.into_raw().cast::<ThreadshimRwLock>().as_ptr(), 0),
        Err(err) => (ptr::null_mut(), err.status()),
    };
    // SAFETY: `out` is non-null and writable per the caller contract.
    unsafe { out.write(handle) };
    rc
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_rwlock_wrlock(handle: *mut ThreadshimRwLock) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        Some(lock) => to_status(lock.wrlock()),
        None => errno::EINVAL,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_rwlock_rdlock(handle: *mut ThreadshimRwLock) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        Some(lock) => to_status(lock.rdlock()),
        None => errno::EINVAL,
    }
}

/// Releases the shared or exclusive hold of the calling thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_rwlock_unlock(handle: *mut ThreadshimRwLock) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        // SAFETY: lock pairing is the C caller's responsibility.
        Some(lock) => to_status(unsafe { lock.unlock() }),
        None => errno::EINVAL,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_rwlock_destroy(handle: *mut ThreadshimRwLock) -> c_int {
    let Some(raw) = NonNull::new(handle) else {
        return errno::EINVAL;
    };
    // SAFETY: caller hands back ownership of a handle from threadshim_rwlock_init.
    let lock = unsafe { RwLock::from_raw(raw.cast()) };
    to_status(lock.destroy())
}

//! `threadshim_mutex_*`.

use std::ffi::c_int;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use threadshim_core::{Mutex, errno};

use crate::handles::ThreadshimMutex;
use crate::to_status;

/// Borrows the mutex behind `handle` without taking ownership.
unsafe fn borrow(handle: *mut ThreadshimMutex) -> Option<ManuallyDrop<Mutex>> {
    let raw = NonNull::new(handle)?;
    // SAFETY: caller passes a live handle from threadshim_mutex_init; the
    // ManuallyDrop keeps this borrow from destroying it.
    Some(ManuallyDrop::new(unsafe { Mutex::from_raw(raw.cast()) }))
}

/// Creates a recursive mutex. On failure `*out` is set to NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_mutex_init(out: *mut *mut ThreadshimMutex) -> c_int {
    if out.is_null() {
        return errno::EINVAL;
    }
    let (handle, rc) = match Mutex::new() {
        Ok(mutex) => (mutex.into_raw().cast::<ThreadshimMutex>().as_ptr(), 0),
        Err(err) => (ptr::null_mut(), err.status()),
    };
    // SAFETY: `out` is non-null and writable per the caller contract.
    unsafe { out.write(handle) };
    rc
}

/// Returns `EBUSY` without blocking when another thread holds the mutex.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_mutex_trylock(handle: *mut ThreadshimMutex) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        Some(mutex) => to_status(mutex.try_lock()),
        None => errno::EINVAL,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_mutex_lock(handle: *mut ThreadshimMutex) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        Some(mutex) => to_status(mutex.lock()),
        None => errno::EINVAL,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_mutex_unlock(handle: *mut ThreadshimMutex) -> c_int {
    // SAFETY: forwarded caller contract.
    match unsafe { borrow(handle) } {
        // SAFETY: lock pairing is the C caller's responsibility; non-owners
        // get EPERM from the backend.
        Some(mutex) => to_status(unsafe { mutex.unlock() }),
        None => errno::EINVAL,
    }
}

/// Destroys the mutex and frees the handle. The handle must not be used
/// again, whatever the returned status.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_mutex_destroy(handle: *mut ThreadshimMutex) -> c_int {
    let Some(raw) = NonNull::new(handle) else {
        return errno::EINVAL;
    };
    // SAFETY: caller hands back ownership of a handle from threadshim_mutex_init.
    let mutex = unsafe { Mutex::from_raw(raw.cast()) };
    to_status(mutex.destroy())
}

//! `threadshim_atomic_*`: sequentially consistent, wrapping, returning the
//! new value. A NULL pointer returns 0 and touches nothing.

use std::ffi::c_int;
use std::sync::atomic::AtomicI32;

use threadshim_core::{decrement, increment};

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_atomic_inc(value: *mut c_int) -> c_int {
    if value.is_null() {
        return 0;
    }
    // SAFETY: caller passes an aligned int that is only accessed atomically
    // while shared.
    increment(unsafe { AtomicI32::from_ptr(value) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_atomic_dec(value: *mut c_int) -> c_int {
    if value.is_null() {
        return 0;
    }
    // SAFETY: as for threadshim_atomic_inc.
    decrement(unsafe { AtomicI32::from_ptr(value) })
}

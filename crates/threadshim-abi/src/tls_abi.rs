//! `threadshim_tls_*`.
//!
//! A slot is passed by value. Slots from `threadshim_tls_create` stay valid
//! until `threadshim_tls_destroy`.

use std::ffi::{c_int, c_void};
use std::mem::ManuallyDrop;

use threadshim_core::{TlsDestructor, TlsSlot, errno};

use crate::handles::ThreadshimTls;
use crate::to_status;

fn borrow(slot: ThreadshimTls) -> ManuallyDrop<TlsSlot> {
    // SAFETY: the key bits came from threadshim_tls_create; ManuallyDrop
    // keeps this borrow from deleting the slot.
    ManuallyDrop::new(unsafe { TlsSlot::from_raw(slot.key) })
}

/// Creates a slot. `destructor` may be NULL; otherwise it runs on thread exit
/// for each thread that left a non-null value. Out of slots is `EAGAIN` on
/// pthread and portable builds and `-1` on Win32 (`FLS_OUT_OF_INDEXES`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_tls_create(
    out: *mut ThreadshimTls,
    destructor: Option<TlsDestructor>,
) -> c_int {
    if out.is_null() {
        return errno::EINVAL;
    }
    let result = match destructor {
        // SAFETY: the C caller vouches for the destructor.
        Some(dtor) => unsafe { TlsSlot::with_destructor(dtor) },
        None => TlsSlot::new(),
    };
    match result {
        Ok(slot) => {
            // SAFETY: `out` is non-null and writable.
            unsafe { out.write(ThreadshimTls { key: slot.into_raw() }) };
            0
        }
        Err(err) => err.status(),
    }
}

/// The calling thread's value, NULL when unset.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_tls_get(slot: ThreadshimTls) -> *mut c_void {
    borrow(slot).get()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_tls_set(slot: ThreadshimTls, value: *mut c_void) -> c_int {
    to_status(borrow(slot).set(value))
}

/// Releases the slot. pthread and portable builds run no destructors here;
/// on Win32 `FlsFree` calls the destructor for every thread still holding a
/// non-null value, so those values must not be freed again by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_tls_destroy(slot: ThreadshimTls) -> c_int {
    // SAFETY: caller hands back ownership of the slot.
    let owned = unsafe { TlsSlot::from_raw(slot.key) };
    to_status(owned.destroy())
}

use std::ffi::c_ulong;

use threadshim_core::{process_self, thread_self};

/// Opaque id of the calling thread, stable for its lifetime.
#[unsafe(no_mangle)]
pub extern "C" fn threadshim_thread_self() -> c_ulong {
    thread_self().as_u64() as c_ulong
}

#[unsafe(no_mangle)]
pub extern "C" fn threadshim_process_self() -> c_ulong {
    process_self().as_u64() as c_ulong
}

//! `threadshim_lock_fd` / `threadshim_unlock_fd`.

use std::ffi::{CStr, c_char, c_int};
use std::path::PathBuf;
use std::ptr;

use threadshim_core::FileLock;
use threadshim_core::errno::STATUS_NO_MEMORY;

use crate::handles::ThreadshimFileLock;

fn path_from_c(path: &CStr) -> PathBuf {
    #[cfg(unix)]
    {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(OsStr::from_bytes(path.to_bytes()))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(path.to_string_lossy().into_owned())
    }
}

/// Creates the lock file at `path` exclusively. Returns NULL when `path` is
/// NULL or empty, when the file already exists, or on any open failure; the
/// reason goes to the diagnostics sink.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_lock_fd(path: *const c_char) -> *mut ThreadshimFileLock {
    let path = if path.is_null() {
        PathBuf::new()
    } else {
        // SAFETY: caller passes a NUL-terminated string.
        path_from_c(unsafe { CStr::from_ptr(path) })
    };
    match FileLock::acquire(path) {
        Ok(lock) => Box::into_raw(Box::new(lock)).cast(),
        Err(_) => ptr::null_mut(),
    }
}

/// Closes and removes the lock file, then frees the handle. NULL is a no-op
/// returning 0; a close failure returns -1.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_unlock_fd(handle: *mut ThreadshimFileLock) -> c_int {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: caller hands back ownership of a handle from threadshim_lock_fd.
    let lock = unsafe { Box::from_raw(handle.cast::<FileLock>()) };
    match lock.release() {
        Ok(()) => 0,
        Err(_) => STATUS_NO_MEMORY,
    }
}

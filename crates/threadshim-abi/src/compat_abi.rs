//! POSIX compat exports.

use std::ffi::{c_char, c_int};
use std::ptr;

use threadshim_core::compat;
use threadshim_core::errno;

use crate::handles::{ThreadshimTimeval, ThreadshimTimezone, ThreadshimTm};

/// Either pointer may be NULL. Returns 0, or -1 when the clock is unreadable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_gettimeofday(
    tv: *mut ThreadshimTimeval,
    tz: *mut ThreadshimTimezone,
) -> c_int {
    let Ok((now, zone)) = compat::gettimeofday() else {
        return -1;
    };
    if !tv.is_null() {
        // SAFETY: non-null and writable per the caller contract.
        unsafe {
            tv.write(ThreadshimTimeval {
                tv_sec: now.sec,
                tv_usec: now.usec,
            });
        }
    }
    if !tz.is_null() {
        // SAFETY: non-null and writable per the caller contract.
        unsafe {
            tz.write(ThreadshimTimezone {
                tz_minuteswest: zone.minutes_west,
                tz_dsttime: zone.dst_time,
            });
        }
    }
    0
}

/// Returns `result`, or NULL when either pointer is NULL or the conversion
/// fails.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_localtime_r(
    timep: *const i64,
    result: *mut ThreadshimTm,
) -> *mut ThreadshimTm {
    if timep.is_null() || result.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: non-null and readable per the caller contract.
    let secs = unsafe { timep.read() };
    let Ok(tm) = compat::localtime_r(secs) else {
        return ptr::null_mut();
    };
    // SAFETY: non-null and writable per the caller contract.
    unsafe {
        result.write(ThreadshimTm {
            tm_sec: tm.sec,
            tm_min: tm.min,
            tm_hour: tm.hour,
            tm_mday: tm.mday,
            tm_mon: tm.mon,
            tm_year: tm.year,
            tm_wday: tm.wday,
            tm_yday: tm.yday,
            tm_isdst: tm.isdst,
        });
    }
    result
}

/// 0 on success, otherwise the errno-style status (`EBADF` for a bad
/// descriptor).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_fsync(fd: c_int) -> c_int {
    match compat::fsync(fd) {
        Ok(()) => 0,
        Err(err) => err.status(),
    }
}

/// Copies the host name, truncated to `len - 1` bytes and NUL-terminated.
/// Falls back to `"localhost"`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn threadshim_gethostname(name: *mut c_char, len: usize) -> c_int {
    if name.is_null() || len == 0 {
        return errno::EINVAL;
    }
    let host = compat::hostname();
    let bytes = host.as_bytes();
    let n = bytes.len().min(len - 1);
    // SAFETY: `name` is writable for `len` bytes and n < len.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), name.cast::<u8>(), n);
        name.add(n).write(0);
    }
    0
}

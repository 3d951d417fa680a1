use std::ffi::{c_int, c_long, c_void};
use std::sync::{Once, OnceLock};

use super::{TimeVal, TimeZone, Tm};
use crate::errno;
use crate::error::{Result, SyncError};

/// Offset between the FILETIME epoch (1601) and the Unix epoch.
const DELTA_EPOCH_IN_MICROSECS: u64 = 11_644_473_600_000_000;

const ERROR_INVALID_HANDLE: u32 = 6;
const COMPUTER_NAME_DNS_HOSTNAME: c_int = 1;
const INVALID_HANDLE_VALUE: isize = -1;

#[repr(C)]
#[derive(Default)]
struct FileTime {
    low: u32,
    high: u32,
}

#[repr(C)]
#[derive(Default)]
struct CrtTm {
    tm_sec: c_int,
    tm_min: c_int,
    tm_hour: c_int,
    tm_mday: c_int,
    tm_mon: c_int,
    tm_year: c_int,
    tm_wday: c_int,
    tm_yday: c_int,
    tm_isdst: c_int,
}

type FileTimeFn = unsafe extern "system" fn(*mut FileTime);

#[link(name = "kernel32")]
unsafe extern "system" {
    fn GetSystemTimeAsFileTime(ft: *mut FileTime);
    fn GetModuleHandleA(name: *const u8) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, name: *const u8) -> *mut c_void;
    fn GetComputerNameExA(format: c_int, buffer: *mut u8, size: *mut u32) -> i32;
    fn FlushFileBuffers(handle: isize) -> i32;
    fn GetLastError() -> u32;
}

// The CRT is linked by the standard library already.
unsafe extern "C" {
    fn _tzset();
    fn _get_timezone(seconds: *mut c_long) -> c_int;
    fn _get_daylight(hours: *mut c_int) -> c_int;
    fn _localtime64_s(tm: *mut CrtTm, time: *const i64) -> c_int;
    fn _get_osfhandle(fd: c_int) -> isize;
}

/// `GetSystemTimePreciseAsFileTime` only exists from Windows 8 on.
fn precise_clock() -> FileTimeFn {
    static CLOCK: OnceLock<FileTimeFn> = OnceLock::new();
    *CLOCK.get_or_init(|| {
        // SAFETY: both names are NUL-terminated; a non-null result of
        // GetProcAddress for this symbol has the FileTimeFn signature.
        unsafe {
            let module = GetModuleHandleA(b"kernel32.dll\0".as_ptr());
            if module.is_null() {
                return GetSystemTimeAsFileTime as FileTimeFn;
            }
            let symbol = GetProcAddress(module, b"GetSystemTimePreciseAsFileTime\0".as_ptr());
            if symbol.is_null() {
                GetSystemTimeAsFileTime as FileTimeFn
            } else {
                std::mem::transmute::<*mut c_void, FileTimeFn>(symbol)
            }
        }
    })
}

fn to_timeval(ft: &FileTime) -> TimeVal {
    let ticks = (u64::from(ft.high) << 32) | u64::from(ft.low);
    let micros = (ticks / 10).saturating_sub(DELTA_EPOCH_IN_MICROSECS);
    TimeVal {
        sec: (micros / 1_000_000) as i64,
        usec: (micros % 1_000_000) as i64,
    }
}

fn local_zone() -> TimeZone {
    static TZSET: Once = Once::new();
    // SAFETY: _tzset only reads the TZ environment variable.
    TZSET.call_once(|| unsafe { _tzset() });
    let mut seconds: c_long = 0;
    let mut daylight: c_int = 0;
    // SAFETY: both out-pointers refer to live locals.
    unsafe {
        _get_timezone(&mut seconds);
        _get_daylight(&mut daylight);
    }
    TimeZone {
        minutes_west: (seconds / 60) as i32,
        dst_time: daylight,
    }
}

pub(super) fn gettimeofday() -> Result<(TimeVal, TimeZone)> {
    let mut ft = FileTime::default();
    // SAFETY: ft is a live local.
    unsafe { precise_clock()(&mut ft) };
    Ok((to_timeval(&ft), local_zone()))
}

pub(super) fn gettimeofday_coarse() -> Result<(TimeVal, TimeZone)> {
    let mut ft = FileTime::default();
    // SAFETY: ft is a live local.
    unsafe { GetSystemTimeAsFileTime(&mut ft) };
    Ok((to_timeval(&ft), local_zone()))
}

pub(super) fn localtime_r(secs: i64) -> Result<Tm> {
    let mut tm = CrtTm::default();
    // SAFETY: both pointers refer to live locals.
    let rc = unsafe { _localtime64_s(&mut tm, &secs) };
    if rc != 0 {
        return Err(SyncError::Native {
            op: "localtime_r",
            code: rc,
        });
    }
    Ok(Tm {
        sec: tm.tm_sec,
        min: tm.tm_min,
        hour: tm.tm_hour,
        mday: tm.tm_mday,
        mon: tm.tm_mon,
        year: tm.tm_year,
        wday: tm.tm_wday,
        yday: tm.tm_yday,
        isdst: tm.tm_isdst,
    })
}

pub(super) fn fsync(fd: i32) -> Result<()> {
    // SAFETY: invalid descriptors yield INVALID_HANDLE_VALUE.
    let handle = unsafe { _get_osfhandle(fd) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(SyncError::Native {
            op: "fsync",
            code: errno::EBADF,
        });
    }
    // SAFETY: handle belongs to an open CRT descriptor.
    if unsafe { FlushFileBuffers(handle) } != 0 {
        return Ok(());
    }
    // SAFETY: no preconditions.
    let code = match unsafe { GetLastError() } {
        // e.g. a console handle
        ERROR_INVALID_HANDLE => errno::EINVAL,
        _ => errno::EIO,
    };
    Err(SyncError::Native { op: "fsync", code })
}

pub(super) fn hostname() -> Option<String> {
    let mut buf = [0_u8; 256];
    let mut len = buf.len() as u32;
    // SAFETY: len describes buf's capacity.
    if unsafe { GetComputerNameExA(COMPUTER_NAME_DNS_HOSTNAME, buf.as_mut_ptr(), &mut len) } == 0 {
        return None;
    }
    let len = (len as usize).min(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

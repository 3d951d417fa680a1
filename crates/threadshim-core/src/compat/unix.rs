use std::ffi::CStr;
use std::io;
use std::mem::MaybeUninit;
use std::ptr;

use super::{TimeVal, TimeZone, Tm};
use crate::error::{Result, SyncError};

fn os_error(op: &'static str) -> SyncError {
    SyncError::Os {
        op,
        source: io::Error::last_os_error(),
    }
}

pub(super) fn gettimeofday() -> Result<(TimeVal, TimeZone)> {
    let mut tv = MaybeUninit::<libc::timeval>::uninit();
    // SAFETY: tv is local out-storage; a null timezone is allowed.
    if unsafe { libc::gettimeofday(tv.as_mut_ptr(), ptr::null_mut()) } != 0 {
        return Err(os_error("gettimeofday"));
    }
    // SAFETY: initialized on success.
    let tv = unsafe { tv.assume_init() };
    let now = TimeVal {
        sec: tv.tv_sec as i64,
        usec: tv.tv_usec as i64,
    };
    Ok((now, local_zone(now.sec)))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(super) fn gettimeofday_coarse() -> Result<(TimeVal, TimeZone)> {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    // SAFETY: ts is local out-storage.
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME_COARSE, ts.as_mut_ptr()) } != 0 {
        return gettimeofday();
    }
    // SAFETY: initialized on success.
    let ts = unsafe { ts.assume_init() };
    let now = TimeVal {
        sec: ts.tv_sec as i64,
        usec: ts.tv_nsec as i64 / 1000,
    };
    Ok((now, local_zone(now.sec)))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(super) fn gettimeofday_coarse() -> Result<(TimeVal, TimeZone)> {
    gettimeofday()
}

fn local_tm(secs: i64) -> Option<libc::tm> {
    let t = secs as libc::time_t;
    let mut tm = MaybeUninit::<libc::tm>::uninit();
    // SAFETY: both pointers refer to live locals.
    let ret = unsafe { libc::localtime_r(&t, tm.as_mut_ptr()) };
    if ret.is_null() {
        None
    } else {
        // SAFETY: localtime_r filled tm.
        Some(unsafe { tm.assume_init() })
    }
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos", target_os = "aix")))]
fn local_zone(secs: i64) -> TimeZone {
    local_tm(secs).map_or_else(TimeZone::default, |tm| TimeZone {
        minutes_west: -(tm.tm_gmtoff / 60) as i32,
        dst_time: i32::from(tm.tm_isdst > 0),
    })
}

#[cfg(any(target_os = "solaris", target_os = "illumos", target_os = "aix"))]
fn local_zone(secs: i64) -> TimeZone {
    local_tm(secs).map_or_else(TimeZone::default, |tm| TimeZone {
        minutes_west: 0,
        dst_time: i32::from(tm.tm_isdst > 0),
    })
}

pub(super) fn localtime_r(secs: i64) -> Result<Tm> {
    let tm = local_tm(secs).ok_or_else(|| os_error("localtime_r"))?;
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
    #[cfg(any(target_os = "linux", target_os = "android"))]
    // SAFETY: an invalid descriptor only yields EBADF.
    let rc = unsafe { libc::fdatasync(fd) };
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    // SAFETY: an invalid descriptor only yields EBADF.
    let rc = unsafe { libc::fsync(fd) };
    if rc == 0 { Ok(()) } else { Err(os_error("fsync")) }
}

pub(super) fn hostname() -> Option<String> {
    let mut buf = [0_u8; 256];
    // SAFETY: buf is writable for its full length.
    if unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) } != 0 {
        return None;
    }
    // Truncated names may lack the terminator.
    let last = buf.len() - 1;
    buf[last] = 0;
    CStr::from_bytes_until_nul(&buf)
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno;

    #[test]
    fn fsync_bad_descriptor_is_ebadf() {
        let err = fsync(-1).unwrap_err();
        assert_eq!(err.status(), errno::EBADF);
    }

    #[test]
    fn fsync_real_file() {
        use std::os::fd::AsRawFd;

        let path = std::env::temp_dir().join(format!("threadshim-fsync-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        fsync(file.as_raw_fd()).unwrap();
        drop(file);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn fsync_after_append_keeps_length() {
        use std::io::Write;
        use std::os::fd::AsRawFd;

        let path =
            std::env::temp_dir().join(format!("threadshim-fsync-len-{}", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[7_u8; 4096]).unwrap();
        fsync(file.as_raw_fd()).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 4096);
        drop(file);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn epoch_is_localtime_convertible() {
        let tm = localtime_r(0).unwrap();
        assert!(tm.year == 69 || tm.year == 70);
    }
}

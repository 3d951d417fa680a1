//! POSIX time and host shims.
//!
//! The logging engine formats timestamps with `gettimeofday` + `localtime_r`,
//! flushes with `fsync` and stamps records with the host name. Unix targets
//! pass straight through to libc; Windows emulates each call on top of
//! kernel32 and the CRT.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[cfg(unix)]
#[path = "unix.rs"]
mod imp;

#[cfg(windows)]
#[path = "windows.rs"]
mod imp;

#[cfg(not(any(unix, windows)))]
#[path = "fallback.rs"]
mod imp;

/// Seconds and microseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.sec * 1_000_000 + self.usec
    }
}

/// Local timezone as reported alongside [`TimeVal`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeZone {
    /// Minutes west of Greenwich.
    pub minutes_west: i32,
    /// Non-zero when daylight saving time applies.
    pub dst_time: i32,
}

/// Broken-down time with C `struct tm` conventions (`year` counts from 1900,
/// `mon` from 0).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tm {
    pub sec: i32,
    pub min: i32,
    pub hour: i32,
    pub mday: i32,
    pub mon: i32,
    pub year: i32,
    pub wday: i32,
    pub yday: i32,
    pub isdst: i32,
}

/// Wall-clock time with microsecond resolution, and the local zone.
pub fn gettimeofday() -> Result<(TimeVal, TimeZone)> {
    imp::gettimeofday()
}

/// Cheaper, lower-resolution variant of [`gettimeofday`].
pub fn gettimeofday_coarse() -> Result<(TimeVal, TimeZone)> {
    imp::gettimeofday_coarse()
}

/// Thread-safe conversion of `secs` since the epoch to local time.
pub fn localtime_r(secs: i64) -> Result<Tm> {
    imp::localtime_r(secs)
}

/// Flushes OS buffers of descriptor `fd` to stable storage.
///
/// On Linux and Android this is `fdatasync`: file data and the metadata
/// needed to read it back (such as the size) are flushed, but timestamps
/// and other attributes may not be. Other Unix targets call `fsync`;
/// Windows calls `FlushFileBuffers`, which flushes both.
pub fn fsync(fd: i32) -> Result<()> {
    imp::fsync(fd)
}

/// Host name, or `"localhost"` when it cannot be determined.
#[must_use]
pub fn hostname() -> String {
    imp::hostname()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// UTC broken-down time; pure arithmetic, no timezone database.
#[must_use]
pub fn gmtime(secs: i64) -> Tm {
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    let (year, mon, mday) = civil_from_days(days);
    let yday = days - days_from_civil(year, 1, 1);
    Tm {
        sec: (rem % 60) as i32,
        min: ((rem / 60) % 60) as i32,
        hour: (rem / 3600) as i32,
        mday: mday as i32,
        mon: mon as i32 - 1,
        year: (year - 1900) as i32,
        // 1970-01-01 was a Thursday.
        wday: (days + 4).rem_euclid(7) as i32,
        yday: yday as i32,
        isdst: 0,
    }
}

// Proleptic Gregorian conversions (H. Hinnant's civil date algorithms).
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

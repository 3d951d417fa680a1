use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{TimeVal, TimeZone, Tm};
use crate::error::{Result, SyncError};

pub(super) fn gettimeofday() -> Result<(TimeVal, TimeZone)> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| SyncError::Os {
            op: "gettimeofday",
            source: io::Error::other(err),
        })?;
    let tv = TimeVal {
        sec: now.as_secs() as i64,
        usec: i64::from(now.subsec_micros()),
    };
    Ok((tv, TimeZone::default()))
}

pub(super) fn gettimeofday_coarse() -> Result<(TimeVal, TimeZone)> {
    gettimeofday()
}

/// No timezone database here: local time is UTC.
pub(super) fn localtime_r(secs: i64) -> Result<Tm> {
    Ok(super::gmtime(secs))
}

pub(super) fn fsync(_fd: i32) -> Result<()> {
    Err(SyncError::Os {
        op: "fsync",
        source: io::Error::from(io::ErrorKind::Unsupported),
    })
}

pub(super) fn hostname() -> Option<String> {
    None
}

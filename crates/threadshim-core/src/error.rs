//! Error type shared by every primitive.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::errno;

/// Result alias used throughout the crate.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Failure of a primitive operation.
///
/// [`SyncError::status`] projects every variant onto the integer status
/// convention of the C ABI (see [`crate::errno`]).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The handle's backing allocation could not be made.
    #[error("out of memory allocating {what}")]
    OutOfMemory { what: &'static str },

    /// The native primitive reported an error code.
    #[error("{op} failed with native error {code}")]
    Native { op: &'static str, code: i32 },

    /// A non-blocking acquire found the primitive held.
    #[error("{op}: primitive is busy")]
    Busy { op: &'static str },

    /// Release attempted by a thread that does not hold the lock.
    #[error("{op}: calling thread does not own the lock")]
    NotOwner { op: &'static str },

    /// The lock file path was empty.
    #[error("lock file path is empty")]
    InvalidPath,

    /// Another holder already created the lock file.
    #[error("lock file {} already exists", path.display())]
    AlreadyLocked { path: PathBuf },

    /// Filesystem failure on a lock file.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// OS failure outside of a lock file (time, fsync, hostname).
    #[error("{op}: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Every thread-local storage slot is in use.
    #[error("no thread-local storage slots left")]
    SlotsExhausted,

    /// The thread-local storage slot was destroyed or never existed.
    #[error("stale or unknown thread-local storage slot")]
    InvalidSlot,
}

impl SyncError {
    /// Integer status for the C ABI: positive native code, [`errno::EBUSY`]
    /// for contention, [`errno::STATUS_NO_MEMORY`] for allocation failure.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Self::OutOfMemory { .. } => errno::STATUS_NO_MEMORY,
            Self::Native { code, .. } => *code,
            Self::Busy { .. } => errno::EBUSY,
            Self::NotOwner { .. } => errno::EPERM,
            Self::InvalidPath | Self::InvalidSlot => errno::EINVAL,
            Self::AlreadyLocked { .. } => errno::EEXIST,
            Self::Io { source, .. } | Self::Os { source, .. } => {
                source.raw_os_error().filter(|code| *code > 0).unwrap_or(errno::EIO)
            }
            Self::SlotsExhausted => errno::EAGAIN,
        }
    }

    /// True for the contention outcome of `try_lock`, which is not a real
    /// failure.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Classifies a native status code returned by a backend call.
    pub(crate) fn from_status(op: &'static str, code: i32) -> Self {
        match code {
            errno::EBUSY => Self::Busy { op },
            errno::EPERM => Self::NotOwner { op },
            errno::STATUS_NO_MEMORY => Self::OutOfMemory { what: op },
            _ => Self::Native { op, code },
        }
    }
}

/// Maps a backend status code onto `Result`.
pub(crate) fn check(op: &'static str, code: i32) -> Result<()> {
    if code == errno::STATUS_OK {
        Ok(())
    } else {
        Err(SyncError::from_status(op, code))
    }
}

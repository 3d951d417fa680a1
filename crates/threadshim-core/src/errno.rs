//! Status codes.
//!
//! Every operation reports through one convention, whatever the backend:
//! `0` on success, a positive native error code on failure, [`EBUSY`] when a
//! non-blocking acquire finds the primitive held, and [`STATUS_NO_MEMORY`]
//! (`-1`) for allocation failure and the calls that historically return -1.

/// Success.
pub const STATUS_OK: i32 = 0;
/// Allocation failure, or generic failure of a call with no native code.
pub const STATUS_NO_MEMORY: i32 = -1;

// These values agree across Linux, the BSDs, macOS and the Windows CRT.
pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;

#[cfg(unix)]
pub const EAGAIN: i32 = libc::EAGAIN;
#[cfg(not(unix))]
pub const EAGAIN: i32 = 11;

/// Returns true if `status` is the contention code of a non-blocking acquire.
#[must_use]
pub const fn is_busy(status: i32) -> bool {
    status == EBUSY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_codes_match_host_libc() {
        #[cfg(unix)]
        {
            assert_eq!(EPERM, libc::EPERM);
            assert_eq!(ENOENT, libc::ENOENT);
            assert_eq!(EIO, libc::EIO);
            assert_eq!(EBADF, libc::EBADF);
            assert_eq!(ENOMEM, libc::ENOMEM);
            assert_eq!(EBUSY, libc::EBUSY);
            assert_eq!(EEXIST, libc::EEXIST);
            assert_eq!(EINVAL, libc::EINVAL);
        }
    }

    #[test]
    fn busy_is_distinct_from_success_and_oom() {
        assert!(is_busy(EBUSY));
        assert!(!is_busy(STATUS_OK));
        assert!(!is_busy(STATUS_NO_MEMORY));
    }
}

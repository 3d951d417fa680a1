//! Thread and process identity.

use std::fmt;

use crate::sys::{Active, Backend};

/// Opaque identifier of the calling thread.
///
/// Stable for the thread's lifetime and distinct among live threads of one
/// process. Not meaningful across processes or restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OS process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[must_use]
pub fn thread_self() -> ThreadId {
    ThreadId(Active::thread_self())
}

#[must_use]
pub fn process_self() -> ProcessId {
    ProcessId(Active::process_self())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_threads_differ() {
        let main = thread_self();
        let other = std::thread::scope(|s| s.spawn(thread_self).join().unwrap());
        assert_ne!(main, other);
        assert_eq!(main, thread_self());
    }

    #[test]
    fn process_id_matches_std() {
        assert_eq!(process_self().as_u64(), u64::from(std::process::id()));
        assert_eq!(process_self().to_string(), std::process::id().to_string());
    }
}

//! Diagnostics configuration.
//!
//! Two environment variables control where primitive failures are reported:
//! - `THREADSHIM_DIAG`: `off`, `error` (default) or `debug`.
//! - `THREADSHIM_DIAG_FILE`: path of a JSONL file to append records to, or
//!   `stderr`. When unset, records go to standard error.
//!
//! Both are read once, on first use. [`set_diag_level`] and
//! [`crate::diag::set_sink`] override them programmatically.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

pub const DIAG_LEVEL_ENV: &str = "THREADSHIM_DIAG";
pub const DIAG_FILE_ENV: &str = "THREADSHIM_DIAG_FILE";

/// Verbosity of the diagnostics sink.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    /// Nothing is reported.
    Off,
    /// Failures only: lock file creation/close errors.
    #[default]
    Error,
    /// Failures plus handle lifecycle events.
    Debug,
}

impl DiagLevel {
    /// Parse from string (case-insensitive). Unknown values mean `Error`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" | "disabled" => Self::Off,
            "debug" | "trace" | "all" | "2" => Self::Debug,
            _ => Self::Error,
        }
    }

    /// Returns true if a record at `record` level passes this threshold.
    #[must_use]
    pub fn admits(self, record: DiagLevel) -> bool {
        record != Self::Off && record <= self
    }
}

/// Destination of diagnostics records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagTarget {
    Stderr,
    File(PathBuf),
}

impl DiagTarget {
    fn from_env_value(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("stderr") {
            Self::Stderr
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }
}

// 0=unresolved, 1=Off, 2=Error, 3=Debug, 255=resolving.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(0);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_OFF: u8 = 1;
const LEVEL_ERROR: u8 = 2;
const LEVEL_DEBUG: u8 = 3;
const LEVEL_RESOLVING: u8 = 255;

fn level_to_u8(level: DiagLevel) -> u8 {
    match level {
        DiagLevel::Off => LEVEL_OFF,
        DiagLevel::Error => LEVEL_ERROR,
        DiagLevel::Debug => LEVEL_DEBUG,
    }
}

fn u8_to_level(v: u8) -> DiagLevel {
    match v {
        LEVEL_OFF => DiagLevel::Off,
        LEVEL_DEBUG => DiagLevel::Debug,
        _ => DiagLevel::Error,
    }
}

/// The configured diagnostics level (reads `THREADSHIM_DIAG` on first call).
///
/// A call racing the first resolution sees `Error` until the value is
/// published.
#[must_use]
pub fn diag_level() -> DiagLevel {
    let cached = CACHED_LEVEL.load(Ordering::Acquire);
    if cached != LEVEL_UNRESOLVED && cached != LEVEL_RESOLVING {
        return u8_to_level(cached);
    }
    if cached == LEVEL_RESOLVING {
        return DiagLevel::Error;
    }

    if CACHED_LEVEL
        .compare_exchange(
            LEVEL_UNRESOLVED,
            LEVEL_RESOLVING,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        let v = CACHED_LEVEL.load(Ordering::Acquire);
        return if v != LEVEL_UNRESOLVED && v != LEVEL_RESOLVING {
            u8_to_level(v)
        } else {
            DiagLevel::Error
        };
    }

    let level = std::env::var(DIAG_LEVEL_ENV)
        .map(|v| DiagLevel::from_str_loose(&v))
        .unwrap_or_default();
    // A concurrent set_diag_level wins over the environment.
    let _ = CACHED_LEVEL.compare_exchange(
        LEVEL_RESOLVING,
        level_to_u8(level),
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    u8_to_level(CACHED_LEVEL.load(Ordering::Acquire))
}

/// Overrides the diagnostics level for the rest of the process.
pub fn set_diag_level(level: DiagLevel) {
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
}

/// Destination named by `THREADSHIM_DIAG_FILE`, read fresh on every call.
#[must_use]
pub fn diag_target_from_env() -> DiagTarget {
    std::env::var(DIAG_FILE_ENV)
        .map(|v| DiagTarget::from_env_value(&v))
        .unwrap_or(DiagTarget::Stderr)
}

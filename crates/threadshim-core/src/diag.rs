//! Diagnostics sink.
//!
//! Failures that the C contract reports only as a null handle or `-1` (lock
//! file creation and close) are also written here, one JSON object per line:
//!
//! ```text
//! {"timestamp":"2026-10-18T09:12:44.031Z","level":"error","event":"lock_fd_failed",
//!  "backend":"pthread","thread":140213,"pid":4242,"op":"lock_fd",
//!  "path":"/var/run/app.lock","errno":17,"message":"File exists (os error 17)"}
//! ```
//!
//! The level threshold comes from [`crate::config::diag_level`]; the sink from
//! `THREADSHIM_DIAG_FILE` unless [`set_sink`] installed one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{self, DiagLevel, DiagTarget};
use crate::{compat, identity};

/// One diagnostics record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagRecord {
    pub timestamp: String,
    pub level: DiagLevel,
    pub event: String,
    pub backend: String,
    pub thread: u64,
    pub pid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DiagRecord {
    /// Create a record stamped with the current time, thread and process.
    #[must_use]
    pub fn new(level: DiagLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_utc(),
            level,
            event: event.into(),
            backend: crate::backend_name().to_string(),
            thread: identity::thread_self().as_u64(),
            pid: identity::process_self().as_u64(),
            op: None,
            path: None,
            errno: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Write the record to the sink if the configured level admits it.
    pub fn emit(self) {
        if !config::diag_level().admits(self.level) {
            return;
        }
        let Ok(line) = self.to_jsonl() else {
            return;
        };
        let mut sink = SINK.lock();
        let active = sink.get_or_insert_with(|| ActiveSink::open(config::diag_target_from_env()));
        active.write_line(&line);
    }
}

/// In-memory sink, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Captured lines parsed back into records; unparsable lines are skipped.
    #[must_use]
    pub fn records(&self) -> Vec<DiagRecord> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

/// Sink selection for [`set_sink`].
#[derive(Debug, Clone)]
pub enum DiagSink {
    Stderr,
    File(PathBuf),
    Memory(MemorySink),
}

enum ActiveSink {
    Stderr,
    File(File),
    Memory(MemorySink),
}

impl ActiveSink {
    fn open(target: DiagTarget) -> Self {
        match target {
            DiagTarget::Stderr => Self::Stderr,
            DiagTarget::File(path) => match open_append(&path) {
                Ok(file) => Self::File(file),
                Err(_) => Self::Stderr,
            },
        }
    }

    fn write_line(&mut self, line: &str) {
        // Reporting must never fail the primitive that is reporting.
        match self {
            Self::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
            Self::File(file) => {
                let _ = writeln!(file, "{line}");
            }
            Self::Memory(memory) => memory.lines.lock().push(line.to_string()),
        }
    }
}

static SINK: Mutex<Option<ActiveSink>> = parking_lot::const_mutex(None);

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Replace the diagnostics sink for the rest of the process.
pub fn set_sink(sink: DiagSink) -> io::Result<()> {
    let active = match sink {
        DiagSink::Stderr => ActiveSink::Stderr,
        DiagSink::File(path) => ActiveSink::File(open_append(&path)?),
        DiagSink::Memory(memory) => ActiveSink::Memory(memory),
    };
    *SINK.lock() = Some(active);
    Ok(())
}

/// Report an OS-level failure on `path`.
pub(crate) fn io_failure(event: &str, op: &str, path: &Path, err: &io::Error) {
    let mut record = DiagRecord::new(DiagLevel::Error, event)
        .with_op(op)
        .with_path(path)
        .with_message(err.to_string());
    if let Some(code) = err.raw_os_error() {
        record = record.with_errno(code);
    }
    record.emit();
}

/// Report a handle lifecycle event (debug level).
pub(crate) fn lifecycle(event: &str, op: &str, status: i32) {
    if !config::diag_level().admits(DiagLevel::Debug) {
        return;
    }
    DiagRecord::new(DiagLevel::Debug, event)
        .with_op(op)
        .with_errno(status)
        .emit();
}

fn timestamp_utc() -> String {
    let now = compat::gettimeofday_coarse()
        .map(|(tv, _)| tv)
        .unwrap_or_default();
    let tm = compat::gmtime(now.sec);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        tm.year + 1900,
        tm.mon + 1,
        tm.mday,
        tm.hour,
        tm.min,
        tm.sec,
        now.usec / 1000,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_required_fields_only_when_unset() {
        let record = DiagRecord::new(DiagLevel::Error, "lock_fd_failed");
        let json = record.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["level"], "error");
        assert_eq!(parsed["event"], "lock_fd_failed");
        assert_eq!(parsed["backend"], crate::backend_name());
        assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(parsed.get("path").is_none());
        assert!(parsed.get("errno").is_none());
    }

    #[test]
    fn record_builder_sets_optional_fields() {
        let record = DiagRecord::new(DiagLevel::Debug, "mutex_init")
            .with_op("mutex_init")
            .with_path(Path::new("/tmp/a.lock"))
            .with_errno(17)
            .with_message("exists");
        let back: DiagRecord = serde_json::from_str(&record.to_jsonl().unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp_utc();
        assert_eq!(ts.len(), "2026-10-18T09:12:44.031Z".len());
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }
}

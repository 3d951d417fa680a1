//! Structured logging contract for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`ArtifactIndex`]: links logs to run artifacts with SHA-256 integrity.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`validate_log_line`] / [`validate_log_file`]: check run logs, one
//!   [`LogLineError`] per bad line.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Property check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

/// Primitive family a record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Mutex,
    Rwlock,
    Tls,
    Atomic,
    Identity,
    FileLock,
    Compat,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    /// Native backend the run was built with (`pthread`, `win32`, `portable`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive: Option<Primitive>,
    /// Property or operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            suite: None,
            backend: None,
            primitive: None,
            property: None,
            outcome: None,
            errno: None,
            threads: None,
            latency_ns: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Set the primitive family and property name.
    #[must_use]
    pub fn with_property(mut self, primitive: Primitive, property: impl Into<String>) -> Self {
        self.primitive = Some(primitive);
        self.property = Some(property.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    #[must_use]
    pub fn with_latency_ns(mut self, ns: u64) -> Self {
        self.latency_ns = Some(ns);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Artifact index linking a run log to the files it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub suite: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            suite: suite.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hash `path` and record it under `name`.
    pub fn add_file(
        &mut self,
        path: &Path,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> std::io::Result<&mut Self> {
        let data = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: name.into(),
            kind: kind.into(),
            sha256: sha256_hex(&data),
            size_bytes: Some(data.len() as u64),
        });
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Shared in-memory JSONL buffer, readable while the emitter is alive.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries to a file or a buffer.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    suite: String,
    run_id: String,
}

impl LogEmitter {
    pub fn to_file(path: &Path, suite: &str, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            writer: Box::new(std::io::BufWriter::new(file)),
            seq: 0,
            suite: suite.to_string(),
            run_id: run_id.to_string(),
        })
    }

    /// Emitter writing into `buffer` (for testing).
    #[must_use]
    pub fn to_buffer(buffer: LogBuffer, suite: &str, run_id: &str) -> Self {
        Self {
            writer: Box::new(buffer),
            seq: 0,
            suite: suite.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Next trace id: `<suite>::<run_id>::<seq>`.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.suite, self.run_id, self.seq)
    }

    /// Write `entry`, filling in trace id, suite and backend when unset.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.suite.is_none() {
            entry.suite = Some(self.suite.clone());
        }
        if entry.backend.is_none() {
            entry.backend = Some(threadshim_core::backend_name().to_string());
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Backend names a run log may carry.
pub const BACKENDS: [&str; 3] = ["pthread", "win32", "portable"];

/// First problem found on a run log line.
#[derive(Debug, Error)]
pub enum LogLineError {
    /// Not JSON, a required field is missing, or an enum field has an
    /// unknown value.
    #[error("line {line}: {source}")]
    Schema {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: unknown backend {backend:?}")]
    UnknownBackend { line: usize, backend: String },
    #[error("line {line}: trace id {trace_id:?} is not <suite>::<run_id>::<seq>")]
    TraceId { line: usize, trace_id: String },
    #[error("line {line}: trace id {trace_id:?} does not belong to suite {suite:?}")]
    SuiteMismatch {
        line: usize,
        trace_id: String,
        suite: String,
    },
    /// A verdict without a property cannot be joined back to the report.
    #[error("line {line}: {outcome:?} verdict does not name its property")]
    OrphanVerdict { line: usize, outcome: Outcome },
}

impl LogLineError {
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::Schema { line, .. }
            | Self::UnknownBackend { line, .. }
            | Self::TraceId { line, .. }
            | Self::SuiteMismatch { line, .. }
            | Self::OrphanVerdict { line, .. } => *line,
        }
    }
}

/// Parse one run log line and check what the type system can't: the
/// backend name, the trace id shape and its suite prefix, and that verdicts
/// name a property.
pub fn validate_log_line(line: &str, line_number: usize) -> Result<LogEntry, LogLineError> {
    let entry: LogEntry = serde_json::from_str(line).map_err(|source| LogLineError::Schema {
        line: line_number,
        source,
    })?;

    if let Some(backend) = &entry.backend
        && !BACKENDS.contains(&backend.as_str())
    {
        return Err(LogLineError::UnknownBackend {
            line: line_number,
            backend: backend.clone(),
        });
    }

    let mut parts = entry.trace_id.split("::");
    let (Some(suite), Some(run), Some(seq), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(LogLineError::TraceId {
            line: line_number,
            trace_id: entry.trace_id.clone(),
        });
    };
    if suite.is_empty() || run.is_empty() || seq.parse::<u64>().is_err() {
        return Err(LogLineError::TraceId {
            line: line_number,
            trace_id: entry.trace_id.clone(),
        });
    }
    if let Some(expected) = &entry.suite
        && expected != suite
    {
        return Err(LogLineError::SuiteMismatch {
            line: line_number,
            trace_id: entry.trace_id.clone(),
            suite: expected.clone(),
        });
    }

    if let (Some(outcome), None) = (entry.outcome, &entry.property) {
        return Err(LogLineError::OrphanVerdict {
            line: line_number,
            outcome,
        });
    }

    Ok(entry)
}

/// Validate every non-blank line of a run log.
///
/// Returns the number of lines checked and one error per bad line.
pub fn validate_log_file(path: &Path) -> std::io::Result<(usize, Vec<LogLineError>)> {
    let content = std::fs::read_to_string(path)?;
    let mut checked = 0;
    let errors = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| {
            checked += 1;
            validate_log_line(line.trim(), i + 1).err()
        })
        .collect();
    Ok((checked, errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn now_utc() -> String {
    let now = threadshim_core::compat::gettimeofday()
        .map(|(tv, _)| tv)
        .unwrap_or_default();
    let tm = threadshim_core::compat::gmtime(now.sec);
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
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("conformance::run-1::001", LogLevel::Info, "run_start");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "conformance::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "run_start");
        assert!(parsed.get("suite").is_none());
        assert!(parsed.get("primitive").is_none());
        assert!(parsed.get("outcome").is_none());
    }

    #[test]
    fn log_entry_with_optional_fields() {
        let entry = LogEntry::new("conformance::run-1::002", LogLevel::Error, "property_result")
            .with_suite("conformance")
            .with_backend("pthread")
            .with_property(Primitive::FileLock, "file_lock_exclusive")
            .with_outcome(Outcome::Fail)
            .with_errno(17)
            .with_threads(8)
            .with_latency_ns(150)
            .with_duration_ms(2)
            .with_artifacts(vec!["report.json".to_string()])
            .with_details(serde_json::json!({"winners": 2}));

        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["suite"], "conformance");
        assert_eq!(parsed["backend"], "pthread");
        assert_eq!(parsed["primitive"], "file_lock");
        assert_eq!(parsed["property"], "file_lock_exclusive");
        assert_eq!(parsed["outcome"], "fail");
        assert_eq!(parsed["errno"], 17);
        assert_eq!(parsed["threads"], 8);
        assert_eq!(parsed["details"]["winners"], 2);
    }

    fn line(fields: &str) -> String {
        format!(r#"{{"timestamp":"t","level":"info","event":"x",{fields}}}"#)
    }

    #[test]
    fn validate_valid_line() {
        let entry = LogEntry::new("conformance::run-1::001", LogLevel::Info, "run_start")
            .with_suite("conformance")
            .with_backend("portable");
        let result = validate_log_line(&entry.to_jsonl().unwrap(), 1);
        assert!(result.is_ok(), "Valid line should pass: {result:?}");
    }

    #[test]
    fn validate_missing_required_field() {
        let json = r#"{"timestamp":"2026-01-01T00:00:00Z","level":"info","event":"test"}"#;
        let err = validate_log_line(json, 1).unwrap_err();
        assert!(matches!(err, LogLineError::Schema { line: 1, .. }));
        assert!(err.to_string().contains("trace_id"), "{err}");
    }

    #[test]
    fn validate_unknown_enum_values() {
        for fields in [
            r#""trace_id":"a::b::1","level":"critical""#,
            r#""trace_id":"a::b::1","primitive":"semaphore""#,
            r#""trace_id":"a::b::1","property":"p","outcome":"flaky""#,
        ] {
            let err = validate_log_line(&line(fields), 4).unwrap_err();
            assert!(matches!(err, LogLineError::Schema { line: 4, .. }), "{fields}");
        }
    }

    #[test]
    fn validate_unknown_backend() {
        let err = validate_log_line(&line(r#""trace_id":"a::b::1","backend":"c11""#), 2)
            .unwrap_err();
        assert!(matches!(err, LogLineError::UnknownBackend { ref backend, .. } if backend == "c11"));
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn validate_outcome_requires_property() {
        let err = validate_log_line(&line(r#""trace_id":"a::b::1","outcome":"pass""#), 1)
            .unwrap_err();
        assert!(matches!(
            err,
            LogLineError::OrphanVerdict {
                outcome: Outcome::Pass,
                ..
            }
        ));
    }

    #[test]
    fn validate_bad_trace_ids() {
        for trace_id in ["no-separator", "a::b", "a::b::c::1", "a::b::seq", "::b::1"] {
            let err = validate_log_line(&line(&format!(r#""trace_id":"{trace_id}""#)), 1)
                .unwrap_err();
            assert!(matches!(err, LogLineError::TraceId { .. }), "{trace_id}");
        }
    }

    #[test]
    fn trace_id_must_match_suite() {
        let json = line(r#""trace_id":"bench::run-1::001","suite":"conformance""#);
        let err = validate_log_line(&json, 9).unwrap_err();
        assert!(matches!(err, LogLineError::SuiteMismatch { line: 9, .. }));
    }

    #[test]
    fn validate_invalid_json() {
        let err = validate_log_line("not json at all", 1).unwrap_err();
        assert!(matches!(err, LogLineError::Schema { .. }));
    }

    #[test]
    fn file_reports_one_error_per_bad_line() {
        let path = std::env::temp_dir().join(format!(
            "threadshim-structured-log-{}.jsonl",
            std::process::id()
        ));
        let good = line(r#""trace_id":"a::b::1""#);
        std::fs::write(&path, format!("{good}\n\nnot json\n{good}\n")).unwrap();
        let (checked, errors) = validate_log_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(checked, 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line(), 3);
    }

    #[test]
    fn emitter_generates_sequential_trace_ids() {
        let buffer = LogBuffer::default();
        let mut emitter = LogEmitter::to_buffer(buffer.clone(), "conformance", "run-42");
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "start"))
            .unwrap();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "end"))
            .unwrap();
        let contents = buffer.contents();
        let entries: Vec<_> = contents
            .lines()
            .enumerate()
            .map(|(i, line)| validate_log_line(line, i + 1).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].trace_id, "conformance::run-42::001");
        assert_eq!(entries[1].trace_id, "conformance::run-42::002");
        assert_eq!(entries[1].backend.as_deref(), Some(threadshim_core::backend_name()));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn artifact_index_serializes() {
        let path = std::env::temp_dir().join(format!(
            "threadshim-artifact-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, b"abc").unwrap();
        let mut idx = ArtifactIndex::new("run-001", "conformance");
        idx.add_file(&path, "conformance.log.jsonl", "log").unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(idx.artifacts[0].size_bytes, Some(3));
        assert_eq!(idx.artifacts[0].sha256, sha256_hex(b"abc"));
        let parsed: serde_json::Value = serde_json::from_str(&idx.to_json().unwrap()).unwrap();
        assert_eq!(parsed["index_version"], 1);
        assert_eq!(parsed["run_id"], "run-001");
        assert_eq!(parsed["artifacts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn timestamp_is_iso_like() {
        let ts = now_utc();
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }
}

//! Diagnostics records emitted by the primitives. The sink and level are
//! process-global, so these tests serialize on `TEST_GUARD`.

use std::sync::Mutex;

use threadshim_core::config::set_diag_level;
use threadshim_core::diag::{DiagSink, MemorySink, set_sink};
use threadshim_core::{DiagLevel, FileLock, TlsSlot};

static TEST_GUARD: Mutex<()> = Mutex::new(());

fn capture(level: DiagLevel) -> MemorySink {
    let sink = MemorySink::new();
    set_sink(DiagSink::Memory(sink.clone())).unwrap();
    set_diag_level(level);
    sink
}

#[test]
fn lock_file_failure_is_reported_with_errno() {
    let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let sink = capture(DiagLevel::Error);

    let path = std::env::temp_dir().join(format!("threadshim-diag-{}.lock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let held = FileLock::acquire(&path).unwrap();
    assert!(FileLock::acquire(&path).is_err());
    held.release().unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1, "{:?}", sink.lines());
    let record = &records[0];
    assert_eq!(record.level, DiagLevel::Error);
    assert_eq!(record.event, "lock_fd_failed");
    assert_eq!(record.op.as_deref(), Some("lock_fd"));
    assert_eq!(record.path.as_deref(), Some(path.display().to_string().as_str()));
    #[cfg(unix)]
    assert_eq!(record.errno, Some(libc::EEXIST));
    assert!(record.errno.is_some());
    assert_eq!(record.backend, threadshim_core::backend_name());
}

#[test]
fn empty_path_is_reported() {
    let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let sink = capture(DiagLevel::Error);

    assert!(FileLock::acquire("").is_err());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, "lock_fd_failed");
    assert!(records[0].path.is_none());
}

#[test]
fn lifecycle_events_only_at_debug() {
    let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());

    let sink = capture(DiagLevel::Error);
    TlsSlot::new().unwrap().destroy().unwrap();
    assert!(sink.lines().is_empty());

    let sink = capture(DiagLevel::Debug);
    TlsSlot::new().unwrap().destroy().unwrap();
    let events: Vec<String> = sink.records().into_iter().map(|r| r.event).collect();
    assert_eq!(events, ["tls_create", "tls_destroy"]);
    assert!(sink.records().iter().all(|r| r.level == DiagLevel::Debug));

    set_diag_level(DiagLevel::Error);
}

#[test]
fn off_suppresses_everything() {
    let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let sink = capture(DiagLevel::Off);
    assert!(FileLock::acquire("").is_err());
    assert!(sink.lines().is_empty());
    set_diag_level(DiagLevel::Error);
}

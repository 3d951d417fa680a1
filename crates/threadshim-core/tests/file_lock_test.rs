use std::path::PathBuf;
use std::sync::{Arc, Barrier};

use threadshim_core::{FileLock, SyncError};

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "threadshim-it-{}-{name}.lock",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn concurrent_acquire_yields_exactly_one_holder() {
    const CONTENDERS: usize = 8;

    let path = Arc::new(scratch("race"));
    let start = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let (path, start) = (Arc::clone(&path), Arc::clone(&start));
            std::thread::spawn(move || {
                start.wait();
                FileLock::acquire(path.as_path())
            })
        })
        .collect();

    let mut winners = Vec::new();
    for h in handles {
        match h.join().unwrap() {
            Ok(lock) => winners.push(lock),
            Err(err) => assert!(matches!(err, SyncError::AlreadyLocked { .. }), "{err}"),
        }
    }
    assert_eq!(winners.len(), 1);

    for lock in winners {
        lock.release().unwrap();
    }
    let again = FileLock::acquire(path.as_path()).unwrap();
    again.release().unwrap();
    assert!(!path.exists());
}

#[test]
fn preexisting_file_blocks_acquire() {
    let path = scratch("preexisting");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
        FileLock::acquire(&path),
        Err(SyncError::AlreadyLocked { .. })
    ));
    std::fs::remove_file(&path).unwrap();
    FileLock::acquire(&path).unwrap().release().unwrap();
}

#[test]
fn release_tolerates_vanished_file() {
    let path = scratch("vanished");
    let lock = FileLock::acquire(&path).unwrap();
    // Windows refuses to delete an open file created without sharing.
    #[cfg(unix)]
    {
        std::fs::remove_file(&path).unwrap();
    }
    lock.release().unwrap();
    assert!(!path.exists());
}

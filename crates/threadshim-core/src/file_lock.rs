//! Advisory lock files.
//!
//! A [`FileLock`] is held by whoever managed to create the lock file; a
//! second [`FileLock::acquire`] on the same path fails while it exists.
//! Releasing closes the file and removes it so the path can be locked again.
//!
//! This is not a byte-range lock. Processes that open the path without the
//! create-exclusive protocol are not stopped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::diag;
use crate::error::{Result, SyncError};

#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Creates `path` exclusively and holds it open.
    ///
    /// Every failure is also reported through the diagnostics sink.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            diag::DiagRecord::new(crate::DiagLevel::Error, "lock_fd_failed")
                .with_op("lock_fd")
                .with_message("empty lock file path")
                .emit();
            return Err(SyncError::InvalidPath);
        }

        match open_exclusive(path) {
            Ok(file) => {
                diag::lifecycle("lock_fd", "lock_fd", 0);
                Ok(Self {
                    file: Some(file),
                    path: path.to_path_buf(),
                })
            }
            Err(err) => {
                diag::io_failure("lock_fd_failed", "lock_fd", path, &err);
                if err.kind() == io::ErrorKind::AlreadyExists {
                    Err(SyncError::AlreadyLocked {
                        path: path.to_path_buf(),
                    })
                } else {
                    Err(SyncError::Io {
                        op: "open",
                        path: path.to_path_buf(),
                        source: err,
                    })
                }
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes and removes the lock file.
    pub fn release(mut self) -> Result<()> {
        self.close_and_remove()
    }

    fn close_and_remove(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        finish_release(&self.path, close(file))
    }
}

/// Removes the lock file even when closing it failed; the descriptor is gone
/// either way and a leftover file would block the path for good. A close
/// error takes precedence over a remove error.
fn finish_release(path: &Path, closed: io::Result<()>) -> Result<()> {
    let removed = match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    };
    if let Err(err) = closed {
        diag::io_failure("unlock_fd_failed", "close", path, &err);
        return Err(SyncError::Io {
            op: "close",
            path: path.to_path_buf(),
            source: err,
        });
    }
    if let Err(err) = removed {
        diag::io_failure("unlock_fd_failed", "remove", path, &err);
        return Err(SyncError::Io {
            op: "remove",
            path: path.to_path_buf(),
            source: err,
        });
    }
    diag::lifecycle("unlock_fd", "unlock_fd", 0);
    Ok(())
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.close_and_remove();
    }
}

#[cfg(unix)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o777)
        .open(path)
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .share_mode(0)
        .open(path)
}

#[cfg(not(any(unix, windows)))]
fn open_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
}

/// Closes `file`, surfacing the error that `Drop for File` would swallow.
#[cfg(unix)]
fn close(file: File) -> io::Result<()> {
    use std::os::fd::IntoRawFd;

    let fd = file.into_raw_fd();
    // SAFETY: we own `fd` and never use it again.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn close(file: File) -> io::Result<()> {
    use std::os::windows::io::IntoRawHandle;

    #[link(name = "kernel32")]
    unsafe extern "system" {
        fn CloseHandle(handle: *mut std::ffi::c_void) -> i32;
    }

    let handle = file.into_raw_handle();
    // SAFETY: we own `handle` and never use it again.
    if unsafe { CloseHandle(handle) } != 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(any(unix, windows)))]
fn close(file: File) -> io::Result<()> {
    drop(file);
    Ok(())
}

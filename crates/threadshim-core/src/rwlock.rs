//! Reader/writer lock.
//!
//! Any number of readers may hold an [`RwLock`] at once; a writer excludes
//! everyone else. A single [`RwLock::unlock`] releases whichever mode the
//! caller holds.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::diag;
use crate::error::{Result, check};
use crate::sys::{HeapCell, NativeRwLock, RawRwLock};

pub struct RwLock {
    cell: HeapCell<NativeRwLock>,
}

impl RwLock {
    pub fn new() -> Result<Self> {
        let result = HeapCell::try_new("rwlock_init", |slot| {
            // SAFETY: fresh allocation that will not move.
            unsafe { NativeRwLock::init(slot) }
        });
        diag::lifecycle(
            "rwlock_init",
            "rwlock_init",
            result.as_ref().map_or_else(|e| e.status(), |_| 0),
        );
        Ok(Self { cell: result? })
    }

    /// Blocks until a shared hold is granted.
    pub fn rdlock(&self) -> Result<()> {
        check("rwlock_rdlock", self.cell.get().read())
    }

    /// Blocks until an exclusive hold is granted.
    pub fn wrlock(&self) -> Result<()> {
        check("rwlock_wrlock", self.cell.get().write())
    }

    /// Releases the hold taken by the last [`rdlock`](Self::rdlock) or
    /// [`wrlock`](Self::wrlock) of this thread.
    ///
    /// # Safety
    ///
    /// The calling thread holds the lock and no guard owns that hold.
    pub unsafe fn unlock(&self) -> Result<()> {
        // SAFETY: forwarded from the caller.
        check("rwlock_unlock", unsafe { self.cell.get().unlock() })
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_>> {
        self.rdlock()?;
        Ok(RwLockReadGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_>> {
        self.wrlock()?;
        Ok(RwLockWriteGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Destroys the native lock and frees its allocation. A lock that is
    /// still held reports [`SyncError::Busy`](crate::SyncError::Busy) on the
    /// portable and Win32 backends.
    pub fn destroy(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again, so the cell is moved out once.
        let cell = unsafe { std::ptr::read(&this.cell) };
        // SAFETY: we own the handle, so no guard borrows it.
        let rc = unsafe { cell.get().destroy() };
        drop(cell);
        diag::lifecycle("rwlock_destroy", "rwlock_destroy", rc);
        check("rwlock_destroy", rc)
    }

    #[must_use]
    pub fn into_raw(self) -> NonNull<c_void> {
        let this = ManuallyDrop::new(self);
        // SAFETY: moved out exactly once; `this` is forgotten.
        let cell = unsafe { std::ptr::read(&this.cell) };
        cell.into_raw().cast()
    }

    /// # Safety
    ///
    /// `raw` came from [`RwLock::into_raw`] and no other owner exists.
    pub unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            cell: unsafe { HeapCell::from_raw(raw.cast()) },
        }
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        // SAFETY: no guard can outlive the borrow of `self`.
        let rc = unsafe { self.cell.get().destroy() };
        diag::lifecycle("rwlock_destroy", "rwlock_destroy", rc);
    }
}

impl std::fmt::Debug for RwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLock").finish_non_exhaustive()
    }
}

#[must_use = "the shared hold is released as soon as the guard is dropped"]
pub struct RwLockReadGuard<'a> {
    lock: &'a RwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RwLockReadGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard proves this thread holds a shared lock.
        let _ = unsafe { self.lock.cell.get().unlock() };
    }
}

#[must_use = "the exclusive hold is released as soon as the guard is dropped"]
pub struct RwLockWriteGuard<'a> {
    lock: &'a RwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RwLockWriteGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard proves this thread holds the lock exclusively.
        let _ = unsafe { self.lock.cell.get().unlock() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let l = RwLock::new().unwrap();
        let a = l.read().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| {
                let b = l.read().unwrap();
                drop(b);
            });
        });
        drop(a);
        l.destroy().unwrap();
    }

    #[test]
    fn write_then_read() {
        let l = RwLock::new().unwrap();
        drop(l.write().unwrap());
        drop(l.read().unwrap());
        drop(l.write().unwrap());
        l.destroy().unwrap();
    }

    #[test]
    fn raw_roundtrip() {
        let l = RwLock::new().unwrap();
        let l = unsafe { RwLock::from_raw(l.into_raw()) };
        l.wrlock().unwrap();
        unsafe { l.unlock().unwrap() };
        l.destroy().unwrap();
    }
}

//! Recursive mutex.
//!
//! A [`Mutex`] owns one heap-allocated native recursive mutex. The owning
//! thread may lock it again; it is released once every lock has been matched
//! by an unlock.
//!
//! ```
//! use threadshim_core::Mutex;
//!
//! let m = Mutex::new().unwrap();
//! let outer = m.lock_guard().unwrap();
//! let inner = m.lock_guard().unwrap();
//! drop(inner);
//! drop(outer);
//! m.destroy().unwrap();
//! ```

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::diag;
use crate::error::{Result, check};
use crate::sys::{HeapCell, NativeMutex, RawMutex};

pub struct Mutex {
    cell: HeapCell<NativeMutex>,
}

impl Mutex {
    /// Allocates and initializes a native recursive mutex.
    pub fn new() -> Result<Self> {
        let result = HeapCell::try_new("mutex_init", |slot| {
            // SAFETY: fresh allocation that will not move.
            unsafe { NativeMutex::init(slot) }
        });
        diag::lifecycle(
            "mutex_init",
            "mutex_init",
            result.as_ref().map_or_else(|e| e.status(), |_| 0),
        );
        Ok(Self { cell: result? })
    }

    /// Blocks until the calling thread holds the mutex.
    pub fn lock(&self) -> Result<()> {
        check("mutex_lock", self.cell.get().lock())
    }

    /// Acquires without blocking. Contention is [`SyncError::Busy`].
    ///
    /// [`SyncError::Busy`]: crate::SyncError::Busy
    pub fn try_lock(&self) -> Result<()> {
        check("mutex_trylock", self.cell.get().try_lock())
    }

    /// Releases one hold.
    ///
    /// # Safety
    ///
    /// Must pair with a successful [`lock`](Self::lock) or
    /// [`try_lock`](Self::try_lock) on this thread that has no guard. Unlocking
    /// from a thread that holds nothing reports
    /// [`SyncError::NotOwner`](crate::SyncError::NotOwner).
    pub unsafe fn unlock(&self) -> Result<()> {
        // SAFETY: forwarded from the caller.
        check("mutex_unlock", unsafe { self.cell.get().unlock() })
    }

    pub fn lock_guard(&self) -> Result<MutexGuard<'_>> {
        self.lock()?;
        Ok(MutexGuard::new(self))
    }

    pub fn try_lock_guard(&self) -> Result<MutexGuard<'_>> {
        self.try_lock()?;
        Ok(MutexGuard::new(self))
    }

    /// Destroys the native mutex and frees its allocation, reporting the
    /// native status. The allocation is freed even when destroy fails.
    pub fn destroy(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again, so the cell is moved out once.
        let cell = unsafe { std::ptr::read(&this.cell) };
        // SAFETY: we own the handle, so no guard borrows it.
        let rc = unsafe { cell.get().destroy() };
        drop(cell);
        diag::lifecycle("mutex_destroy", "mutex_destroy", rc);
        check("mutex_destroy", rc)
    }

    /// Leaks the handle into an opaque pointer for the C ABI.
    #[must_use]
    pub fn into_raw(self) -> NonNull<c_void> {
        let this = ManuallyDrop::new(self);
        // SAFETY: moved out exactly once; `this` is forgotten.
        let cell = unsafe { std::ptr::read(&this.cell) };
        cell.into_raw().cast()
    }

    /// # Safety
    ///
    /// `raw` came from [`Mutex::into_raw`] and no other owner exists.
    pub unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            cell: unsafe { HeapCell::from_raw(raw.cast()) },
        }
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // SAFETY: no guard can outlive the borrow of `self`.
        let rc = unsafe { self.cell.get().destroy() };
        diag::lifecycle("mutex_destroy", "mutex_destroy", rc);
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex").finish_non_exhaustive()
    }
}

/// Releases one hold of a [`Mutex`] when dropped. Must be dropped on the
/// thread that acquired it.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MutexGuard<'a> {
    fn new(mutex: &'a Mutex) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard proves this thread holds the mutex.
        let _ = unsafe { self.mutex.cell.get().unlock() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let m = Mutex::new().unwrap();
        {
            let _g = m.lock_guard().unwrap();
        }
        std::thread::scope(|s| {
            s.spawn(|| {
                let g = m.try_lock_guard().unwrap();
                drop(g);
            });
        });
        m.destroy().unwrap();
    }

    #[test]
    fn raw_roundtrip_keeps_mutex_usable() {
        let m = Mutex::new().unwrap();
        let raw = m.into_raw();
        let m = unsafe { Mutex::from_raw(raw) };
        m.lock().unwrap();
        unsafe { m.unlock().unwrap() };
        m.destroy().unwrap();
    }

    #[test]
    fn drop_without_destroy_is_fine() {
        let m = Mutex::new().unwrap();
        m.lock().unwrap();
        unsafe { m.unlock().unwrap() };
        drop(m);
    }
}

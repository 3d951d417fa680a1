//! Native primitive backends.
//!
//! One [`Backend`] implementation is compiled in and aliased as [`Active`]:
//!
//! - `pthread` on Unix,
//! - `win32` on Windows,
//! - `portable` (parking_lot) with the `portable` feature or on any other
//!   target.
//!
//! Backend calls report through the integer status convention of
//! [`crate::errno`]; the public handle types turn those into `Result`s.

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::ptr::{self, NonNull};

use crate::error::{Result, SyncError};

#[cfg(all(unix, not(feature = "portable")))]
mod pthread;
#[cfg(all(unix, not(feature = "portable")))]
pub(crate) use pthread::Pthreads as Active;

#[cfg(all(windows, not(feature = "portable")))]
mod win32;
#[cfg(all(windows, not(feature = "portable")))]
pub(crate) use win32::Win32 as Active;

#[cfg(any(feature = "portable", not(any(unix, windows))))]
mod portable;
#[cfg(any(feature = "portable", not(any(unix, windows))))]
pub(crate) use portable::Portable as Active;

/// Thread-exit destructor of a TLS slot.
///
/// Fiber-local storage callbacks on Windows use the `system` calling
/// convention; everywhere else destructors are plain C functions.
#[cfg(windows)]
pub type TlsDestructor = unsafe extern "system" fn(*mut c_void);
/// Thread-exit destructor of a TLS slot.
///
/// Fiber-local storage callbacks on Windows use the `system` calling
/// convention; everywhere else destructors are plain C functions.
#[cfg(not(windows))]
pub type TlsDestructor = unsafe extern "C" fn(*mut c_void);

pub(crate) const BACKEND_NAME: &str = <Active as Backend>::NAME;

pub(crate) type NativeMutex = <Active as Backend>::Mutex;
pub(crate) type NativeRwLock = <Active as Backend>::RwLock;
pub(crate) type NativeTlsKey = <Active as Backend>::TlsKey;

/// A platform's set of primitives.
pub(crate) trait Backend {
    const NAME: &'static str;

    type Mutex: RawMutex;
    type RwLock: RawRwLock;
    type TlsKey: RawTlsKey;

    fn thread_self() -> u64;
    fn process_self() -> u64;
}

/// Recursive mutex living at a fixed heap address.
pub(crate) trait RawMutex: Send + Sync {
    /// Initializes the mutex in place.
    ///
    /// # Safety
    ///
    /// `slot` is valid for writes, aligned, and never moves afterwards.
    unsafe fn init(slot: *mut Self) -> i32;

    fn lock(&self) -> i32;

    /// Never blocks; `EBUSY` when held by another thread.
    fn try_lock(&self) -> i32;

    /// # Safety
    ///
    /// The calling thread holds the mutex.
    unsafe fn unlock(&self) -> i32;

    /// # Safety
    ///
    /// No thread holds or waits on the mutex, and it is not used again.
    unsafe fn destroy(&self) -> i32;
}

/// Reader/writer lock living at a fixed heap address.
pub(crate) trait RawRwLock: Send + Sync {
    /// # Safety
    ///
    /// Same contract as [`RawMutex::init`].
    unsafe fn init(slot: *mut Self) -> i32;

    fn read(&self) -> i32;

    fn write(&self) -> i32;

    /// Releases whichever mode the calling thread holds.
    ///
    /// # Safety
    ///
    /// The calling thread holds the lock in some mode.
    unsafe fn unlock(&self) -> i32;

    /// # Safety
    ///
    /// Same contract as [`RawMutex::destroy`].
    unsafe fn destroy(&self) -> i32;
}

/// Process-wide key into per-thread storage.
pub(crate) trait RawTlsKey: Copy + Send + Sync {
    fn create(destructor: Option<TlsDestructor>) -> std::result::Result<Self, i32>;

    /// Null when the calling thread stored nothing.
    fn get(self) -> *mut c_void;

    fn set(self, value: *mut c_void) -> i32;

    fn delete(self) -> i32;

    fn to_bits(self) -> u64;

    fn from_bits(bits: u64) -> Self;
}

/// One fallible heap allocation holding a native primitive that must not
/// move once initialized.
pub(crate) struct HeapCell<T> {
    ptr: NonNull<T>,
}

// SAFETY: HeapCell is a unique owner; thread-safety follows T.
unsafe impl<T: Send> Send for HeapCell<T> {}
// SAFETY: shared access only hands out &T.
unsafe impl<T: Sync> Sync for HeapCell<T> {}

impl<T> HeapCell<T> {
    /// Allocates, then runs `init` on the uninitialized slot. A non-zero
    /// status from `init` releases the allocation before returning.
    pub(crate) fn try_new(
        what: &'static str,
        init: impl FnOnce(*mut T) -> i32,
    ) -> Result<Self> {
        let layout = Layout::new::<T>();
        let raw = if layout.size() == 0 {
            NonNull::<T>::dangling().as_ptr()
        } else {
            // SAFETY: non-zero size checked above.
            unsafe { alloc::alloc(layout) }.cast::<T>()
        };
        let Some(ptr) = NonNull::new(raw) else {
            return Err(SyncError::OutOfMemory { what });
        };

        let rc = init(raw);
        if rc != 0 {
            // SAFETY: `raw` came from `alloc` with `layout` and was never
            // initialized, so there is nothing to drop.
            unsafe { Self::dealloc(ptr) };
            return Err(SyncError::from_status(what, rc));
        }
        Ok(Self { ptr })
    }

    pub(crate) fn get(&self) -> &T {
        // SAFETY: initialized in `try_new`, freed only by `drop`.
        unsafe { self.ptr.as_ref() }
    }

    pub(crate) fn into_raw(self) -> NonNull<T> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    /// # Safety
    ///
    /// `ptr` came from [`HeapCell::into_raw`] and is not owned elsewhere.
    pub(crate) unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    unsafe fn dealloc(ptr: NonNull<T>) {
        let layout = Layout::new::<T>();
        if layout.size() != 0 {
            // SAFETY: caller passes a pointer from `alloc` with this layout.
            unsafe { alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout) };
        }
    }
}

impl<T> Drop for HeapCell<T> {
    fn drop(&mut self) {
        // SAFETY: we own an initialized T in an allocation made by `try_new`.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            Self::dealloc(self.ptr);
        }
    }
}

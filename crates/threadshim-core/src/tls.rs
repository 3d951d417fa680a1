//! Thread-local storage slots.
//!
//! A [`TlsSlot`] is created once and shared by all threads; each thread sees
//! only the value it stored itself. An optional destructor is called with a
//! thread's value when that thread exits, if the value is non-null. Deleting
//! the slot does not run destructors on the pthread and portable backends;
//! on Win32, `FlsFree` calls the destructor for every thread that still
//! holds a non-null value.

use std::ffi::c_void;
use std::mem::ManuallyDrop;

use crate::diag;
use crate::errno;
use crate::error::{Result, SyncError, check};
use crate::sys::{NativeTlsKey, RawTlsKey, TlsDestructor};

#[derive(Debug)]
pub struct TlsSlot {
    key: NativeTlsKey,
}

impl TlsSlot {
    /// Creates a slot without a destructor.
    pub fn new() -> Result<Self> {
        Self::create(None)
    }

    /// Creates a slot whose destructor runs on thread exit for every thread
    /// that left a non-null value in it.
    ///
    /// # Safety
    ///
    /// `destructor` must be sound to call with any value stored in this slot,
    /// on the exiting thread.
    pub unsafe fn with_destructor(destructor: TlsDestructor) -> Result<Self> {
        Self::create(Some(destructor))
    }

    fn create(destructor: Option<TlsDestructor>) -> Result<Self> {
        let result = NativeTlsKey::create(destructor).map_err(create_failure);
        diag::lifecycle(
            "tls_create",
            "tls_create",
            result.as_ref().map_or_else(SyncError::status, |_| 0),
        );
        Ok(Self { key: result? })
    }

    /// The calling thread's value, null when it stored nothing.
    #[must_use]
    pub fn get(&self) -> *mut c_void {
        self.key.get()
    }

    /// Stores `value` for the calling thread only.
    pub fn set(&self, value: *mut c_void) -> Result<()> {
        match self.key.set(value) {
            errno::EINVAL => Err(SyncError::InvalidSlot),
            rc => check("tls_set", rc),
        }
    }

    /// Deletes the slot.
    ///
    /// On pthread and portable builds, values still stored by other threads
    /// are left to their owners. On Win32 the destructor, if any, is called
    /// for each of them before this returns, so callers must not free those
    /// values again. Dropping the slot behaves the same way.
    pub fn destroy(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        let rc = this.key.delete();
        diag::lifecycle("tls_destroy", "tls_destroy", rc);
        match rc {
            errno::EINVAL => Err(SyncError::InvalidSlot),
            rc => check("tls_destroy", rc),
        }
    }

    /// Opaque identifier for the C ABI. The slot stays alive until
    /// [`TlsSlot::from_raw`] reclaims it.
    #[must_use]
    pub fn into_raw(self) -> u64 {
        ManuallyDrop::new(self).key.to_bits()
    }

    /// # Safety
    ///
    /// `bits` came from [`TlsSlot::into_raw`] and no other owner exists.
    pub unsafe fn from_raw(bits: u64) -> Self {
        Self {
            key: NativeTlsKey::from_bits(bits),
        }
    }
}

impl Drop for TlsSlot {
    fn drop(&mut self) {
        let rc = self.key.delete();
        diag::lifecycle("tls_destroy", "tls_destroy", rc);
    }
}

/// pthread and portable report exhaustion as `EAGAIN`; Win32 reports
/// `FLS_OUT_OF_INDEXES` as `STATUS_NO_MEMORY`.
fn create_failure(code: i32) -> SyncError {
    match code {
        errno::EAGAIN => SyncError::SlotsExhausted,
        code => SyncError::from_status("tls_create", code),
    }
}

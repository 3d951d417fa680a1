//! POSIX threads backend.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr;

use super::{Backend, RawMutex, RawRwLock, RawTlsKey, TlsDestructor};

pub(crate) struct Pthreads;

impl Backend for Pthreads {
    const NAME: &'static str = "pthread";

    type Mutex = PthreadMutex;
    type RwLock = PthreadRwLock;
    type TlsKey = PthreadKey;

    fn thread_self() -> u64 {
        // SAFETY: pthread_self has no preconditions.
        let tid = unsafe { libc::pthread_self() };
        // pthread_t is an integer on Linux and a pointer on Apple targets.
        tid as usize as u64
    }

    fn process_self() -> u64 {
        // SAFETY: getpid has no preconditions.
        let pid = unsafe { libc::getpid() };
        pid as u64
    }
}

#[repr(transparent)]
pub(crate) struct PthreadMutex(UnsafeCell<libc::pthread_mutex_t>);

// SAFETY: pthread mutexes are designed for cross-thread use at a fixed address.
unsafe impl Send for PthreadMutex {}
// SAFETY: see above.
unsafe impl Sync for PthreadMutex {}

impl RawMutex for PthreadMutex {
    unsafe fn init(slot: *mut Self) -> i32 {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: attr is local storage; slot is valid per the trait contract
        // and PthreadMutex is layout-identical to pthread_mutex_t.
        unsafe {
            let rc = libc::pthread_mutexattr_init(attr.as_mut_ptr());
            if rc != 0 {
                return rc;
            }
            let mut rc =
                libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_RECURSIVE);
            if rc == 0 {
                rc = libc::pthread_mutex_init(slot.cast::<libc::pthread_mutex_t>(), attr.as_ptr());
            }
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            rc
        }
    }

    fn lock(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { libc::pthread_mutex_lock(self.0.get()) }
    }

    fn try_lock(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { libc::pthread_mutex_trylock(self.0.get()) }
    }

    unsafe fn unlock(&self) -> i32 {
        // SAFETY: recursive mutexes report EPERM for a non-owner.
        unsafe { libc::pthread_mutex_unlock(self.0.get()) }
    }

    unsafe fn destroy(&self) -> i32 {
        // SAFETY: caller guarantees no holders or waiters.
        unsafe { libc::pthread_mutex_destroy(self.0.get()) }
    }
}

#[repr(transparent)]
pub(crate) struct PthreadRwLock(UnsafeCell<libc::pthread_rwlock_t>);

// SAFETY: pthread rwlocks are designed for cross-thread use at a fixed address.
unsafe impl Send for PthreadRwLock {}
// SAFETY: see above.
unsafe impl Sync for PthreadRwLock {}

impl RawRwLock for PthreadRwLock {
    unsafe fn init(slot: *mut Self) -> i32 {
        // SAFETY: slot is valid per the trait contract.
        unsafe { libc::pthread_rwlock_init(slot.cast::<libc::pthread_rwlock_t>(), ptr::null()) }
    }

    fn read(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { libc::pthread_rwlock_rdlock(self.0.get()) }
    }

    fn write(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { libc::pthread_rwlock_wrlock(self.0.get()) }
    }

    unsafe fn unlock(&self) -> i32 {
        // pthread_rwlock_unlock releases either mode.
        // SAFETY: caller holds the lock.
        unsafe { libc::pthread_rwlock_unlock(self.0.get()) }
    }

    unsafe fn destroy(&self) -> i32 {
        // SAFETY: caller guarantees no holders or waiters.
        unsafe { libc::pthread_rwlock_destroy(self.0.get()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PthreadKey(libc::pthread_key_t);

impl RawTlsKey for PthreadKey {
    fn create(destructor: Option<TlsDestructor>) -> Result<Self, i32> {
        let mut key = MaybeUninit::<libc::pthread_key_t>::uninit();
        // SAFETY: key is local out-storage.
        let rc = unsafe { libc::pthread_key_create(key.as_mut_ptr(), destructor) };
        if rc == 0 {
            // SAFETY: pthread_key_create initialized it on success.
            Ok(Self(unsafe { key.assume_init() }))
        } else {
            Err(rc)
        }
    }

    fn get(self) -> *mut c_void {
        // SAFETY: any key value is accepted; unknown keys read null.
        unsafe { libc::pthread_getspecific(self.0) }
    }

    fn set(self, value: *mut c_void) -> i32 {
        // SAFETY: value is stored opaquely.
        unsafe { libc::pthread_setspecific(self.0, value.cast_const()) }
    }

    fn delete(self) -> i32 {
        // SAFETY: deleting never runs destructors.
        unsafe { libc::pthread_key_delete(self.0) }
    }

    fn to_bits(self) -> u64 {
        self.0 as u64
    }

    fn from_bits(bits: u64) -> Self {
        Self(bits as libc::pthread_key_t)
    }
}

//! Win32 backend: `CRITICAL_SECTION`, `SRWLOCK` and fiber-local storage.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Backend, RawMutex, RawRwLock, RawTlsKey, TlsDestructor};
use crate::errno;

type Bool = i32;
type Dword = u32;

const FLS_OUT_OF_INDEXES: Dword = 0xFFFF_FFFF;

#[repr(C)]
struct CriticalSection {
    debug_info: *mut c_void,
    lock_count: i32,
    recursion_count: i32,
    owning_thread: *mut c_void,
    lock_semaphore: *mut c_void,
    spin_count: usize,
}

#[repr(C)]
struct SrwLock {
    ptr: *mut c_void,
}

#[link(name = "kernel32")]
unsafe extern "system" {
    fn InitializeCriticalSection(cs: *mut CriticalSection);
    fn EnterCriticalSection(cs: *mut CriticalSection);
    fn TryEnterCriticalSection(cs: *mut CriticalSection) -> Bool;
    fn LeaveCriticalSection(cs: *mut CriticalSection);
    fn DeleteCriticalSection(cs: *mut CriticalSection);

    fn InitializeSRWLock(lock: *mut SrwLock);
    fn AcquireSRWLockShared(lock: *mut SrwLock);
    fn AcquireSRWLockExclusive(lock: *mut SrwLock);
    fn TryAcquireSRWLockExclusive(lock: *mut SrwLock) -> u8;
    fn ReleaseSRWLockShared(lock: *mut SrwLock);
    fn ReleaseSRWLockExclusive(lock: *mut SrwLock);

    fn FlsAlloc(callback: Option<TlsDestructor>) -> Dword;
    fn FlsGetValue(index: Dword) -> *mut c_void;
    fn FlsSetValue(index: Dword, data: *mut c_void) -> Bool;
    fn FlsFree(index: Dword) -> Bool;

    fn GetCurrentThreadId() -> Dword;
    fn GetCurrentProcessId() -> Dword;
    fn GetLastError() -> Dword;
}

fn last_error() -> i32 {
    // SAFETY: GetLastError has no preconditions.
    let code = unsafe { GetLastError() };
    if code == 0 { errno::EINVAL } else { code as i32 }
}

pub(crate) struct Win32;

impl Backend for Win32 {
    const NAME: &'static str = "win32";

    type Mutex = Win32Mutex;
    type RwLock = Win32RwLock;
    type TlsKey = FlsKey;

    fn thread_self() -> u64 {
        // SAFETY: no preconditions.
        u64::from(unsafe { GetCurrentThreadId() })
    }

    fn process_self() -> u64 {
        // SAFETY: no preconditions.
        u64::from(unsafe { GetCurrentProcessId() })
    }
}

/// Critical sections are recursive natively.
#[repr(transparent)]
pub(crate) struct Win32Mutex(UnsafeCell<CriticalSection>);

// SAFETY: critical sections are designed for cross-thread use at a fixed address.
unsafe impl Send for Win32Mutex {}
// SAFETY: see above.
unsafe impl Sync for Win32Mutex {}

impl Win32Mutex {
    /// Id of the holding thread, null while the section is free.
    fn owner(&self) -> *mut c_void {
        // SAFETY: aligned field of an initialized section.
        unsafe { ptr::addr_of!((*self.0.get()).owning_thread).read_volatile() }
    }

    fn owned_by_current_thread(&self) -> bool {
        // SAFETY: no preconditions.
        self.owner() as usize == unsafe { GetCurrentThreadId() } as usize
    }
}

impl RawMutex for Win32Mutex {
    unsafe fn init(slot: *mut Self) -> i32 {
        // SAFETY: slot is valid per the trait contract.
        unsafe { InitializeCriticalSection(slot.cast::<CriticalSection>()) };
        errno::STATUS_OK
    }

    fn lock(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { EnterCriticalSection(self.0.get()) };
        errno::STATUS_OK
    }

    fn try_lock(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        if unsafe { TryEnterCriticalSection(self.0.get()) } != 0 {
            errno::STATUS_OK
        } else {
            errno::EBUSY
        }
    }

    unsafe fn unlock(&self) -> i32 {
        // Leaving a section we do not own is undefined; refuse instead.
        if !self.owned_by_current_thread() {
            return errno::EPERM;
        }
        // SAFETY: the calling thread owns the section.
        unsafe { LeaveCriticalSection(self.0.get()) };
        errno::STATUS_OK
    }

    unsafe fn destroy(&self) -> i32 {
        // Deleting a held section is undefined; report it like pthreads.
        if !self.owner().is_null() {
            return errno::EBUSY;
        }
        // SAFETY: nobody holds the section; the caller rules out waiters.
        unsafe { DeleteCriticalSection(self.0.get()) };
        errno::STATUS_OK
    }
}

/// SRW locks release shared and exclusive holds through different calls, so
/// the handle remembers which mode it granted last.
pub(crate) struct Win32RwLock {
    lock: UnsafeCell<SrwLock>,
    exclusive: AtomicBool,
}

// SAFETY: SRW locks are designed for cross-thread use at a fixed address.
unsafe impl Send for Win32RwLock {}
// SAFETY: see above.
unsafe impl Sync for Win32RwLock {}

impl RawRwLock for Win32RwLock {
    unsafe fn init(slot: *mut Self) -> i32 {
        // SAFETY: slot is valid for writes per the trait contract.
        unsafe {
            ptr::addr_of_mut!((*slot).exclusive).write(AtomicBool::new(false));
            InitializeSRWLock(ptr::addr_of_mut!((*slot).lock).cast::<SrwLock>());
        }
        errno::STATUS_OK
    }

    fn read(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { AcquireSRWLockShared(self.lock.get()) };
        errno::STATUS_OK
    }

    fn write(&self) -> i32 {
        // SAFETY: initialized by `init` at this address.
        unsafe { AcquireSRWLockExclusive(self.lock.get()) };
        self.exclusive.store(true, Ordering::Relaxed);
        errno::STATUS_OK
    }

    unsafe fn unlock(&self) -> i32 {
        // Only an exclusive holder can observe `true` here.
        if self.exclusive.swap(false, Ordering::Relaxed) {
            // SAFETY: the calling thread holds the lock exclusively.
            unsafe { ReleaseSRWLockExclusive(self.lock.get()) };
        } else {
            // SAFETY: the calling thread holds a shared lock.
            unsafe { ReleaseSRWLockShared(self.lock.get()) };
        }
        errno::STATUS_OK
    }

    unsafe fn destroy(&self) -> i32 {
        // SRW locks own no kernel resources; only refuse a held lock.
        // SAFETY: initialized by `init` at this address.
        if unsafe { TryAcquireSRWLockExclusive(self.lock.get()) } == 0 {
            return errno::EBUSY;
        }
        // SAFETY: acquired just above.
        unsafe { ReleaseSRWLockExclusive(self.lock.get()) };
        errno::STATUS_OK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlsKey(Dword);

impl RawTlsKey for FlsKey {
    fn create(destructor: Option<TlsDestructor>) -> Result<Self, i32> {
        // SAFETY: the callback, if any, has the FLS callback signature.
        let index = unsafe { FlsAlloc(destructor) };
        if index == FLS_OUT_OF_INDEXES {
            Err(errno::STATUS_NO_MEMORY)
        } else {
            Ok(Self(index))
        }
    }

    fn get(self) -> *mut c_void {
        // SAFETY: invalid indices read as null.
        unsafe { FlsGetValue(self.0) }
    }

    fn set(self, value: *mut c_void) -> i32 {
        // SAFETY: value is stored opaquely.
        if unsafe { FlsSetValue(self.0, value) } != 0 {
            errno::STATUS_OK
        } else {
            last_error()
        }
    }

    fn delete(self) -> i32 {
        // FlsFree calls the slot's callback for every thread and fiber that
        // still holds a non-null value before it releases the index.
        // SAFETY: the callback was registered for exactly these values.
        if unsafe { FlsFree(self.0) } != 0 {
            errno::STATUS_OK
        } else {
            last_error()
        }
    }

    fn to_bits(self) -> u64 {
        u64::from(self.0)
    }

    fn from_bits(bits: u64) -> Self {
        Self(bits as Dword)
    }
}

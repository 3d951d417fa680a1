//! Pure-Rust backend built on `parking_lot`.
//!
//! Used with the `portable` feature, and on targets that are neither Unix nor
//! Windows.
//!
//! Thread-local storage follows the POSIX key model:
//!
//! - **Key registry**: a fixed table of [`TLS_KEYS_MAX`] slots. Each slot has
//!   a generation counter (`seq`) that is odd while the slot is in use and is
//!   bumped on every create and delete, so a key kept after delete goes stale.
//! - **Per-thread values**: a heap table indexed by slot, each entry tagged
//!   with the generation it was stored under. The thread-local only holds a
//!   pointer to it, so the table stays reachable while destructors run.
//! - **Teardown**: when a thread exits, each live non-null entry is cleared
//!   and its destructor called. Destructors may read and store other slots;
//!   the sweep repeats up to [`DESTRUCTOR_ROUNDS`] times, like
//!   `PTHREAD_DESTRUCTOR_ITERATIONS`. Values still present after the last
//!   round are dropped without a destructor. Once the table is freed, `set`
//!   on that thread fails with `ENOMEM`.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::lock_api::{self, RawMutex as _, RawRwLock as _};
use parking_lot::Mutex;

use super::{Backend, RawMutex, RawRwLock, RawTlsKey, TlsDestructor};
use crate::errno;

/// Maximum number of live TLS slots.
pub(crate) const TLS_KEYS_MAX: usize = 1024;

/// Destructor sweeps at thread exit.
pub(crate) const DESTRUCTOR_ROUNDS: usize = 4;

pub(crate) struct Portable;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SELF_ID: Cell<u64> = const { Cell::new(0) };
}

impl Backend for Portable {
    const NAME: &'static str = "portable";

    type Mutex = PortableMutex;
    type RwLock = PortableRwLock;
    type TlsKey = PortableKey;

    fn thread_self() -> u64 {
        SELF_ID.with(|id| {
            let current = id.get();
            if current != 0 {
                return current;
            }
            let fresh = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            id.set(fresh);
            fresh
        })
    }

    fn process_self() -> u64 {
        u64::from(std::process::id())
    }
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

pub(crate) struct PortableMutex(
    lock_api::RawReentrantMutex<parking_lot::RawMutex, parking_lot::RawThreadId>,
);

impl RawMutex for PortableMutex {
    unsafe fn init(slot: *mut Self) -> i32 {
        // SAFETY: slot is valid for writes per the trait contract.
        unsafe { slot.write(Self(lock_api::RawReentrantMutex::INIT)) };
        errno::STATUS_OK
    }

    fn lock(&self) -> i32 {
        self.0.lock();
        errno::STATUS_OK
    }

    fn try_lock(&self) -> i32 {
        if self.0.try_lock() {
            errno::STATUS_OK
        } else {
            errno::EBUSY
        }
    }

    unsafe fn unlock(&self) -> i32 {
        if !self.0.is_owned_by_current_thread() {
            return errno::EPERM;
        }
        // SAFETY: ownership checked above.
        unsafe { self.0.unlock() };
        errno::STATUS_OK
    }

    unsafe fn destroy(&self) -> i32 {
        if self.0.is_locked() {
            errno::EBUSY
        } else {
            errno::STATUS_OK
        }
    }
}

// ---------------------------------------------------------------------------
// Read/write lock
// ---------------------------------------------------------------------------

/// `parking_lot` releases shared and exclusive holds separately, so the
/// handle records the mode of its last exclusive grant.
pub(crate) struct PortableRwLock {
    raw: parking_lot::RawRwLock,
    exclusive: AtomicBool,
}

impl RawRwLock for PortableRwLock {
    unsafe fn init(slot: *mut Self) -> i32 {
        // SAFETY: slot is valid for writes per the trait contract.
        unsafe {
            slot.write(Self {
                raw: parking_lot::RawRwLock::INIT,
                exclusive: AtomicBool::new(false),
            });
        }
        errno::STATUS_OK
    }

    fn read(&self) -> i32 {
        self.raw.lock_shared();
        errno::STATUS_OK
    }

    fn write(&self) -> i32 {
        self.raw.lock_exclusive();
        self.exclusive.store(true, Ordering::Relaxed);
        errno::STATUS_OK
    }

    unsafe fn unlock(&self) -> i32 {
        if !self.raw.is_locked() {
            return errno::EPERM;
        }
        if self.exclusive.swap(false, Ordering::Relaxed) {
            // SAFETY: the flag is only set while the caller holds the lock
            // exclusively.
            unsafe { self.raw.unlock_exclusive() };
        } else {
            // SAFETY: caller holds a shared lock.
            unsafe { self.raw.unlock_shared() };
        }
        errno::STATUS_OK
    }

    unsafe fn destroy(&self) -> i32 {
        if !self.raw.try_lock_exclusive() {
            return errno::EBUSY;
        }
        // SAFETY: acquired just above.
        unsafe { self.raw.unlock_exclusive() };
        errno::STATUS_OK
    }
}

// ---------------------------------------------------------------------------
// Thread-local storage
// ---------------------------------------------------------------------------

/// Slot generations; odd means in use.
static KEY_SEQ: [AtomicU32; TLS_KEYS_MAX] = [const { AtomicU32::new(0) }; TLS_KEYS_MAX];

/// Destructors by slot; also serializes create and delete.
static KEY_DTORS: Mutex<[Option<TlsDestructor>; TLS_KEYS_MAX]> =
    parking_lot::const_mutex([None; TLS_KEYS_MAX]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PortableKey {
    index: u32,
    seq: u32,
}

impl PortableKey {
    fn is_live(self) -> bool {
        (self.index as usize) < TLS_KEYS_MAX
            && self.seq & 1 == 1
            && KEY_SEQ[self.index as usize].load(Ordering::Acquire) == self.seq
    }
}

#[derive(Clone, Copy)]
struct Entry {
    seq: u32,
    value: *mut c_void,
}

type Table = RefCell<Vec<Option<Entry>>>;

thread_local! {
    /// Owned by [`Teardown`]; null until the first store on this thread.
    static TABLE: Cell<*const Table> = const { Cell::new(ptr::null()) };
    static TORN_DOWN: Cell<bool> = const { Cell::new(false) };
    static TEARDOWN: Teardown = const { Teardown };
}

fn with_table<R>(f: impl FnOnce(&Table) -> R) -> Option<R> {
    let table = TABLE.try_with(Cell::get).ok()?;
    if table.is_null() {
        return None;
    }
    // SAFETY: only `Teardown::drop` frees the table, and it resets the
    // pointer first; no borrow is held across a destructor call.
    Some(f(unsafe { &*table }))
}

/// The calling thread's table, allocated on first use. `None` once the
/// thread has finished its teardown.
fn table_for_store() -> Option<*const Table> {
    if TORN_DOWN.try_with(Cell::get).unwrap_or(true) {
        return None;
    }
    let current = TABLE.try_with(Cell::get).ok()?;
    if !current.is_null() {
        return Some(current);
    }
    TEARDOWN.try_with(|_| ()).ok()?;
    let fresh: *const Table = Box::into_raw(Box::new(RefCell::new(Vec::new())));
    TABLE.try_with(|t| t.set(fresh)).ok()?;
    Some(fresh)
}

/// Clears entry `index` and returns its destructor call, if one is due.
fn take_pending(table: &Table, index: usize) -> Option<(TlsDestructor, *mut c_void)> {
    let entry = table.borrow_mut().get_mut(index)?.take()?;
    if entry.value.is_null() {
        return None;
    }
    let dtors = KEY_DTORS.lock();
    if KEY_SEQ[index].load(Ordering::Acquire) != entry.seq {
        return None;
    }
    dtors[index].map(|dtor| (dtor, entry.value))
}

struct Teardown;

impl Drop for Teardown {
    fn drop(&mut self) {
        for _ in 0..DESTRUCTOR_ROUNDS {
            let len = with_table(|t| t.borrow().len()).unwrap_or(0);
            let mut ran = false;
            for index in 0..len {
                if let Some((dtor, value)) = with_table(|t| take_pending(t, index)).flatten() {
                    ran = true;
                    // SAFETY: the destructor was registered for values of this slot.
                    unsafe { dtor(value) };
                }
            }
            if !ran {
                break;
            }
        }
        let _ = TORN_DOWN.try_with(|done| done.set(true));
        if let Ok(table) = TABLE.try_with(|t| t.replace(ptr::null()))
            && !table.is_null()
        {
            // SAFETY: allocated in `table_for_store`, unreachable from now on.
            drop(unsafe { Box::from_raw(table.cast_mut()) });
        }
    }
}

impl RawTlsKey for PortableKey {
    fn create(destructor: Option<TlsDestructor>) -> Result<Self, i32> {
        let mut dtors = KEY_DTORS.lock();
        for (index, seq) in KEY_SEQ.iter().enumerate() {
            let current = seq.load(Ordering::Acquire);
            if current & 1 == 0 {
                dtors[index] = destructor;
                let next = current.wrapping_add(1);
                seq.store(next, Ordering::Release);
                return Ok(Self {
                    index: index as u32,
                    seq: next,
                });
            }
        }
        Err(errno::EAGAIN)
    }

    fn get(self) -> *mut c_void {
        if !self.is_live() {
            return ptr::null_mut();
        }
        with_table(|table| {
            table
                .borrow()
                .get(self.index as usize)
                .copied()
                .flatten()
                .filter(|entry| entry.seq == self.seq)
                .map_or(ptr::null_mut(), |entry| entry.value)
        })
        .unwrap_or(ptr::null_mut())
    }

    fn set(self, value: *mut c_void) -> i32 {
        if !self.is_live() {
            return errno::EINVAL;
        }
        let Some(table) = table_for_store() else {
            return errno::ENOMEM;
        };
        // SAFETY: just returned live by `table_for_store` on this thread.
        let mut entries = unsafe { &*table }.borrow_mut();
        let index = self.index as usize;
        if entries.len() <= index {
            entries.resize(index + 1, None);
        }
        entries[index] = Some(Entry {
            seq: self.seq,
            value,
        });
        errno::STATUS_OK
    }

    fn delete(self) -> i32 {
        let mut dtors = KEY_DTORS.lock();
        if !self.is_live() {
            return errno::EINVAL;
        }
        let index = self.index as usize;
        dtors[index] = None;
        KEY_SEQ[index].store(self.seq.wrapping_add(1), Ordering::Release);
        errno::STATUS_OK
    }

    fn to_bits(self) -> u64 {
        (u64::from(self.seq) << 32) | u64::from(self.index)
    }

    fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            seq: (bits >> 32) as u32,
        }
    }
}

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use threadshim_abi::atomic_abi::{threadshim_atomic_dec, threadshim_atomic_inc};
use threadshim_abi::compat_abi::{
    threadshim_fsync, threadshim_gethostname, threadshim_gettimeofday, threadshim_localtime_r,
};
use threadshim_abi::file_lock_abi::{threadshim_lock_fd, threadshim_unlock_fd};
use threadshim_abi::identity_abi::{threadshim_process_self, threadshim_thread_self};
use threadshim_abi::mutex_abi::{
    threadshim_mutex_destroy, threadshim_mutex_init, threadshim_mutex_lock,
    threadshim_mutex_trylock, threadshim_mutex_unlock,
};
use threadshim_abi::rwlock_abi::{
    threadshim_rwlock_destroy, threadshim_rwlock_init, threadshim_rwlock_rdlock,
    threadshim_rwlock_unlock, threadshim_rwlock_wrlock,
};
use threadshim_abi::tls_abi::{
    threadshim_tls_create, threadshim_tls_destroy, threadshim_tls_get, threadshim_tls_set,
};
use threadshim_abi::{
    ThreadshimMutex, ThreadshimRwLock, ThreadshimTimeval, ThreadshimTimezone, ThreadshimTls,
    ThreadshimTm,
};
use threadshim_core::errno;

/// Raw handles are not Send; tests move them across threads as addresses.
#[derive(Clone, Copy)]
struct Addr(usize);

#[test]
fn mutex_roundtrip_and_trylock_busy() {
    let mut m: *mut ThreadshimMutex = ptr::null_mut();
    unsafe {
        assert_eq!(threadshim_mutex_init(&mut m), 0);
        assert!(!m.is_null());
        assert_eq!(threadshim_mutex_lock(m), 0);
        // Recursive: the owner may take it again without blocking.
        assert_eq!(threadshim_mutex_trylock(m), 0);
    }

    let addr = Addr(m as usize);
    let busy = std::thread::spawn(move || unsafe {
        threadshim_mutex_trylock(addr.0 as *mut ThreadshimMutex)
    })
    .join()
    .unwrap();
    assert_eq!(busy, errno::EBUSY);

    unsafe {
        assert_eq!(threadshim_mutex_unlock(m), 0);
        assert_eq!(threadshim_mutex_unlock(m), 0);
        assert_eq!(threadshim_mutex_destroy(m), 0);
    }
}

#[test]
fn null_handles_are_einval() {
    unsafe {
        assert_eq!(threadshim_mutex_init(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_mutex_lock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_mutex_trylock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_mutex_unlock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_mutex_destroy(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_rwlock_init(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_rwlock_rdlock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_rwlock_wrlock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_rwlock_unlock(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_rwlock_destroy(ptr::null_mut()), errno::EINVAL);
        assert_eq!(threadshim_tls_create(ptr::null_mut(), None), errno::EINVAL);
        assert_eq!(threadshim_unlock_fd(ptr::null_mut()), 0);
        assert!(threadshim_lock_fd(ptr::null()).is_null());
        assert_eq!(threadshim_atomic_inc(ptr::null_mut()), 0);
    }
}

#[test]
fn rwlock_writer_excludes_reader() {
    let mut l: *mut ThreadshimRwLock = ptr::null_mut();
    unsafe {
        assert_eq!(threadshim_rwlock_init(&mut l), 0);
        assert_eq!(threadshim_rwlock_wrlock(l), 0);
    }

    let entered = Arc::new(AtomicBool::new(false));
    let addr = Addr(l as usize);
    let reader = {
        let entered = Arc::clone(&entered);
        std::thread::spawn(move || unsafe {
            let l = addr.0 as *mut ThreadshimRwLock;
            assert_eq!(threadshim_rwlock_rdlock(l), 0);
            entered.store(true, Ordering::Release);
            assert_eq!(threadshim_rwlock_unlock(l), 0);
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    assert!(
        !entered.load(Ordering::Acquire),
        "reader acquired lock while writer still held it"
    );
    unsafe { assert_eq!(threadshim_rwlock_unlock(l), 0) };
    reader.join().unwrap();
    assert!(entered.load(Ordering::Acquire));

    unsafe {
        assert_eq!(threadshim_rwlock_rdlock(l), 0);
        assert_eq!(threadshim_rwlock_rdlock(l), 0);
        assert_eq!(threadshim_rwlock_unlock(l), 0);
        assert_eq!(threadshim_rwlock_unlock(l), 0);
        assert_eq!(threadshim_rwlock_destroy(l), 0);
    }
}

static DTOR_CALLS: AtomicUsize = AtomicUsize::new(0);

#[cfg(windows)]
unsafe extern "system" fn count_dtor(_: *mut c_void) {
    DTOR_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[cfg(not(windows))]
unsafe extern "C" fn count_dtor(_: *mut c_void) {
    DTOR_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn tls_values_are_per_thread_and_destructed() {
    let mut slot = ThreadshimTls { key: 0 };
    unsafe { assert_eq!(threadshim_tls_create(&mut slot, Some(count_dtor)), 0) };

    let mut local = 5_i32;
    let p: *mut c_void = ptr::addr_of_mut!(local).cast();
    unsafe {
        assert!(threadshim_tls_get(slot).is_null());
        assert_eq!(threadshim_tls_set(slot, p), 0);
        assert_eq!(threadshim_tls_get(slot), p);
    }

    std::thread::spawn(move || unsafe {
        assert!(threadshim_tls_get(slot).is_null());
        assert_eq!(threadshim_tls_set(slot, ptr::dangling_mut::<c_void>()), 0);
    })
    .join()
    .unwrap();
    assert_eq!(DTOR_CALLS.load(Ordering::SeqCst), 1);

    unsafe {
        assert_eq!(threadshim_tls_set(slot, ptr::null_mut()), 0);
        assert_eq!(threadshim_tls_destroy(slot), 0);
    }
}

#[test]
fn atomics_return_new_value() {
    let mut v: c_int = 0;
    unsafe {
        assert_eq!(threadshim_atomic_inc(&mut v), 1);
        assert_eq!(threadshim_atomic_inc(&mut v), 2);
        assert_eq!(threadshim_atomic_dec(&mut v), 1);
        assert_eq!(threadshim_atomic_dec(&mut v), 0);
    }
    assert_eq!(v, 0);
}

#[test]
fn identity_matches_process() {
    assert_eq!(threadshim_process_self() as u64, u64::from(std::process::id()));
    let here = threadshim_thread_self();
    assert_eq!(here, threadshim_thread_self());
    let there = std::thread::scope(|s| s.spawn(|| threadshim_thread_self()).join().unwrap());
    assert_ne!(here, there);
}

#[test]
fn lock_fd_is_exclusive_until_unlocked() {
    let path = std::env::temp_dir().join(format!("threadshim-abi-{}.lock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let c_path = CString::new(path.to_str().unwrap()).unwrap();

    unsafe {
        let first = threadshim_lock_fd(c_path.as_ptr());
        assert!(!first.is_null());
        assert!(threadshim_lock_fd(c_path.as_ptr()).is_null());
        assert_eq!(threadshim_unlock_fd(first), 0);

        let again = threadshim_lock_fd(c_path.as_ptr());
        assert!(!again.is_null());
        assert_eq!(threadshim_unlock_fd(again), 0);

        let empty = CString::new("").unwrap();
        assert!(threadshim_lock_fd(empty.as_ptr()).is_null());
    }
    assert!(!path.exists());
}

#[test]
fn compat_exports() {
    let mut tv = ThreadshimTimeval::default();
    let mut tz = ThreadshimTimezone::default();
    unsafe {
        assert_eq!(threadshim_gettimeofday(&mut tv, &mut tz), 0);
        assert_eq!(threadshim_gettimeofday(ptr::null_mut(), ptr::null_mut()), 0);
    }
    assert!(tv.tv_sec > 1_577_836_800);
    assert!((0..1_000_000).contains(&tv.tv_usec));

    let mut tm = ThreadshimTm::default();
    let secs = tv.tv_sec;
    let out = unsafe { threadshim_localtime_r(&secs, &mut tm) };
    assert_eq!(out, ptr::addr_of_mut!(tm));
    assert!(tm.tm_year >= 120);
    assert!(unsafe { threadshim_localtime_r(ptr::null(), &mut tm) }.is_null());

    // The Windows CRT treats a negative descriptor as a fatal parameter error.
    #[cfg(unix)]
    assert_eq!(unsafe { threadshim_fsync(-1) }, errno::EBADF);

    let mut buf = [0 as c_char; 4];
    unsafe { assert_eq!(threadshim_gethostname(buf.as_mut_ptr(), buf.len()), 0) };
    assert_eq!(buf[3], 0, "hostname must be NUL-terminated when truncated");
    unsafe { assert_eq!(threadshim_gethostname(ptr::null_mut(), 8), errno::EINVAL) };
}

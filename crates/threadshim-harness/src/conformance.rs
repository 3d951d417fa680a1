//! Conformance runner.
//!
//! Each [`Property`] is an observable contract of one primitive, checked
//! against the backend compiled into `threadshim-core`. Results are logged to a
//! [`LogEmitter`] and collected for the report.

use std::collections::HashSet;
use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use threadshim_core::{FileLock, Mutex, RwLock, SyncError, TlsSlot, identity};

use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, Primitive};

/// Upper bound for a trylock that finds the mutex held.
pub const TRYLOCK_BUDGET: Duration = Duration::from_millis(10);

/// How long a contender is given to show it is (not) blocked.
const SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    MutexReentrant,
    MutexTrylockNonblocking,
    AtomicUniqueIncrements,
    RwlockReadersCoexist,
    RwlockWriterWaits,
    FileLockExclusive,
    TlsIsolation,
    IdentityDistinct,
    DestroyOnce,
}

impl Property {
    pub const ALL: [Property; 9] = [
        Property::MutexReentrant,
        Property::MutexTrylockNonblocking,
        Property::AtomicUniqueIncrements,
        Property::RwlockReadersCoexist,
        Property::RwlockWriterWaits,
        Property::FileLockExclusive,
        Property::TlsIsolation,
        Property::IdentityDistinct,
        Property::DestroyOnce,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Property::MutexReentrant => "mutex_reentrant",
            Property::MutexTrylockNonblocking => "mutex_trylock_nonblocking",
            Property::AtomicUniqueIncrements => "atomic_unique_increments",
            Property::RwlockReadersCoexist => "rwlock_readers_coexist",
            Property::RwlockWriterWaits => "rwlock_writer_waits",
            Property::FileLockExclusive => "file_lock_exclusive",
            Property::TlsIsolation => "tls_isolation",
            Property::IdentityDistinct => "identity_distinct",
            Property::DestroyOnce => "destroy_once",
        }
    }

    #[must_use]
    pub const fn primitive(self) -> Primitive {
        match self {
            Property::MutexReentrant | Property::MutexTrylockNonblocking => Primitive::Mutex,
            Property::AtomicUniqueIncrements => Primitive::Atomic,
            Property::RwlockReadersCoexist | Property::RwlockWriterWaits => Primitive::Rwlock,
            Property::FileLockExclusive => Primitive::FileLock,
            Property::TlsIsolation => Primitive::Tls,
            Property::IdentityDistinct => Primitive::Identity,
            Property::DestroyOnce => Primitive::Mutex,
        }
    }

    /// Parse a property by its snake_case name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

#[derive(Debug, Error)]
pub enum ConformanceFailure {
    #[error("{property}: {source}")]
    Primitive {
        property: &'static str,
        #[source]
        source: SyncError,
    },
    #[error("{property}: {message}")]
    Violation {
        property: &'static str,
        message: String,
    },
    #[error("{property}: worker thread panicked")]
    Panicked { property: &'static str },
}

impl ConformanceFailure {
    /// Status code of the failing primitive call, if that is what failed.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Primitive { source, .. } => Some(source.status()),
            _ => None,
        }
    }
}

/// Verdict for one property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyResult {
    pub property: Property,
    pub primitive: Primitive,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default)]
    pub details: serde_json::Value,
}

type Check = Result<serde_json::Value, ConformanceFailure>;

pub struct ConformanceRunner {
    threads: usize,
    scratch_dir: PathBuf,
}

impl ConformanceRunner {
    /// `threads` is clamped to at least 2; contention needs two parties.
    #[must_use]
    pub fn new(threads: usize, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            threads: threads.max(2),
            scratch_dir: scratch_dir.into(),
        }
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `properties` in order, logging one `property_result` per check.
    pub fn run(
        &self,
        properties: &[Property],
        emitter: &mut LogEmitter,
    ) -> std::io::Result<Vec<PropertyResult>> {
        let mut results = Vec::with_capacity(properties.len());
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_start").with_threads(self.threads),
        )?;
        for &property in properties {
            let result = self.run_one(property);
            let level = match result.outcome {
                Outcome::Fail => LogLevel::Error,
                _ => LogLevel::Info,
            };
            let mut entry = LogEntry::new("", level, "property_result")
                .with_property(property.primitive(), property.name())
                .with_outcome(result.outcome)
                .with_duration_ms(result.duration_ms)
                .with_threads(self.threads)
                .with_details(result.details.clone());
            if let Some(errno) = result.errno {
                entry = entry.with_errno(errno);
            }
            emitter.emit_entry(entry)?;
            results.push(result);
        }
        let failed = results
            .iter()
            .filter(|r| r.outcome == Outcome::Fail)
            .count();
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_end").with_details(serde_json::json!({
                "total": results.len(),
                "failed": failed,
            })),
        )?;
        emitter.flush()?;
        Ok(results)
    }

    #[must_use]
    pub fn run_one(&self, property: Property) -> PropertyResult {
        let start = Instant::now();
        let checked = self.check(property);
        let duration_ms = start.elapsed().as_millis() as u64;
        match checked {
            Ok(details) => PropertyResult {
                property,
                primitive: property.primitive(),
                outcome: Outcome::Pass,
                duration_ms,
                message: None,
                errno: None,
                details,
            },
            Err(failure) => PropertyResult {
                property,
                primitive: property.primitive(),
                outcome: Outcome::Fail,
                duration_ms,
                errno: failure.errno(),
                message: Some(failure.to_string()),
                details: serde_json::Value::Null,
            },
        }
    }

    fn check(&self, property: Property) -> Check {
        match property {
            Property::MutexReentrant => mutex_reentrant(),
            Property::MutexTrylockNonblocking => mutex_trylock_nonblocking(),
            Property::AtomicUniqueIncrements => atomic_unique_increments(self.threads),
            Property::RwlockReadersCoexist => rwlock_readers_coexist(self.threads),
            Property::RwlockWriterWaits => rwlock_writer_waits(),
            Property::FileLockExclusive => self.file_lock_exclusive(),
            Property::TlsIsolation => tls_isolation(),
            Property::IdentityDistinct => identity_distinct(self.threads),
            Property::DestroyOnce => self.destroy_once(),
        }
    }

    fn scratch_lock(&self, tag: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("threadshim-{tag}-{}.lock", identity::process_self()))
    }

    fn file_lock_exclusive(&self) -> Check {
        const P: &str = "file_lock_exclusive";
        let path = Arc::new(self.scratch_lock("exclusive"));
        // Leftover from an aborted run.
        let _ = std::fs::remove_file(path.as_path());

        let start = Arc::new(Barrier::new(self.threads));
        let handles: Vec<_> = (0..self.threads)
            .map(|_| {
                let (path, start) = (Arc::clone(&path), Arc::clone(&start));
                std::thread::spawn(move || {
                    start.wait();
                    FileLock::acquire(path.as_path())
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut refused = 0_usize;
        for outcome in join_all(P, handles)? {
            match outcome {
                Ok(lock) => winners.push(lock),
                Err(SyncError::AlreadyLocked { .. }) => refused += 1,
                Err(source) => return Err(primitive(P, source)),
            }
        }
        let winner_count = winners.len();
        for lock in winners {
            lock.release().map_err(|e| primitive(P, e))?;
        }
        if winner_count != 1 {
            return Err(violation(
                P,
                format!("{winner_count} of {} contenders obtained the lock", self.threads),
            ));
        }

        FileLock::acquire(path.as_path())
            .and_then(FileLock::release)
            .map_err(|e| primitive(P, e))?;
        Ok(serde_json::json!({ "contenders": self.threads, "refused": refused }))
    }

    fn destroy_once(&self) -> Check {
        const P: &str = "destroy_once";
        let err = |e| primitive(P, e);
        Mutex::new().and_then(Mutex::destroy).map_err(err)?;
        RwLock::new().and_then(RwLock::destroy).map_err(err)?;
        TlsSlot::new().and_then(TlsSlot::destroy).map_err(err)?;
        let path = self.scratch_lock("destroy");
        let _ = std::fs::remove_file(&path);
        FileLock::acquire(&path)
            .and_then(FileLock::release)
            .map_err(err)?;
        Ok(serde_json::json!({ "kinds": ["mutex", "rwlock", "tls", "file_lock"] }))
    }
}

fn primitive(property: &'static str, source: SyncError) -> ConformanceFailure {
    ConformanceFailure::Primitive { property, source }
}

fn violation(property: &'static str, message: impl Into<String>) -> ConformanceFailure {
    ConformanceFailure::Violation {
        property,
        message: message.into(),
    }
}

fn join<T>(property: &'static str, handle: JoinHandle<T>) -> Result<T, ConformanceFailure> {
    handle
        .join()
        .map_err(|_| ConformanceFailure::Panicked { property })
}

fn join_all<T>(
    property: &'static str,
    handles: Vec<JoinHandle<T>>,
) -> Result<Vec<T>, ConformanceFailure> {
    handles.into_iter().map(|h| join(property, h)).collect()
}

fn mutex_reentrant() -> Check {
    const P: &str = "mutex_reentrant";
    const DEPTH: usize = 3;

    let mutex = Arc::new(Mutex::new().map_err(|e| primitive(P, e))?);

    // Another thread's trylock: Ok(true) acquired (and released), Ok(false) busy.
    let busy_elsewhere = |mutex: &Arc<Mutex>| -> Result<bool, ConformanceFailure> {
        let m = Arc::clone(mutex);
        let result = join(
            P,
            std::thread::spawn(move || match m.try_lock_guard() {
                Ok(guard) => {
                    drop(guard);
                    Ok(true)
                }
                Err(err) if err.is_busy() => Ok(false),
                Err(err) => Err(err),
            }),
        )?;
        result.map_err(|e| primitive(P, e))
    };

    let mut holds = Vec::with_capacity(DEPTH);
    for _ in 0..DEPTH {
        holds.push(mutex.lock_guard().map_err(|e| primitive(P, e))?);
    }
    while !holds.is_empty() {
        if busy_elsewhere(&mutex)? {
            return Err(violation(
                P,
                format!(
                    "another thread acquired the mutex with {} holds outstanding",
                    holds.len()
                ),
            ));
        }
        holds.pop();
    }
    if !busy_elsewhere(&mutex)? {
        return Err(violation(P, "mutex still busy after matching unlocks"));
    }
    Ok(serde_json::json!({ "depth": DEPTH }))
}

fn mutex_trylock_nonblocking() -> Check {
    const P: &str = "mutex_trylock_nonblocking";

    let mutex = Arc::new(Mutex::new().map_err(|e| primitive(P, e))?);
    let held = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let holder = {
        let (m, held, release) = (Arc::clone(&mutex), Arc::clone(&held), Arc::clone(&release));
        std::thread::spawn(move || -> threadshim_core::Result<()> {
            let guard = m.lock_guard();
            held.wait();
            release.wait();
            drop(guard?);
            Ok(())
        })
    };

    held.wait();
    let start = Instant::now();
    let attempt = mutex.try_lock_guard().map(drop);
    let elapsed = start.elapsed();
    release.wait();
    join(P, holder)?.map_err(|e| primitive(P, e))?;

    match attempt {
        Err(err) if err.is_busy() => {}
        Err(err) => return Err(primitive(P, err)),
        Ok(()) => return Err(violation(P, "trylock acquired a mutex held by another thread")),
    }
    if elapsed >= TRYLOCK_BUDGET {
        return Err(violation(
            P,
            format!("trylock took {elapsed:?}, budget {TRYLOCK_BUDGET:?}"),
        ));
    }
    Ok(serde_json::json!({ "elapsed_us": elapsed.as_micros() as u64 }))
}

fn atomic_unique_increments(threads: usize) -> Check {
    const P: &str = "atomic_unique_increments";

    let counter = Arc::new(AtomicI32::new(0));
    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (c, start) = (Arc::clone(&counter), Arc::clone(&start));
            std::thread::spawn(move || {
                start.wait();
                threadshim_core::increment(&c)
            })
        })
        .collect();
    let observed = join_all(P, handles)?;
    let unique: HashSet<i32> = observed.iter().copied().collect();
    let final_value = counter.load(Ordering::SeqCst);

    if unique.len() != threads {
        return Err(violation(
            P,
            format!("{} distinct values from {threads} increments", unique.len()),
        ));
    }
    if final_value != threads as i32 {
        return Err(violation(
            P,
            format!("counter ended at {final_value}, expected {threads}"),
        ));
    }
    Ok(serde_json::json!({ "final": final_value }))
}

fn rwlock_readers_coexist(threads: usize) -> Check {
    const P: &str = "rwlock_readers_coexist";
    const WAIT: Duration = Duration::from_secs(1);

    let lock = Arc::new(RwLock::new().map_err(|e| primitive(P, e))?);
    let inside = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (l, inside) = (Arc::clone(&lock), Arc::clone(&inside));
            std::thread::spawn(move || -> threadshim_core::Result<usize> {
                let _guard = l.read()?;
                inside.fetch_add(1, Ordering::AcqRel);
                let deadline = Instant::now() + WAIT;
                let mut peak = inside.load(Ordering::Acquire);
                while peak < threads && Instant::now() < deadline {
                    std::thread::yield_now();
                    peak = peak.max(inside.load(Ordering::Acquire));
                }
                Ok(peak)
            })
        })
        .collect();

    let mut peak = 0;
    for seen in join_all(P, handles)? {
        peak = peak.max(seen.map_err(|e| primitive(P, e))?);
    }
    if peak != threads {
        return Err(violation(
            P,
            format!("at most {peak} of {threads} readers held the lock together"),
        ));
    }
    Ok(serde_json::json!({ "readers": threads }))
}

fn rwlock_writer_waits() -> Check {
    const P: &str = "rwlock_writer_waits";

    let lock = Arc::new(RwLock::new().map_err(|e| primitive(P, e))?);
    let entered = Arc::new(AtomicBool::new(false));

    let reader = lock.read().map_err(|e| primitive(P, e))?;
    let writer = {
        let (l, entered) = (Arc::clone(&lock), Arc::clone(&entered));
        std::thread::spawn(move || -> threadshim_core::Result<()> {
            let _guard = l.write()?;
            entered.store(true, Ordering::Release);
            Ok(())
        })
    };

    std::thread::sleep(SETTLE);
    let early = entered.load(Ordering::Acquire);
    drop(reader);
    join(P, writer)?.map_err(|e| primitive(P, e))?;

    if early {
        return Err(violation(P, "writer entered while a reader held the lock"));
    }
    if !entered.load(Ordering::Acquire) {
        return Err(violation(P, "writer never entered after the reader left"));
    }
    lock.read().map(drop).map_err(|e| primitive(P, e))?;
    lock.write().map(drop).map_err(|e| primitive(P, e))?;
    Ok(serde_json::json!({ "settle_ms": SETTLE.as_millis() as u64 }))
}

fn tls_isolation() -> Check {
    const P: &str = "tls_isolation";

    let slot = Arc::new(TlsSlot::new().map_err(|e| primitive(P, e))?);
    let mut mine = 1_u32;
    let mine_ptr = (&mut mine as *mut u32).cast::<c_void>();
    slot.set(mine_ptr).map_err(|e| primitive(P, e))?;

    let other = {
        let s = Arc::clone(&slot);
        std::thread::spawn(move || -> threadshim_core::Result<bool> {
            let saw_null = s.get().is_null();
            let mut theirs = 2_u32;
            let theirs_ptr = (&mut theirs as *mut u32).cast::<c_void>();
            s.set(theirs_ptr)?;
            let own = s.get() == theirs_ptr;
            s.set(std::ptr::null_mut())?;
            Ok(saw_null && own)
        })
    };
    let isolated = join(P, other)?.map_err(|e| primitive(P, e))?;
    let kept = slot.get() == mine_ptr;
    slot.set(std::ptr::null_mut()).map_err(|e| primitive(P, e))?;

    if !isolated {
        return Err(violation(P, "second thread observed the first thread's value"));
    }
    if !kept {
        return Err(violation(P, "first thread's value changed under it"));
    }
    Ok(serde_json::json!({ "threads": 2 }))
}

fn identity_distinct(threads: usize) -> Check {
    const P: &str = "identity_distinct";

    let main = identity::thread_self();
    // All workers stay alive until every id is collected.
    let ready = Arc::new(Barrier::new(threads + 1));
    let done = Arc::new(Barrier::new(threads + 1));
    let (tx, rx) = std::sync::mpsc::channel();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (ready, done, tx) = (Arc::clone(&ready), Arc::clone(&done), tx.clone());
            std::thread::spawn(move || {
                let _ = tx.send(identity::thread_self());
                ready.wait();
                done.wait();
            })
        })
        .collect();
    drop(tx);
    ready.wait();
    let ids: Vec<_> = rx.iter().take(threads).collect();
    done.wait();
    join_all(P, handles)?;

    let mut unique: HashSet<_> = ids.iter().copied().collect();
    unique.insert(main);
    if unique.len() != threads + 1 {
        return Err(violation(
            P,
            format!("{} distinct ids among {} live threads", unique.len(), threads + 1),
        ));
    }
    let pid = identity::process_self().as_u64();
    if pid != u64::from(std::process::id()) {
        return Err(violation(P, format!("process id {pid} disagrees with the OS")));
    }
    Ok(serde_json::json!({ "live_threads": threads + 1, "pid": pid }))
}

//! Environment (C3): owns a store handle, tracks per-thread transaction
//! counters, and opens named sub-databases.

use crate::{
    error::{Error, Result, mdbx_result},
    flags::{DatabaseFlags, EnvironmentFlags, Mode},
    registry,
    tx::{Ro, Rw, Transaction},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    ffi::CString,
    ops::RangeFrom,
    path::{Path, PathBuf},
    ptr,
    sync::Arc,
    thread::ThreadId,
};

/// Page size configuration for a fresh environment.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum PageSize {
    /// Let the engine pick the platform's native page size.
    #[default]
    Default,
    /// Request a specific page size in bytes.
    Set(usize),
}

/// Map size / growth geometry for an environment, mirroring
/// `mdbx_env_set_geometry`.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// Lower bound (and, if the range has no upper bound, the fixed size)
    /// of the memory map, in bytes.
    pub size: Option<RangeFrom<usize>>,
    pub growth_step: Option<isize>,
    pub shrink_threshold: Option<isize>,
    pub page_size: PageSize,
}

/// Per-thread live-transaction counters, used to enforce the nesting and
/// exclusivity rules described in the concurrency model: a RW transaction is
/// exclusive on its thread, a RO transaction may not begin on a thread that
/// already holds a RW transaction.
#[derive(Default)]
pub(crate) struct ThreadCounters {
    pub(crate) ro: u32,
    pub(crate) rw: u32,
}

pub(crate) struct EnvironmentInner {
    pub(crate) env: *mut ffi::MDBX_env,
    pub(crate) flags: EnvironmentFlags,
    pub(crate) path: PathBuf,
    pub(crate) counters: Mutex<HashMap<ThreadId, ThreadCounters>>,
}

// SAFETY: all access to `env` goes through the MDBX C API, which is safe to
// call from multiple threads as long as transaction/thread affinity rules
// (enforced by `counters`) are respected.
unsafe impl Send for EnvironmentInner {}
unsafe impl Sync for EnvironmentInner {}

impl Drop for EnvironmentInner {
    fn drop(&mut self) {
        // SAFETY: we hold the only strong reference (enforced by Arc + the
        // weak registry entry), so no transaction can be live.
        unsafe {
            ffi::mdbx_env_close_ex(self.env, false);
        }
    }
}

/// A handle to an opened memory-mapped key/value store.
///
/// Identity is the `(device, inode)` of the backing file; the process-wide
/// [registry](crate::registry) deduplicates opens of the same identity and
/// hands out clones of the same `Environment` rather than opening the file
/// twice. Cloning is cheap (an `Arc` bump); the underlying store is closed
/// when the last clone (and the registry's weak reference) is gone.
#[derive(Clone)]
pub struct Environment(pub(crate) Arc<EnvironmentInner>);

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").field("path", &self.0.path).finish_non_exhaustive()
    }
}

impl Environment {
    /// Starts building a new environment configuration.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    pub(crate) fn raw(&self) -> *mut ffi::MDBX_env {
        self.0.env
    }

    pub(crate) fn is_read_only_flags(&self) -> bool {
        self.0.flags.is_read_only()
    }

    pub fn is_read_only(&self) -> Result<bool> {
        Ok(self.is_read_only_flags())
    }

    pub fn is_read_write(&self) -> Result<bool> {
        Ok(!self.is_read_only_flags())
    }

    /// Begins a read-only transaction.
    ///
    /// Fails with [`Error::NestingConflict`] if the current thread already
    /// holds a read-write transaction.
    pub fn begin_ro(&self) -> Result<Transaction<Ro>> {
        Transaction::begin_root(self.clone(), true)
    }

    /// Begins a read-write transaction.
    ///
    /// Fails with [`Error::NestingConflict`] if the current thread already
    /// holds any transaction, and with [`StoreError`](crate::error::StoreError)
    /// wrapped errors if the environment itself was opened read-only.
    pub fn begin_rw(&self) -> Result<Transaction<Rw>> {
        Transaction::begin_root(self.clone(), false)
    }

    /// Flushes buffers to disk.
    ///
    /// `force` requests an fsync even if `no_sync` is in effect for this
    /// environment.
    pub fn sync(&self, force: bool) -> Result<()> {
        if self.is_read_only_flags() {
            return Err(Error::from_err_code(ffi::MDBX_EACCESS));
        }
        // SAFETY: `self.0.env` is valid for the Environment's lifetime.
        let rc = unsafe { ffi::mdbx_env_sync_ex(self.0.env, force, false) };
        mdbx_result(rc).map(|_| ())
    }

    /// Returns aggregate statistics for the unnamed (root) database.
    pub fn stat(&self) -> Result<Stat> {
        let mut stat = std::mem::MaybeUninit::<ffi::MDBX_stat>::uninit();
        // SAFETY: passing a valid env pointer and an out-param of the right size.
        let rc = unsafe {
            ffi::mdbx_env_stat_ex(
                self.0.env,
                ptr::null(),
                stat.as_mut_ptr(),
                size_of::<ffi::MDBX_stat>(),
            )
        };
        mdbx_result(rc)?;
        // SAFETY: mdbx_env_stat_ex fully initializes `stat` on success.
        Ok(Stat(unsafe { stat.assume_init() }))
    }

    /// Returns environment-wide information (geometry, reader table, mode).
    pub fn info(&self) -> Result<Info> {
        let mut info = std::mem::MaybeUninit::<ffi::MDBX_envinfo>::uninit();
        // SAFETY: passing a valid env pointer and an out-param of the right size.
        let rc = unsafe {
            ffi::mdbx_env_info_ex(
                self.0.env,
                ptr::null(),
                info.as_mut_ptr(),
                size_of::<ffi::MDBX_envinfo>(),
            )
        };
        mdbx_result(rc)?;
        // SAFETY: mdbx_env_info_ex fully initializes `info` on success.
        Ok(Info(unsafe { info.assume_init() }, self.0.flags))
    }

    /// Returns the number of pages on the environment's free list.
    ///
    /// Walks the engine's reserved free-list database (dbi 0) directly,
    /// since it isn't reachable through the named sub-database API.
    pub fn freelist(&self) -> Result<usize> {
        const FREE_DBI: ffi::MDBX_dbi = 0;

        let txn = self.begin_ro()?;
        let mut cursor: *mut ffi::MDBX_cursor = ptr::null_mut();
        // SAFETY: txn is a live read-only transaction on this environment.
        mdbx_result(unsafe { ffi::mdbx_cursor_open(txn.raw(), FREE_DBI, &mut cursor) })?;

        let mut total = 0usize;
        let mut key = ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 };
        let mut data = ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 };
        let mut op = ffi::MDBX_FIRST;
        loop {
            // SAFETY: cursor, key and data are all valid for this call.
            let rc = unsafe { ffi::mdbx_cursor_get(cursor, &mut key, &mut data, op) };
            if rc == ffi::MDBX_NOTFOUND {
                break;
            }
            mdbx_result(rc)?;
            total += data.iov_len / size_of::<u32>();
            op = ffi::MDBX_NEXT;
        }
        // SAFETY: cursor was opened above and is not used after this point.
        unsafe { ffi::mdbx_cursor_close(cursor) };
        Ok(total)
    }

    pub(crate) fn counters(&self) -> &Mutex<HashMap<ThreadId, ThreadCounters>> {
        &self.0.counters
    }

    /// Opens (creating it if necessary) a named sub-database without
    /// requiring the caller to manage a transaction.
    ///
    /// On a read-write environment this begins a fresh read-write
    /// transaction, creates/opens `name` with `flags`, and commits
    /// immediately. A read-only environment cannot create a missing
    /// database, so this only opens an already-existing one, through a
    /// throwaway read-only transaction.
    pub fn open_database(&self, name: Option<&str>, flags: DatabaseFlags) -> Result<crate::tx::Database> {
        if self.is_read_only_flags() {
            let txn = self.begin_ro()?;
            return txn.open_db(name);
        }
        let txn = self.begin_rw()?;
        let db = txn.create_db(name, flags)?;
        txn.commit()?;
        Ok(db)
    }
}

/// Builder for [`Environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    flags: EnvironmentFlags,
    geometry: Geometry,
    max_dbs: u64,
    max_readers: Option<u64>,
    mode: u32,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            flags: EnvironmentFlags::default(),
            geometry: Geometry::default(),
            max_dbs: 16,
            max_readers: None,
            mode: 0o644,
        }
    }
}

impl EnvironmentBuilder {
    pub fn set_flags(&mut self, flags: EnvironmentFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn set_geometry(&mut self, geometry: Geometry) -> &mut Self {
        self.geometry = geometry;
        self
    }

    pub fn set_max_dbs(&mut self, max_dbs: u64) -> &mut Self {
        self.max_dbs = max_dbs;
        self
    }

    pub fn set_max_readers(&mut self, max_readers: u64) -> &mut Self {
        self.max_readers = Some(max_readers);
        self
    }

    /// POSIX file mode used when creating the backing file(s).
    pub fn set_mode(&mut self, mode: u32) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Opens (or returns the already-open, shared) environment at `path`.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Environment> {
        registry::open(path.as_ref(), self.flags, &self.geometry, self.max_dbs, self.max_readers, self.mode)
    }
}

pub(crate) fn open_raw(
    path: &Path,
    flags: EnvironmentFlags,
    geometry: &Geometry,
    max_dbs: u64,
    max_readers: Option<u64>,
    mode: u32,
) -> Result<*mut ffi::MDBX_env> {
    let mut env: *mut ffi::MDBX_env = ptr::null_mut();
    // SAFETY: `env` is an out-param filled in by mdbx_env_create on success.
    mdbx_result(unsafe { ffi::mdbx_env_create(&mut env) })?;

    let geo_size = geometry.size.clone();
    let lower = geo_size.as_ref().map_or(-1isize, |r| r.start as isize);
    let page_size = match geometry.page_size {
        PageSize::Default => -1,
        PageSize::Set(sz) => sz as isize,
    };
    // SAFETY: `env` was just created and is not yet opened.
    let rc = unsafe {
        ffi::mdbx_env_set_geometry(
            env,
            lower,
            -1,
            -1,
            geometry.growth_step.unwrap_or(-1),
            geometry.shrink_threshold.unwrap_or(-1),
            page_size,
        )
    };
    if let Err(e) = mdbx_result(rc) {
        unsafe { ffi::mdbx_env_close_ex(env, false) };
        return Err(e);
    }

    // SAFETY: `env` was just created and is not yet opened.
    if let Err(e) = mdbx_result(unsafe { ffi::mdbx_env_set_maxdbs(env, max_dbs as u32) }) {
        unsafe { ffi::mdbx_env_close_ex(env, false) };
        return Err(e);
    }

    if let Some(max_readers) = max_readers {
        // SAFETY: `env` was just created and is not yet opened.
        if let Err(e) =
            mdbx_result(unsafe { ffi::mdbx_env_set_maxreaders(env, max_readers as u32) })
        {
            unsafe { ffi::mdbx_env_close_ex(env, false) };
            return Err(e);
        }
    }

    let mut open_flags = flags.make_flags().bits();
    if flags.is_read_only() {
        open_flags |= ffi::MDBX_RDONLY;
    }
    // The wrapper never exposes thread-local reader slots: RO transactions
    // must be movable between threads (see the concurrency model).
    open_flags |= ffi::MDBX_NOTLS;

    let path_c =
        CString::new(path.to_string_lossy().as_bytes()).map_err(|_| Error::FlagMismatch)?;
    // SAFETY: `env` is valid and not yet opened; `path_c` is NUL-terminated.
    let rc = unsafe { ffi::mdbx_env_open(env, path_c.as_ptr(), open_flags, mode) };
    if let Err(e) = mdbx_result(rc) {
        unsafe { ffi::mdbx_env_close_ex(env, false) };
        return Err(e);
    }

    Ok(env)
}

/// Aggregate statistics for a database, as returned by
/// [`Environment::stat`] and [`Transaction::db_stat`](crate::tx::Transaction::db_stat).
#[derive(Debug, Copy, Clone)]
pub struct Stat(pub(crate) ffi::MDBX_stat);

impl Stat {
    pub fn page_size(&self) -> u32 {
        self.0.ms_psize
    }

    pub fn depth(&self) -> u32 {
        self.0.ms_depth as u32
    }

    pub fn branch_pages(&self) -> usize {
        self.0.ms_branch_pages as usize
    }

    pub fn leaf_pages(&self) -> usize {
        self.0.ms_leaf_pages as usize
    }

    pub fn overflow_pages(&self) -> usize {
        self.0.ms_overflow_pages as usize
    }

    pub fn entries(&self) -> usize {
        self.0.ms_entries as usize
    }
}

/// Environment-wide information, as returned by [`Environment::info`].
#[derive(Debug, Copy, Clone)]
pub struct Info(pub(crate) ffi::MDBX_envinfo, pub(crate) EnvironmentFlags);

/// Map size geometry reported by [`Info::geometry`].
#[derive(Debug, Copy, Clone)]
pub struct InfoGeometry {
    min: u64,
    max: u64,
    current: u64,
}

impl InfoGeometry {
    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn current(&self) -> u64 {
        self.current
    }
}

impl Info {
    pub fn geometry(&self) -> InfoGeometry {
        InfoGeometry {
            min: self.0.mi_geo.lower,
            max: self.0.mi_geo.upper,
            current: self.0.mi_geo.current,
        }
    }

    pub fn num_readers(&self) -> u32 {
        self.0.mi_numreaders
    }

    pub fn max_readers(&self) -> u32 {
        self.0.mi_maxreaders
    }

    pub fn last_pgno(&self) -> u64 {
        self.0.mi_last_pgno
    }

    pub fn mode(&self) -> Mode {
        self.1.mode
    }
}

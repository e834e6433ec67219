//! Transactions (C4): scoped units of work enforcing nesting, threading and
//! commit/abort invariants.

use crate::{
    Environment,
    env::ThreadCounters,
    error::{Error, Result, mdbx_result},
    flags::{DatabaseFlags, WriteFlags},
    tx::{
        Cursor, Database,
        kind::{Ro, Rw, TransactionKind},
    },
    value::{Encode, Value},
};
use std::{
    borrow::Cow,
    cell::Cell,
    ffi::CString,
    marker::PhantomData,
    ptr,
    rc::Rc,
    thread,
};

/// A scoped unit of work against an [`Environment`].
///
/// `K` is [`Ro`] or [`Rw`]; write operations (`put`, `del`, `clear_db`,
/// `begin_rw_child`, ...) are only defined for `Transaction<Rw>`.
///
/// A transaction must end by exactly one of `commit`, `abort`, or being
/// dropped; dropping a never-finalized read-write transaction aborts it.
/// Reading this transaction's data through a previously obtained [`Cursor`]
/// after it ends returns [`Error::Invalidated`] rather than touching freed
/// engine state.
pub struct Transaction<K: TransactionKind> {
    pub(crate) txn: *mut ffi::MDBX_txn,
    env: Environment,
    /// `false` only for the "read-only view into a live RW parent" created
    /// by [`Transaction::begin_ro_child`]; such a view does not own a
    /// distinct engine transaction and must not commit/abort it.
    owns_raw: bool,
    /// Whether this transaction was constructed as a nested child (exempts
    /// it from the per-thread counter bookkeeping on drop).
    is_child: bool,
    /// Set on the *parent* when this one's own `begin_rw_child`/
    /// `begin_ro_child` hands out a child, and cleared again when that
    /// child ends, so a later call can hand out a new one.
    has_child: Rc<Cell<bool>>,
    /// Shared with the parent for a `begin_ro_child` view (dropping or
    /// finalizing the view must not poison the parent's own flag); owned
    /// independently everywhere else.
    parents_has_child: Option<Rc<Cell<bool>>>,
    done: Cell<bool>,
    pub(crate) invalidated: Rc<Cell<bool>>,
    _kind: PhantomData<K>,
}

impl<K: TransactionKind> std::fmt::Debug for Transaction<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("read_only", &K::IS_READ_ONLY)
            .field("done", &self.done.get())
            .finish_non_exhaustive()
    }
}

// SAFETY: a read-only transaction is opened with MDBX_NOTLS, which makes it
// legal to use from a thread other than the one that began it, as long as
// it is used from one thread at a time (it is not `Sync`).
unsafe impl Send for Transaction<Ro> {}

fn adjust_counters(env: &Environment, read_only: bool, delta: i32) {
    let mut guard = env.counters().lock();
    let entry = guard.entry(thread::current().id()).or_insert_with(ThreadCounters::default);
    let counter = if read_only { &mut entry.ro } else { &mut entry.rw };
    *counter = (*counter as i32 + delta).max(0) as u32;
}

impl<K: TransactionKind> Transaction<K> {
    pub(crate) fn begin_root(env: Environment, read_only: bool) -> Result<Transaction<K>> {
        {
            let guard = env.counters().lock();
            if let Some(counters) = guard.get(&thread::current().id())
                && (counters.rw > 0 || (!read_only && counters.ro > 0))
            {
                drop(guard);
                return Err(Error::NestingConflict(
                    "thread already holds a transaction incompatible with a new root transaction",
                ));
            }
        }

        let mut txn: *mut ffi::MDBX_txn = ptr::null_mut();
        // SAFETY: env.raw() is valid for the environment's lifetime; `txn`
        // is an out-param filled on success.
        let rc = unsafe {
            ffi::mdbx_txn_begin_ex(env.raw(), ptr::null_mut(), K::OPEN_FLAGS, &mut txn, ptr::null_mut())
        };
        mdbx_result(rc)?;

        adjust_counters(&env, read_only, 1);
        tracing::trace!(read_only, "began transaction");

        Ok(Transaction {
            txn,
            env,
            owns_raw: true,
            is_child: false,
            has_child: Rc::new(Cell::new(false)),
            parents_has_child: None,
            done: Cell::new(false),
            invalidated: Rc::new(Cell::new(false)),
            _kind: PhantomData,
        })
    }

    pub(crate) const fn raw(&self) -> *mut ffi::MDBX_txn {
        self.txn
    }

    fn check_live(&self) -> Result<()> {
        if self.done.get() { Err(Error::Invalidated) } else { Ok(()) }
    }

    /// Opens an existing named sub-database (or the unnamed database if
    /// `name` is `None`). Fails with `NotFound`-flavored
    /// [`StoreError`](crate::error::StoreError) if it doesn't already exist
    /// and `CREATE` was not requested.
    pub fn open_db(&self, name: Option<&str>) -> Result<Database> {
        self.open_db_with_flags(name, DatabaseFlags::empty())
    }

    fn open_db_with_flags(&self, name: Option<&str>, flags: DatabaseFlags) -> Result<Database> {
        self.check_live()?;
        let name_c = name.map(|n| CString::new(n).expect("db name must not contain NUL"));
        let name_ptr = name_c.as_ref().map_or(ptr::null(), |c| c.as_ptr());
        let mut dbi: ffi::MDBX_dbi = 0;
        // SAFETY: self.txn is live; name_ptr is either null or a valid
        // NUL-terminated string kept alive for the duration of the call.
        let rc = unsafe { ffi::mdbx_dbi_open(self.txn, name_ptr, flags.bits(), &mut dbi) };
        mdbx_result(rc)?;
        Ok(Database::new(dbi))
    }

    /// Creates a named sub-database if it does not already exist.
    pub fn create_db(&self, name: Option<&str>, flags: DatabaseFlags) -> Result<Database> {
        self.open_db_with_flags(name, flags | DatabaseFlags::CREATE)
    }

    /// Point lookup. Returns `Ok(None)` rather than an error when the key
    /// is absent, per the `NotFound`-as-sentinel propagation policy.
    pub fn get(&self, db: &Database, key: impl Encode) -> Result<Option<Value<'_>>> {
        self.check_live()?;
        let key_bytes = key.encode();
        let mut key_val =
            ffi::MDBX_val { iov_base: key_bytes.as_ptr() as *mut _, iov_len: key_bytes.len() };
        let mut data_val = ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 };
        // SAFETY: self.txn is live; key_val borrows key_bytes, which
        // outlives this call.
        let rc = unsafe { ffi::mdbx_get(self.txn, db.dbi(), &mut key_val, &mut data_val) };
        if rc == ffi::MDBX_NOTFOUND {
            return Ok(None);
        }
        mdbx_result(rc)?;
        // SAFETY: on success, data_val points into the environment's memory
        // map for the lifetime of this transaction.
        let slice = unsafe {
            std::slice::from_raw_parts(data_val.iov_base as *const u8, data_val.iov_len)
        };
        Ok(Some(Value::new(Cow::Borrowed(slice))))
    }

    /// Returns aggregate statistics for `db`.
    pub fn db_stat(&self, db: &Database) -> Result<crate::env::Stat> {
        self.check_live()?;
        let mut stat = std::mem::MaybeUninit::<ffi::MDBX_stat>::uninit();
        // SAFETY: self.txn is live and db.dbi() was opened on it (or an
        // ancestor), per this type's invariants.
        let rc = unsafe {
            ffi::mdbx_dbi_stat(self.txn, db.dbi(), stat.as_mut_ptr(), size_of::<ffi::MDBX_stat>())
        };
        mdbx_result(rc)?;
        // SAFETY: mdbx_dbi_stat fully initializes `stat` on success.
        Ok(crate::env::Stat(unsafe { stat.assume_init() }))
    }

    /// Opens a cursor over `db` bound to this transaction.
    pub fn cursor<'tx>(&'tx self, db: Database) -> Result<Cursor<'tx, K>> {
        self.check_live()?;
        Cursor::open(self, db)
    }
}

impl<K: TransactionKind> Drop for Transaction<K> {
    fn drop(&mut self) {
        if !self.done.get() {
            if self.owns_raw {
                self.invalidated.set(true);
                if K::IS_READ_ONLY {
                    // A still-live RO transaction commits on drop: this is
                    // documented to behave better than abort for
                    // handle-allocation transactions opened read-only.
                    // SAFETY: exclusive ownership of a live transaction pointer.
                    unsafe {
                        ffi::mdbx_txn_commit_ex(self.txn, ptr::null_mut());
                    }
                } else {
                    // SAFETY: exclusive ownership of a live transaction pointer.
                    unsafe {
                        ffi::mdbx_txn_abort(self.txn);
                    }
                }
            }
            if !self.is_child {
                adjust_counters(&self.env, K::IS_READ_ONLY, -1);
            }
            self.done.set(true);
        }
        // Whether finalized just now or earlier by commit()/abort(), let a
        // waiting parent hand out a new child.
        if let Some(flag) = &self.parents_has_child {
            flag.set(false);
        }
    }
}

impl Transaction<Ro> {
    /// Releases the reader slot without destroying the transaction object,
    /// then must be followed by [`Self::renew`] before further use.
    ///
    /// Frees this thread's per-thread reader slot just as dropping the
    /// transaction would, so a subsequent `begin_rw`/`begin_ro` on the same
    /// thread is not rejected as a nesting conflict while this handle sits
    /// reset.
    pub fn reset(&self) -> Result<()> {
        self.check_live()?;
        // SAFETY: self.txn is a live read-only transaction.
        unsafe { ffi::mdbx_txn_reset(self.txn) };
        if !self.is_child {
            adjust_counters(&self.env, true, -1);
        }
        Ok(())
    }

    /// Re-acquires a reader slot for a transaction previously released with
    /// [`Self::reset`], taking a fresh MVCC snapshot without reallocating
    /// the transaction object.
    pub fn renew(&self) -> Result<()> {
        self.check_live()?;
        // SAFETY: self.txn was previously reset (or is fresh, in which case
        // this is a documented no-op success).
        let rc = unsafe { ffi::mdbx_txn_renew(self.txn) };
        mdbx_result(rc)?;
        if !self.is_child {
            adjust_counters(&self.env, true, 1);
        }
        Ok(())
    }
}

impl Transaction<Rw> {
    /// Writes `(key, value)`. `flags` controls overwrite/duplicate/append
    /// behavior; see [`WriteFlags`].
    pub fn put(
        &self,
        db: &Database,
        key: impl Encode,
        value: impl Encode,
        flags: WriteFlags,
    ) -> Result<()> {
        self.check_live()?;
        let key_bytes = key.encode();
        let value_bytes = value.encode();
        let mut key_val =
            ffi::MDBX_val { iov_base: key_bytes.as_ptr() as *mut _, iov_len: key_bytes.len() };
        let mut data_val = ffi::MDBX_val {
            iov_base: value_bytes.as_ptr() as *mut _,
            iov_len: value_bytes.len(),
        };
        // SAFETY: self.txn is live and exclusively ours; key_val/data_val
        // borrow byte slices kept alive for the call.
        let rc =
            unsafe { ffi::mdbx_put(self.txn, db.dbi(), &mut key_val, &mut data_val, flags.bits()) };
        mdbx_result(rc).map(|_| ())
    }

    /// Deletes `key` (and, for `DUP_SORT` databases with `value` supplied,
    /// only the matching duplicate). Returns `Ok(false)` rather than an
    /// error when nothing matched.
    pub fn del(&self, db: &Database, key: impl Encode, value: Option<&[u8]>) -> Result<bool> {
        self.check_live()?;
        let key_bytes = key.encode();
        let mut key_val =
            ffi::MDBX_val { iov_base: key_bytes.as_ptr() as *mut _, iov_len: key_bytes.len() };
        let mut data_val = value.map(|v| ffi::MDBX_val {
            iov_base: v.as_ptr() as *mut _,
            iov_len: v.len(),
        });
        let data_ptr =
            data_val.as_mut().map_or(ptr::null_mut(), |v| v as *mut ffi::MDBX_val);
        // SAFETY: self.txn is live and exclusively ours.
        let rc = unsafe { ffi::mdbx_del(self.txn, db.dbi(), &mut key_val, data_ptr) };
        if rc == ffi::MDBX_NOTFOUND {
            return Ok(false);
        }
        mdbx_result(rc).map(|_| true)
    }

    /// Removes every entry from `db`, leaving the (still-open) handle
    /// itself intact.
    pub fn clear_db(&self, db: &Database) -> Result<()> {
        self.check_live()?;
        // SAFETY: self.txn is live and exclusively ours; `del = false`
        // clears the database rather than dropping the handle.
        let rc = unsafe { ffi::mdbx_drop(self.txn, db.dbi(), false) };
        mdbx_result(rc).map(|_| ())
    }

    /// Opens a single nested read-write sub-transaction. Nesting is linear:
    /// a second call fails with [`Error::NestingConflict`] while the first
    /// child is still live. The child's commit merges its writes into this
    /// transaction; dropping it without committing discards them.
    pub fn begin_rw_child(&self) -> Result<Transaction<Rw>> {
        self.check_live()?;
        if self.has_child.get() {
            return Err(Error::NestingConflict("a child transaction is already live"));
        }
        let mut txn: *mut ffi::MDBX_txn = ptr::null_mut();
        // SAFETY: self.txn is a live write transaction, valid as a parent.
        let rc = unsafe {
            ffi::mdbx_txn_begin_ex(
                self.env_raw(),
                self.txn,
                ffi::MDBX_TXN_READWRITE,
                &mut txn,
                ptr::null_mut(),
            )
        };
        mdbx_result(rc)?;
        self.has_child.set(true);
        Ok(Transaction {
            txn,
            env: self.env.clone(),
            owns_raw: true,
            is_child: true,
            has_child: Rc::new(Cell::new(false)),
            parents_has_child: Some(Rc::clone(&self.has_child)),
            done: Cell::new(false),
            invalidated: Rc::new(Cell::new(false)),
            _kind: PhantomData,
        })
    }

    /// Returns a read-only view of this transaction: since a write
    /// transaction already observes its own uncommitted writes, this does
    /// not open a distinct engine transaction, it simply restricts this
    /// handle to read-only operations until dropped.
    pub fn begin_ro_child(&self) -> Result<Transaction<Ro>> {
        self.check_live()?;
        if self.has_child.get() {
            return Err(Error::NestingConflict("a child transaction is already live"));
        }
        self.has_child.set(true);
        Ok(Transaction {
            txn: self.txn,
            env: self.env.clone(),
            owns_raw: false,
            is_child: true,
            has_child: Rc::new(Cell::new(false)),
            parents_has_child: Some(Rc::clone(&self.has_child)),
            done: Cell::new(false),
            invalidated: Rc::clone(&self.invalidated),
            _kind: PhantomData,
        })
    }

    fn env_raw(&self) -> *mut ffi::MDBX_env {
        self.env.raw()
    }

    /// Commits the transaction. For a nested child, this merges its writes
    /// into the parent rather than making them globally visible.
    ///
    /// Takes `&self` rather than consuming the handle so a [`Cursor`]
    /// borrowed from this transaction can still be named (and observed to
    /// become [`Error::Invalidated`]) afterward; `done` makes a second call
    /// a no-op error rather than a double commit.
    pub fn commit(&self) -> Result<()> {
        self.check_live()?;
        self.invalidated.set(true);
        let mut latency = std::mem::MaybeUninit::<ffi::MDBX_commit_latency>::zeroed();
        // SAFETY: self.txn is live and exclusively ours.
        let rc = unsafe { ffi::mdbx_txn_commit_ex(self.txn, latency.as_mut_ptr()) };
        if !self.is_child {
            adjust_counters(&self.env, false, -1);
        }
        self.done.set(true);
        // Since this no longer consumes `self`, the handle may still be
        // alive (and a sibling child requested) well before its own `Drop`
        // runs; release the parent's slot for a next child right away
        // instead of waiting for that.
        if let Some(flag) = &self.parents_has_child {
            flag.set(false);
        }
        tracing::trace!("committed transaction");
        mdbx_result(rc).map(|_| ())
    }

    /// Aborts the transaction, discarding its writes (and, for a nested
    /// child, leaving the parent's prior state untouched).
    pub fn abort(&self) -> Result<()> {
        self.check_live()?;
        self.invalidated.set(true);
        // SAFETY: self.txn is live and exclusively ours.
        unsafe { ffi::mdbx_txn_abort(self.txn) };
        if !self.is_child {
            adjust_counters(&self.env, false, -1);
        }
        self.done.set(true);
        if let Some(flag) = &self.parents_has_child {
            flag.set(false);
        }
        Ok(())
    }

    /// Returns a read-only view of this transaction: any [`Cursor`]s
    /// previously opened against it are invalidated, per the documented
    /// behavior of converting a write handle for read-only iteration (see
    /// the crate's design notes on this open question).
    ///
    /// Takes `&self` and hands back a [`Transaction<Ro>`] sharing this
    /// handle's raw pointer, the same non-owning-view mechanism
    /// [`Self::begin_ro_child`] uses, rather than consuming `self`. This
    /// transaction stays live (and still the pointer's sole owner for
    /// commit/abort/drop purposes) alongside the returned read-only view.
    pub fn into_ro(&self) -> Result<Transaction<Ro>> {
        self.check_live()?;
        self.invalidated.set(true);
        Ok(Transaction {
            txn: self.txn,
            env: self.env.clone(),
            owns_raw: false,
            is_child: true,
            has_child: Rc::new(Cell::new(false)),
            parents_has_child: None,
            done: Cell::new(false),
            invalidated: Rc::new(Cell::new(false)),
            _kind: PhantomData,
        })
    }
}

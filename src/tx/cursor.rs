//! Cursors (C5): ordered positional iteration over a single database.

use crate::{
    error::{Error, Result, mdbx_result},
    flags::WriteFlags,
    tx::{Database, Transaction, kind::{Rw, TransactionKind}},
    value::{Encode, Value},
};
use std::{borrow::Cow, cell::Cell, marker::PhantomData, ptr, rc::Rc};

/// A cursor positioned within a database, bound to the transaction that
/// opened it.
///
/// Every operation first checks the shared invalidation flag of the owning
/// transaction: once that transaction commits, aborts, or (for a read-write
/// handle) converts to read-only, every cursor opened against it returns
/// [`Error::Invalidated`] instead of touching freed engine state.
pub struct Cursor<'tx, K: TransactionKind> {
    cursor: *mut ffi::MDBX_cursor,
    invalidated: Rc<Cell<bool>>,
    closed: Cell<bool>,
    _marker: PhantomData<(&'tx Transaction<K>, K)>,
}

unsafe impl<K: TransactionKind> Send for Cursor<'_, K> where Transaction<K>: Send {}

impl<'tx, K: TransactionKind> Cursor<'tx, K> {
    pub(crate) fn open(txn: &'tx Transaction<K>, db: Database) -> Result<Self> {
        let mut cursor: *mut ffi::MDBX_cursor = ptr::null_mut();
        // SAFETY: txn.raw() is a live transaction; db was opened against it
        // or an ancestor.
        let rc = unsafe { ffi::mdbx_cursor_open(txn.raw(), db.dbi(), &mut cursor) };
        mdbx_result(rc)?;
        Ok(Self {
            cursor,
            invalidated: Rc::clone(&txn.invalidated),
            closed: Cell::new(false),
            _marker: PhantomData,
        })
    }

    fn check_live(&self) -> Result<()> {
        if self.closed.get() || self.invalidated.get() { Err(Error::Invalidated) } else { Ok(()) }
    }

    /// Explicitly closes the cursor, releasing the engine handle before the
    /// owning transaction ends. Idempotent; a closed cursor behaves as
    /// invalidated for any further operation.
    pub fn close(&self) {
        if !self.closed.get() && !self.invalidated.get() {
            // SAFETY: self.cursor was opened by `open` and not yet closed;
            // invalidated being false means the owning transaction is still
            // live, so self.cursor hasn't already been freed along with it.
            unsafe { ffi::mdbx_cursor_close(self.cursor) };
        }
        self.closed.set(true);
    }

    fn position(
        &self,
        op: ffi::MDBX_cursor_op,
        key: Option<&[u8]>,
    ) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.check_live()?;
        let (mut key_val, mut data_val) = match key {
            Some(k) => (
                ffi::MDBX_val { iov_base: k.as_ptr() as *mut _, iov_len: k.len() },
                ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 },
            ),
            None => (
                ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 },
                ffi::MDBX_val { iov_base: ptr::null_mut(), iov_len: 0 },
            ),
        };
        // SAFETY: self.cursor is live; key_val optionally borrows `key`,
        // which outlives this call.
        let rc = unsafe { ffi::mdbx_cursor_get(self.cursor, &mut key_val, &mut data_val, op) };
        if rc == ffi::MDBX_NOTFOUND {
            return Ok(None);
        }
        mdbx_result(rc)?;
        // SAFETY: on success both vals point into the environment's memory
        // map for the lifetime of the owning transaction, which outlives
        // 'tx by construction.
        let key_slice = unsafe {
            std::slice::from_raw_parts(key_val.iov_base as *const u8, key_val.iov_len)
        };
        let data_slice = unsafe {
            std::slice::from_raw_parts(data_val.iov_base as *const u8, data_val.iov_len)
        };
        Ok(Some((Value::new(Cow::Borrowed(key_slice)), Value::new(Cow::Borrowed(data_slice)))))
    }

    /// Moves to the first entry in the database.
    pub fn first(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_FIRST, None)
    }

    /// Moves to the last entry in the database.
    pub fn last(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_LAST, None)
    }

    /// Moves to the next entry.
    pub fn next(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_NEXT, None)
    }

    /// Moves to the previous entry.
    pub fn prev(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_PREV, None)
    }

    /// Moves to the next duplicate of the current key (`DUP_SORT` only).
    pub fn next_dup(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_NEXT_DUP, None)
    }

    /// Moves to the previous duplicate of the current key (`DUP_SORT` only).
    pub fn prev_dup(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_PREV_DUP, None)
    }

    /// Moves to the first entry of the next distinct key (`DUP_SORT` only).
    pub fn next_nodup(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_NEXT_NODUP, None)
    }

    /// Moves to the entry whose key exactly matches `key`.
    pub fn find(&self, key: impl Encode) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        let key_bytes = key.encode();
        self.position(ffi::MDBX_SET_KEY, Some(&key_bytes))
    }

    /// Moves to the first entry whose key is greater than or equal to `key`.
    pub fn lower_bound(&self, key: impl Encode) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        let key_bytes = key.encode();
        self.position(ffi::MDBX_SET_RANGE, Some(&key_bytes))
    }

    /// Returns the entry at the cursor's current position without moving
    /// it.
    pub fn get_current(&self) -> Result<Option<(Value<'tx>, Value<'tx>)>> {
        self.position(ffi::MDBX_GET_CURRENT, None)
    }
}

impl<'tx, K: TransactionKind> Drop for Cursor<'tx, K> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<'tx> Cursor<'tx, Rw> {
    /// Writes `(key, value)` at the cursor's position, per `flags`.
    pub fn put(&self, key: impl Encode, value: impl Encode, flags: WriteFlags) -> Result<()> {
        self.check_live()?;
        let key_bytes = key.encode();
        let value_bytes = value.encode();
        let mut key_val =
            ffi::MDBX_val { iov_base: key_bytes.as_ptr() as *mut _, iov_len: key_bytes.len() };
        let mut data_val = ffi::MDBX_val {
            iov_base: value_bytes.as_ptr() as *mut _,
            iov_len: value_bytes.len(),
        };
        // SAFETY: self.cursor is live and exclusively ours.
        let rc = unsafe { ffi::mdbx_cursor_put(self.cursor, &mut key_val, &mut data_val, flags.bits()) };
        mdbx_result(rc).map(|_| ())
    }

    /// Deletes the entry at the cursor's current position. `flags` may
    /// request deleting every duplicate of the current key.
    pub fn del(&self, flags: WriteFlags) -> Result<()> {
        self.check_live()?;
        // SAFETY: self.cursor is live and exclusively ours.
        let rc = unsafe { ffi::mdbx_cursor_del(self.cursor, flags.bits()) };
        mdbx_result(rc).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use crate::{flags::WriteFlags, Environment};

    #[test]
    fn forward_scan_matches_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let txn = env.begin_rw().unwrap();
        let db = txn.create_db(None, Default::default()).unwrap();
        for i in 0u32..5 {
            txn.put(&db, i.to_ne_bytes(), i.to_ne_bytes(), WriteFlags::empty()).unwrap();
        }
        let cursor = txn.cursor(db).unwrap();
        let mut seen = Vec::new();
        let mut entry = cursor.first().unwrap();
        while let Some((k, _)) = entry {
            seen.push(k.as_scalar::<u32>().unwrap());
            entry = cursor.next().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cursor_invalidated_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::builder().open(dir.path()).unwrap();
        let txn = env.begin_rw().unwrap();
        let db = txn.create_db(None, Default::default()).unwrap();
        let cursor = txn.cursor(db).unwrap();
        txn.commit().unwrap();
        assert!(cursor.first().is_err());
    }
}

//! Typed, multi-indexed record container (C7).

use crate::{
    codec::Codec,
    error::{Error, Result},
    flags::{DatabaseFlags, WriteFlags},
    tx::{Cursor, Database, Transaction, TransactionKind, Rw},
    typed::index::IndexDescriptor,
};
use std::marker::PhantomData;

const INDEX_ARITY: usize = 4;

/// A record store persisted to a [`Transaction`]: records are serialized
/// under an auto-assigned `u32` primary key, and up to four secondary
/// indexes (declared by `I0..I3`) are kept consistent with the primary
/// table across every mutating operation.
///
/// Unused index slots default to [`NullIndex`](crate::typed::NullIndex) and
/// never open a sub-database.
pub struct TypedContainer<
    K: TransactionKind,
    R,
    C,
    I0 = crate::typed::NullIndex,
    I1 = crate::typed::NullIndex,
    I2 = crate::typed::NullIndex,
    I3 = crate::typed::NullIndex,
> {
    txn: Transaction<K>,
    primary: Database,
    indexes: [Option<Database>; INDEX_ARITY],
    _marker: PhantomData<(R, C, I0, I1, I2, I3)>,
}

impl<K, R, C, I0, I1, I2, I3> TypedContainer<K, R, C, I0, I1, I2, I3>
where
    K: TransactionKind,
    C: Codec<R>,
    I0: IndexDescriptor<R>,
    I1: IndexDescriptor<R>,
    I2: IndexDescriptor<R>,
    I3: IndexDescriptor<R>,
{
    /// Opens the primary database `name` (integer-keyed) and one
    /// sub-database `<name>_<i>` per non-null index, all with `CREATE`.
    pub fn open(txn: Transaction<K>, name: &str) -> Result<Self> {
        let primary = txn.create_db(Some(name), DatabaseFlags::INTEGER_KEY)?;
        let indexes = [
            Self::open_index::<I0>(&txn, name, 0)?,
            Self::open_index::<I1>(&txn, name, 1)?,
            Self::open_index::<I2>(&txn, name, 2)?,
            Self::open_index::<I3>(&txn, name, 3)?,
        ];
        Ok(Self { txn, primary, indexes, _marker: PhantomData })
    }

    fn open_index<I: IndexDescriptor<R>>(
        txn: &Transaction<K>,
        name: &str,
        i: usize,
    ) -> Result<Option<Database>> {
        if I::IS_NULL {
            return Ok(None);
        }
        let db_name = format!("{name}_{i}");
        let db =
            txn.create_db(Some(&db_name), DatabaseFlags::DUP_SORT | DatabaseFlags::DUP_FIXED)?;
        Ok(Some(db))
    }

    fn project(i: usize, record: &R) -> Vec<u8> {
        match i {
            0 => I0::project(record),
            1 => I1::project(record),
            2 => I2::project(record),
            3 => I3::project(record),
            _ => unreachable!("index arity is fixed at {INDEX_ARITY}"),
        }
    }

    /// Point lookup by primary id.
    pub fn get(&self, id: u32) -> Result<Option<R>> {
        match self.txn.get(&self.primary, id.to_ne_bytes())? {
            Some(value) => Ok(Some(C::decode(value.as_bytes())?)),
            None => Ok(None),
        }
    }

    /// Looks up the primary id and record filed under `key` in index `i`.
    /// Returns `Ok(None)` if index `i` is null or `key` is absent.
    pub fn get_by_index(&self, i: usize, key: &[u8]) -> Result<Option<(u32, R)>> {
        let Some(db) = self.indexes[i] else { return Ok(None) };
        let cursor = self.txn.cursor(db)?;
        let Some((_, id_value)) = cursor.find(key)? else { return Ok(None) };
        let id = id_value.as_scalar::<u32>()?;
        Ok(self.get(id)?.map(|record| (id, record)))
    }

    /// Number of records in the primary table.
    pub fn size(&self) -> Result<usize> {
        Ok(self.txn.db_stat(&self.primary)?.entries())
    }

    /// Number of `(key, id)` entries in index `i` (0 if `i` is null).
    pub fn size_index(&self, i: usize) -> Result<usize> {
        match self.indexes[i] {
            Some(db) => Ok(self.txn.db_stat(&db)?.entries()),
            None => Ok(0),
        }
    }

    /// Number of distinct keys in index `i` (0 if `i` is null).
    pub fn cardinality_index(&self, i: usize) -> Result<usize> {
        let Some(db) = self.indexes[i] else { return Ok(0) };
        let cursor = self.txn.cursor(db)?;
        let mut count = 0usize;
        let mut entry = cursor.first()?;
        while entry.is_some() {
            count += 1;
            entry = cursor.next_nodup()?;
        }
        Ok(count)
    }

    /// Forward iterator over the primary table in id order.
    pub fn iter_primary(&self) -> Result<PrimaryIter<'_, K, R, C>> {
        Ok(PrimaryIter { cursor: self.txn.cursor(self.primary)?, started: false, _marker: PhantomData })
    }

    /// Forward iterator over index `i` in key order (one entry per `(key,
    /// id)` pair, so a key with N duplicates yields N entries). Empty if `i`
    /// is null.
    pub fn iter_index(&self, i: usize) -> Result<IndexIter<'_, K, R, C>> {
        IndexIter::new(&self.txn, self.primary, self.indexes[i], None, false)
    }

    /// Positions on the first entry whose index-`i` key exactly matches
    /// `key`, then continues forward through the rest of the index.
    pub fn find_index(&self, i: usize, key: &[u8]) -> Result<IndexIter<'_, K, R, C>> {
        IndexIter::new(&self.txn, self.primary, self.indexes[i], Some((key.to_vec(), false)), false)
    }

    /// Positions on the first entry whose index-`i` key is `>= key`, then
    /// continues forward through the rest of the index.
    pub fn lower_bound_index(&self, i: usize, key: &[u8]) -> Result<IndexIter<'_, K, R, C>> {
        IndexIter::new(&self.txn, self.primary, self.indexes[i], Some((key.to_vec(), true)), false)
    }

    /// Iterator over exactly the duplicates of `key` in index `i`.
    pub fn equal_range_index(&self, i: usize, key: &[u8]) -> Result<IndexIter<'_, K, R, C>> {
        IndexIter::new(&self.txn, self.primary, self.indexes[i], Some((key.to_vec(), false)), true)
    }

    /// Iterator over every entry in index `i` whose key starts with
    /// `prefix`, in key order.
    pub fn prefix_range_index(&self, i: usize, prefix: &[u8]) -> Result<PrefixIter<'_, K, R, C>> {
        let inner = IndexIter::new(&self.txn, self.primary, self.indexes[i], Some((prefix.to_vec(), true)), false)?;
        Ok(PrefixIter { inner, prefix: prefix.to_vec(), done: false })
    }
}

impl<R, C, I0, I1, I2, I3> TypedContainer<Rw, R, C, I0, I1, I2, I3>
where
    C: Codec<R>,
    I0: IndexDescriptor<R>,
    I1: IndexDescriptor<R>,
    I2: IndexDescriptor<R>,
    I3: IndexDescriptor<R>,
{
    /// Stores `record` under `id` (or, if `id` is `None` or `0`, under
    /// `max(primary id) + 1`), writing the matching entry into every
    /// non-null index. Returns the id it was stored under.
    pub fn put(&self, record: &R, id: Option<u32>) -> Result<u32> {
        let id = match id {
            Some(id) if id != 0 => id,
            _ => self.next_id()?,
        };
        let bytes = C::encode(record);
        self.txn.put(&self.primary, id.to_ne_bytes(), bytes, WriteFlags::empty())?;
        self.put_indexes(record, id)?;
        Ok(id)
    }

    fn next_id(&self) -> Result<u32> {
        let cursor = self.txn.cursor(self.primary)?;
        match cursor.last()? {
            Some((key, _)) => Ok(key.as_scalar::<u32>()?.checked_add(1).expect("primary id space exhausted")),
            None => Ok(1),
        }
    }

    fn put_indexes(&self, record: &R, id: u32) -> Result<()> {
        for (i, db) in self.indexes.iter().enumerate() {
            if let Some(db) = db {
                self.txn.put(db, Self::project(i, record), id.to_ne_bytes(), WriteFlags::empty())?;
            }
        }
        Ok(())
    }

    /// Fetches the record at `id`, applies `f` to a mutable copy, then
    /// deletes and re-inserts it so every index reflects any key change.
    /// Fails with [`Error::NotFound`] if `id` is absent.
    pub fn modify(&self, id: u32, f: impl FnOnce(&mut R)) -> Result<()> {
        let mut record = self.get(id)?.ok_or(Error::NotFound)?;
        f(&mut record);
        self.del(id)?;
        self.put(&record, Some(id))?;
        Ok(())
    }

    /// Removes `id` from the primary table and every non-null index.
    /// Silently returns `Ok(())` if `id` was already absent.
    pub fn del(&self, id: u32) -> Result<()> {
        let Some(record) = self.get(id)? else { return Ok(()) };
        self.txn.del(&self.primary, id.to_ne_bytes(), None)?;
        for (i, db) in self.indexes.iter().enumerate() {
            if let Some(db) = db {
                let index_key = Self::project(i, &record);
                self.txn.del(db, index_key, Some(id.to_ne_bytes().as_slice()))?;
            }
        }
        Ok(())
    }

    /// Removes every record and index entry, leaving the container's
    /// sub-databases open and empty.
    pub fn clear(&self) -> Result<()> {
        let cursor = self.txn.cursor(self.primary)?;
        let mut entry = cursor.first()?;
        while let Some((key, value)) = entry {
            let id = key.as_scalar::<u32>()?;
            let record: R = C::decode(value.as_bytes())?;
            for (i, db) in self.indexes.iter().enumerate() {
                if let Some(db) = db {
                    let index_key = Self::project(i, &record);
                    self.txn.del(db, index_key, Some(id.to_ne_bytes().as_slice()))?;
                }
            }
            cursor.del(WriteFlags::empty())?;
            entry = cursor.next()?;
        }
        Ok(())
    }

    /// Commits the underlying transaction.
    pub fn commit(self) -> Result<()> {
        self.txn.commit()
    }

    /// Aborts the underlying transaction.
    pub fn abort(self) -> Result<()> {
        self.txn.abort()
    }
}

/// Forward/backward iterator over a container's primary table, deserializing
/// eagerly on each move so dereferencing after the end is a caller error
/// rather than a use-after-free.
pub struct PrimaryIter<'tx, K: TransactionKind, R, C> {
    cursor: Cursor<'tx, K>,
    started: bool,
    _marker: PhantomData<(R, C)>,
}

impl<'tx, K: TransactionKind, R, C: Codec<R>> PrimaryIter<'tx, K, R, C> {
    fn decode(entry: Option<(crate::value::Value<'tx>, crate::value::Value<'tx>)>) -> Result<Option<(u32, R)>> {
        match entry {
            Some((key, value)) => Ok(Some((key.as_scalar::<u32>()?, C::decode(value.as_bytes())?))),
            None => Ok(None),
        }
    }

    pub fn next(&mut self) -> Result<Option<(u32, R)>> {
        let entry =
            if self.started { self.cursor.next()? } else { self.started = true; self.cursor.first()? };
        Self::decode(entry)
    }

    pub fn prev(&mut self) -> Result<Option<(u32, R)>> {
        let entry =
            if self.started { self.cursor.prev()? } else { self.started = true; self.cursor.last()? };
        Self::decode(entry)
    }
}

/// Forward/backward iterator over one secondary index: each move fetches the
/// primary id at the current index entry and deserializes the record it
/// points to.
pub struct IndexIter<'tx, K: TransactionKind, R, C> {
    cursor: Option<Cursor<'tx, K>>,
    txn: &'tx Transaction<K>,
    primary: Database,
    started: bool,
    one_key: bool,
    /// Seek to perform on the first `advance_raw`: `(key, is_lower_bound)`.
    /// `is_lower_bound = false` means an exact match (`find`).
    anchor: Option<(Vec<u8>, bool)>,
    _marker: PhantomData<(R, C)>,
}

impl<'tx, K: TransactionKind, R, C: Codec<R>> IndexIter<'tx, K, R, C> {
    fn new(
        txn: &'tx Transaction<K>,
        primary: Database,
        db: Option<Database>,
        seek: Option<(Vec<u8>, bool)>,
        one_key: bool,
    ) -> Result<Self> {
        let Some(db) = db else {
            return Ok(Self {
                cursor: None,
                txn,
                primary,
                started: true,
                one_key,
                anchor: None,
                _marker: PhantomData,
            });
        };
        let cursor = txn.cursor(db)?;
        Ok(Self { cursor: Some(cursor), txn, primary, started: false, one_key, anchor: seek, _marker: PhantomData })
    }

    fn fetch_id(&self, id: u32) -> Result<Option<(u32, R)>> {
        match self.txn.get(&self.primary, id.to_ne_bytes())? {
            Some(value) => Ok(Some((id, C::decode(value.as_bytes())?))),
            None => Ok(None),
        }
    }

    /// Advances to the next raw `(key, id)` entry, without fetching the
    /// primary record.
    fn advance_raw(&mut self) -> Result<Option<(Vec<u8>, u32)>> {
        let Some(cursor) = &self.cursor else { return Ok(None) };
        let entry = if !self.started {
            self.started = true;
            match self.anchor.take() {
                Some((key, true)) => cursor.lower_bound(key.as_slice())?,
                Some((key, false)) => cursor.find(key.as_slice())?,
                None => cursor.first()?,
            }
        } else if self.one_key {
            cursor.next_dup()?
        } else {
            cursor.next()?
        };
        match entry {
            Some((key, id_value)) => Ok(Some((key.as_byte_string(), id_value.as_scalar::<u32>()?))),
            None => Ok(None),
        }
    }

    /// Advances to the next entry, returning `(id, record)`.
    pub fn next(&mut self) -> Result<Option<(u32, R)>> {
        match self.advance_raw()? {
            Some((_, id)) => self.fetch_id(id),
            None => Ok(None),
        }
    }
}

/// Lexicographic-prefix view over a secondary index, stopping (rather than
/// erroring) at the first key that no longer starts with the prefix.
pub struct PrefixIter<'tx, K: TransactionKind, R, C> {
    inner: IndexIter<'tx, K, R, C>,
    prefix: Vec<u8>,
    done: bool,
}

impl<'tx, K: TransactionKind, R, C: Codec<R>> PrefixIter<'tx, K, R, C> {
    pub fn next(&mut self) -> Result<Option<(u32, R)>> {
        if self.done {
            return Ok(None);
        }
        match self.inner.advance_raw()? {
            Some((key, id)) if key.starts_with(&self.prefix) => self.inner.fetch_id(id),
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

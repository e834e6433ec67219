//! Index descriptors (C6): a compile-time declared key projection from a
//! record, each backing its own duplicate-sorted posting-list database.

/// Maps a record to the byte key stored in one secondary index.
///
/// Implement this on a zero-sized marker type per real index — either a
/// member projection (`fn project(r) { r.email.as_bytes().to_vec() }`) or an
/// arbitrary pure function of the record; both take the same shape. Use
/// [`NullIndex`] to fill an unused arity slot on
/// [`TypedContainer`](crate::typed::TypedContainer).
pub trait IndexDescriptor<R>: 'static {
    /// `true` only for [`NullIndex`]; such slots never open a sub-database
    /// and are skipped by every index operation.
    const IS_NULL: bool = false;

    /// Projects `record` to the key this index stores it under.
    fn project(record: &R) -> Vec<u8>;
}

/// Placeholder filling an unused index slot so a container can declare a
/// fixed arity of four without specializing per instance.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullIndex;

impl<R> IndexDescriptor<R> for NullIndex {
    const IS_NULL: bool = true;

    fn project(_record: &R) -> Vec<u8> {
        Vec::new()
    }
}

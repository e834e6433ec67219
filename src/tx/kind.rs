//! Transaction kind markers.

mod private {
    pub trait Sealed {}
    impl Sealed for super::Ro {}
    impl Sealed for super::Rw {}
}

/// Marker for a read-only transaction.
#[derive(Debug, Copy, Clone, Default)]
#[non_exhaustive]
pub struct Ro;

/// Marker for a read-write transaction.
#[derive(Debug, Copy, Clone, Default)]
#[non_exhaustive]
pub struct Rw;

/// Common behavior of the two transaction kinds.
pub trait TransactionKind: private::Sealed + Copy + std::fmt::Debug + 'static {
    /// Whether this kind opens the underlying engine transaction read-only.
    const IS_READ_ONLY: bool;

    /// Open flags passed to `mdbx_txn_begin_ex`.
    const OPEN_FLAGS: ffi::MDBX_txn_flags_t = if Self::IS_READ_ONLY {
        ffi::MDBX_TXN_RDONLY
    } else {
        ffi::MDBX_TXN_READWRITE
    };
}

impl TransactionKind for Ro {
    const IS_READ_ONLY: bool = true;
}

impl TransactionKind for Rw {
    const IS_READ_ONLY: bool = false;
}

/// Sealed marker implemented only for [`Rw`], used to gate write-only
/// methods (`put`, `del`, cursor `put`/`del`, ...) at compile time.
pub trait WriteMarker: private::Sealed {}
impl WriteMarker for Rw {}

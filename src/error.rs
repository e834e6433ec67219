//! Error types for the store wrapper and the typed container built on top.

use std::{
    ffi::{CStr, c_int},
    fmt, str,
};

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Raw error codes reported by the underlying engine.
///
/// This mirrors the engine's own error enumeration. Most callers never see
/// this type directly: [`Error`] collapses the handful of codes this crate
/// gives special meaning to, and wraps the rest in [`Error::Store`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum StoreError {
    KeyExist,
    NotFound,
    PageNotfound,
    Corrupted,
    Panic,
    VersionMismatch,
    Invalid,
    MapFull,
    DbsFull,
    ReadersFull,
    TxnFull,
    CursorFull,
    PageFull,
    UnableExtendMapSize,
    Incompatible,
    BadRslot,
    BadTxn,
    BadValSize,
    BadDbi,
    Problem,
    Busy,
    MultiVal,
    BadSign,
    WannaRecovery,
    KeyMismatch,
    TooLarge,
    ThreadMismatch,
    TxnOverlapping,
    /// Any other code, kept verbatim so [`Display`](fmt::Display) still
    /// produces the engine's own message.
    Other(c_int),
}

impl StoreError {
    pub(crate) fn from_err_code(err_code: c_int) -> Self {
        match err_code {
            ffi::MDBX_KEYEXIST => Self::KeyExist,
            ffi::MDBX_NOTFOUND => Self::NotFound,
            ffi::MDBX_PAGE_NOTFOUND => Self::PageNotfound,
            ffi::MDBX_CORRUPTED => Self::Corrupted,
            ffi::MDBX_PANIC => Self::Panic,
            ffi::MDBX_VERSION_MISMATCH => Self::VersionMismatch,
            ffi::MDBX_INVALID => Self::Invalid,
            ffi::MDBX_MAP_FULL => Self::MapFull,
            ffi::MDBX_DBS_FULL => Self::DbsFull,
            ffi::MDBX_READERS_FULL => Self::ReadersFull,
            ffi::MDBX_TXN_FULL => Self::TxnFull,
            ffi::MDBX_CURSOR_FULL => Self::CursorFull,
            ffi::MDBX_PAGE_FULL => Self::PageFull,
            ffi::MDBX_UNABLE_EXTEND_MAPSIZE => Self::UnableExtendMapSize,
            ffi::MDBX_INCOMPATIBLE => Self::Incompatible,
            ffi::MDBX_BAD_RSLOT => Self::BadRslot,
            ffi::MDBX_BAD_TXN => Self::BadTxn,
            ffi::MDBX_BAD_VALSIZE => Self::BadValSize,
            ffi::MDBX_BAD_DBI => Self::BadDbi,
            ffi::MDBX_PROBLEM => Self::Problem,
            ffi::MDBX_BUSY => Self::Busy,
            ffi::MDBX_EMULTIVAL => Self::MultiVal,
            ffi::MDBX_EBADSIGN => Self::BadSign,
            ffi::MDBX_WANNA_RECOVERY => Self::WannaRecovery,
            ffi::MDBX_EKEYMISMATCH => Self::KeyMismatch,
            ffi::MDBX_TOO_LARGE => Self::TooLarge,
            ffi::MDBX_THREAD_MISMATCH => Self::ThreadMismatch,
            ffi::MDBX_TXN_OVERLAPPING => Self::TxnOverlapping,
            other => Self::Other(other),
        }
    }

    pub(crate) fn to_err_code(self) -> c_int {
        match self {
            Self::KeyExist => ffi::MDBX_KEYEXIST,
            Self::NotFound => ffi::MDBX_NOTFOUND,
            Self::PageNotfound => ffi::MDBX_PAGE_NOTFOUND,
            Self::Corrupted => ffi::MDBX_CORRUPTED,
            Self::Panic => ffi::MDBX_PANIC,
            Self::VersionMismatch => ffi::MDBX_VERSION_MISMATCH,
            Self::Invalid => ffi::MDBX_INVALID,
            Self::MapFull => ffi::MDBX_MAP_FULL,
            Self::DbsFull => ffi::MDBX_DBS_FULL,
            Self::ReadersFull => ffi::MDBX_READERS_FULL,
            Self::TxnFull => ffi::MDBX_TXN_FULL,
            Self::CursorFull => ffi::MDBX_CURSOR_FULL,
            Self::PageFull => ffi::MDBX_PAGE_FULL,
            Self::UnableExtendMapSize => ffi::MDBX_UNABLE_EXTEND_MAPSIZE,
            Self::Incompatible => ffi::MDBX_INCOMPATIBLE,
            Self::BadRslot => ffi::MDBX_BAD_RSLOT,
            Self::BadTxn => ffi::MDBX_BAD_TXN,
            Self::BadValSize => ffi::MDBX_BAD_VALSIZE,
            Self::BadDbi => ffi::MDBX_BAD_DBI,
            Self::Problem => ffi::MDBX_PROBLEM,
            Self::Busy => ffi::MDBX_BUSY,
            Self::MultiVal => ffi::MDBX_EMULTIVAL,
            Self::BadSign => ffi::MDBX_EBADSIGN,
            Self::WannaRecovery => ffi::MDBX_WANNA_RECOVERY,
            Self::KeyMismatch => ffi::MDBX_EKEYMISMATCH,
            Self::TooLarge => ffi::MDBX_TOO_LARGE,
            Self::ThreadMismatch => ffi::MDBX_THREAD_MISMATCH,
            Self::TxnOverlapping => ffi::MDBX_TXN_OVERLAPPING,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: mdbx_strerror returns a pointer to a static string table.
        let description = unsafe {
            let ptr = ffi::mdbx_strerror(self.to_err_code());
            str::from_utf8_unchecked(CStr::from_ptr(ptr).to_bytes())
        };
        f.write_str(description)
    }
}

impl std::error::Error for StoreError {}

/// Top-level error type.
///
/// `NotFound` rarely surfaces here: most lookup APIs return `Option`/sentinel
/// values instead, per the propagation policy of the store (see crate docs).
/// It still exists for the few APIs (e.g. `modify`) that treat a missing
/// record as a hard failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key absent from the database.
    #[error("key not found")]
    NotFound,

    /// A typed decode saw a slice whose length didn't match the target type.
    #[error("value length does not match target type")]
    LengthMismatch,

    /// The configured codec rejected a byte string.
    #[error("failed to decode record: {0}")]
    DecodeError(String),

    /// A transaction or cursor was begun in violation of the per-thread
    /// nesting/exclusivity rules.
    #[error("transaction nesting rule violated: {0}")]
    NestingConflict(&'static str),

    /// An already-open environment was reopened with incompatible flags.
    #[error("environment already open with incompatible flags")]
    FlagMismatch,

    /// A write exceeded the environment's configured map size.
    #[error("environment map size exceeded")]
    MapFull,

    /// The environment's reader slot table is exhausted.
    #[error("too many concurrent readers")]
    ReadersFull,

    /// A cursor or transaction was used after being closed, committed, or
    /// aborted.
    #[error("use of a cursor or transaction after it was invalidated")]
    Invalidated,

    /// Any other failure propagated from the underlying engine.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn from_err_code(code: c_int) -> Self {
        StoreError::from_err_code(code).into()
    }

    /// Returns `true` if this is the `NotFound` sentinel.
    pub fn not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::MapFull => Self::MapFull,
            StoreError::ReadersFull => Self::ReadersFull,
            StoreError::BadTxn => Self::Invalidated,
            other => Self::Store(other),
        }
    }
}

/// Maps a raw engine status code to a `Result<(), Error>`.
///
/// `MDBX_SUCCESS` and `MDBX_RESULT_TRUE` both indicate success; the latter is
/// returned by a handful of APIs (e.g. cursor positioning at EOF) to carry an
/// extra bit of information the caller maps separately.
pub(crate) fn mdbx_result(err_code: c_int) -> Result<bool> {
    match err_code {
        ffi::MDBX_SUCCESS => Ok(false),
        ffi::MDBX_RESULT_TRUE => Ok(true),
        other => Err(Error::from_err_code(other)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn not_found_round_trips_through_store_error() {
        let err: Error = StoreError::NotFound.into();
        assert!(err.not_found());
    }

    #[test]
    fn display_uses_engine_message() {
        assert_eq!(
            "MDBX_NOTFOUND: No matching key/data pair found",
            StoreError::NotFound.to_string()
        );
    }
}

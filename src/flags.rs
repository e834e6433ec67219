//! Environment, database and write flags.

use bitflags::bitflags;

bitflags! {
    /// Flags controlling how an environment's backing file(s) are opened.
    #[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
    pub struct EnvironmentFlagSet: u32 {
        /// Store the database in a single file rather than a directory
        /// containing a data file and a lock file.
        const NO_SUB_DIR = ffi::MDBX_NOSUBDIR;
        /// Don't fsync after each commit. Crash-unsafe but fast.
        const NO_SYNC = ffi::MDBX_SAFE_NOSYNC;
        /// Don't fsync the meta page after each commit.
        const NO_META_SYNC = ffi::MDBX_NOMETASYNC;
        /// Use a writeable memory map.
        const WRITE_MAP = ffi::MDBX_WRITEMAP;
        /// Don't zero-initialize pages reused from the free list.
        const NO_MEM_INIT = ffi::MDBX_NOMEMINIT;
        /// Fail instead of blocking if the environment is already in use
        /// by another process.
        const EXCLUSIVE = ffi::MDBX_EXCLUSIVE;
    }
}

/// Durability mode for a read-write environment.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum SyncMode {
    /// fsync on every commit.
    #[default]
    Durable,
    /// Skip fsync of the data pages; still fsyncs the meta page.
    NoMetaSync,
    /// Skip fsync entirely. Fastest, least durable.
    NoSync,
}

/// Read/write mode for an [`Environment`](crate::Environment).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    ReadOnly,
    ReadWrite { sync_mode: SyncMode },
}

impl Default for Mode {
    fn default() -> Self {
        Self::ReadWrite { sync_mode: SyncMode::default() }
    }
}

/// Flags passed when opening an [`Environment`](crate::Environment).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct EnvironmentFlags {
    pub mode: Mode,
    pub no_sub_dir: bool,
    pub exclusive: bool,
}

impl From<Mode> for EnvironmentFlags {
    fn from(mode: Mode) -> Self {
        Self { mode, ..Default::default() }
    }
}

impl EnvironmentFlags {
    pub(crate) fn make_flags(self) -> EnvironmentFlagSet {
        let mut flags = EnvironmentFlagSet::empty();
        if self.mode == Mode::ReadOnly {
            // MDBX_RDONLY is handled separately at mdbx_env_open time.
        }
        if self.no_sub_dir {
            flags |= EnvironmentFlagSet::NO_SUB_DIR;
        }
        if self.exclusive {
            flags |= EnvironmentFlagSet::EXCLUSIVE;
        }
        if let Mode::ReadWrite { sync_mode } = self.mode {
            match sync_mode {
                SyncMode::Durable => {}
                SyncMode::NoMetaSync => flags |= EnvironmentFlagSet::NO_META_SYNC,
                SyncMode::NoSync => flags |= EnvironmentFlagSet::NO_SYNC,
            }
        }
        flags
    }

    pub(crate) const fn is_read_only(self) -> bool {
        matches!(self.mode, Mode::ReadOnly)
    }
}

bitflags! {
    /// Flags for creating or opening a named sub-database.
    #[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
    pub struct DatabaseFlags: u32 {
        /// Create the database if it doesn't already exist.
        const CREATE = ffi::MDBX_CREATE;
        /// Keys are treated as native-endian unsigned integers.
        const INTEGER_KEY = ffi::MDBX_INTEGERKEY;
        /// Duplicate keys are permitted; values for a key are kept sorted.
        const DUP_SORT = ffi::MDBX_DUPSORT;
        /// All values for a key have the same size (required for
        /// [`DUP_SORT`](Self::DUP_SORT) posting lists of fixed-width ids).
        const DUP_FIXED = ffi::MDBX_DUPFIXED;
        /// Duplicate values are treated as native-endian unsigned integers.
        const INTEGER_DUP = ffi::MDBX_INTEGERDUP;
        /// Compare keys as reversed byte strings.
        const REVERSE_KEY = ffi::MDBX_REVERSEKEY;
        /// Compare duplicate values as reversed byte strings.
        const REVERSE_DUP = ffi::MDBX_REVERSEDUP;
    }
}

bitflags! {
    /// Flags for a single `put` operation.
    #[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
    pub struct WriteFlags: u32 {
        /// Fail rather than overwrite an existing key.
        const NO_OVERWRITE = ffi::MDBX_NOOVERWRITE;
        /// For `DUP_SORT` databases, fail rather than insert a duplicate
        /// `(key, value)` pair that already exists.
        const NO_DUP_DATA = ffi::MDBX_NODUPDATA;
        /// Overwrite the value at the cursor's current position without
        /// changing the key.
        const CURRENT = ffi::MDBX_CURRENT;
        /// Append the key at the end of the database without comparing
        /// it against the current last key. Caller must guarantee order.
        const APPEND = ffi::MDBX_APPEND;
        /// Like [`APPEND`](Self::APPEND), but appends a duplicate value
        /// at the end of the current key's posting list.
        const APPEND_DUP = ffi::MDBX_APPENDDUP;
    }
}

//! Environment registry (C2): process-wide deduplication of open
//! environments, keyed by `(device, inode)`.

use crate::{
    env::{Environment, EnvironmentInner, Geometry, open_raw},
    error::{Error, Result},
    flags::EnvironmentFlags,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    os::unix::fs::MetadataExt,
    path::Path,
    sync::{Arc, OnceLock, Weak},
};

type Identity = (u64, u64);

fn registry() -> &'static Mutex<HashMap<Identity, Weak<EnvironmentInner>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<(u64, u64), Weak<EnvironmentInner>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Data file path for a given environment root, honoring `no_sub_dir`.
fn data_file(path: &Path, flags: EnvironmentFlags) -> std::path::PathBuf {
    if flags.no_sub_dir { path.to_path_buf() } else { path.join("mdbx.dat") }
}

/// Opens (or returns a shared reference to an already-open) environment
/// rooted at `path`.
///
/// The registry mutex is held across the whole critical section below so
/// concurrent first-opens of the same identity cannot race each other into
/// creating two environments for one file.
#[allow(clippy::too_many_arguments)]
pub(crate) fn open(
    path: &Path,
    flags: EnvironmentFlags,
    geometry: &Geometry,
    max_dbs: u64,
    max_readers: Option<u64>,
    mode: u32,
) -> Result<Environment> {
    let registry = registry();
    let mut guard = registry.lock();

    let file = data_file(path, flags);
    let existing = std::fs::metadata(&file);

    if existing.is_err() {
        // Nonexistent: create fresh, then stat to learn the identity.
        let raw = open_raw(path, flags, geometry, max_dbs, max_readers, mode)?;
        let meta = std::fs::metadata(&file).map_err(|_| Error::FlagMismatch)?;
        let identity = (meta.dev(), meta.ino());
        let inner = Arc::new(EnvironmentInner {
            env: raw,
            flags,
            path: path.to_path_buf(),
            counters: Mutex::new(HashMap::new()),
        });
        guard.insert(identity, Arc::downgrade(&inner));
        tracing::debug!(path = %path.display(), "opened new environment");
        return Ok(Environment(inner));
    }

    let meta = existing.expect("checked above");
    let identity = (meta.dev(), meta.ino());

    if let Some(weak) = guard.get(&identity)
        && let Some(inner) = weak.upgrade()
    {
        if inner.flags != flags {
            return Err(Error::FlagMismatch);
        }
        tracing::debug!(path = %path.display(), "reusing registered environment");
        return Ok(Environment(inner));
    }

    // Present on disk but either never registered or the weak entry is
    // dead (last holder dropped): (re)create and (re)insert.
    let raw = open_raw(path, flags, geometry, max_dbs, max_readers, mode)?;
    let inner = Arc::new(EnvironmentInner {
        env: raw,
        flags,
        path: path.to_path_buf(),
        counters: Mutex::new(HashMap::new()),
    });
    guard.insert(identity, Arc::downgrade(&inner));
    tracing::debug!(path = %path.display(), "opened environment over existing file");
    Ok(Environment(inner))
}

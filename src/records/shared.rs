//! Database handles shared between readers.
//!
//! redb locks a database file for as long as a handle to it is open, so two
//! independent opens of the same store fail. Readers in one process go
//! through this registry and share one handle per store file. Readers in
//! separate processes cannot use the same store at the same time.

use super::DATA_FILE;
use crate::error::Result;
use parking_lot::{const_mutex, Mutex};
use redb::{Builder, Database};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Open databases keyed by canonical file path. Entries die with their
/// last reader.
static OPEN: Mutex<BTreeMap<PathBuf, Weak<Database>>> = const_mutex(BTreeMap::new());

/// Open the database of the store at `store`, or join a handle that another
/// reader already holds.
///
/// The cache size only applies when this call does the opening.
pub(crate) fn open(store: &Path, cache_size: usize) -> Result<Arc<Database>> {
    let file = fs::canonicalize(store.join(DATA_FILE))?;

    let mut open = OPEN.lock();
    if let Some(db) = open.get(&file).and_then(Weak::upgrade) {
        debug!(path = %file.display(), "joined open store");
        return Ok(db);
    }

    open.retain(|_, db| db.strong_count() > 0);
    let db = Arc::new(Builder::new().set_cache_size(cache_size).open(&file)?);
    open.insert(file, Arc::downgrade(&db));
    Ok(db)
}

/// Stop handing out the handle for the store at `store`.
///
/// Called before a store is rebuilt, so new readers open the new file
/// rather than join a handle on the removed one.
pub(crate) fn forget(store: &Path) {
    if let Ok(file) = fs::canonicalize(store.join(DATA_FILE)) {
        OPEN.lock().remove(&file);
    }
}

#[cfg(test)]
pub(crate) fn is_registered(store: &Path) -> bool {
    fs::canonicalize(store.join(DATA_FILE))
        .ok()
        .and_then(|file| OPEN.lock().get(&file).map(|db| db.strong_count() > 0))
        .unwrap_or(false)
}

//! Sequential record writer.

use super::{codec, shared, DATA_FILE, RECORDS};
use crate::config::{self, StoreDescriptor, CLASS_NAME, CONFIG_FILE};
use crate::error::{Result, StoreError};
use crate::media::{ImageInput, NdArray};
use crate::types::{record_key, Fields, RecordType, TypeState};
use redb::{Builder, Database, ReadableTableMetadata, WriteTransaction};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Writer configuration.
#[derive(Clone, Debug)]
pub struct WriterOptions {
    /// Upper bound on the page cache, in bytes. Pages are only allocated
    /// as they are touched.
    pub cache_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            cache_size: 1 << 30,
        }
    }
}

/// Caller-supplied changes to the descriptor written by
/// [`RecordWriter::write_config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Replaces the type's default field name. Not allowed on dict stores.
    pub data_name: Option<String>,

    /// Extra descriptor entries, applied last.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigOverrides {
    pub fn data_name(name: impl Into<String>) -> Self {
        Self {
            data_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Field order matters: the transaction must drop before its database.
struct WriteHandle {
    txn: WriteTransaction,
    db: Database,
}

enum WriterState {
    Unopened,
    Open(WriteHandle),
    Closed,
}

/// Builds a new store.
///
/// All writes share one transaction that is committed by [`close`]. Dropping
/// an open writer without closing it discards everything written.
///
/// [`close`]: RecordWriter::close
pub struct RecordWriter {
    /// Store directory.
    path: PathBuf,

    options: WriterOptions,

    /// Fixed by the first write.
    record_type: TypeState,

    /// Every field name seen in dict records.
    key_names: BTreeSet<String>,

    state: WriterState,
}

impl RecordWriter {
    /// Prepare a writer for a new store at `path`.
    ///
    /// Anything already at `path` is removed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    pub fn create_with_options(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        shared::forget(&path);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.exists() {
            fs::remove_file(&path)?;
        }

        Ok(Self {
            path,
            options,
            record_type: TypeState::Unfixed,
            key_names: BTreeSet::new(),
            state: WriterState::Unopened,
        })
    }

    /// Open the database and begin the write transaction.
    ///
    /// Called implicitly by every write. A closed writer cannot be reopened.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            WriterState::Open(_) => return Ok(()),
            WriterState::Closed => return Err(StoreError::WriterClosed),
            WriterState::Unopened => {}
        }

        fs::create_dir_all(&self.path)?;
        let db = Builder::new()
            .set_cache_size(self.options.cache_size)
            .create(self.path.join(DATA_FILE))?;

        // Commit the empty table up front so an abandoned writer still
        // leaves a readable store.
        let init = db.begin_write()?;
        init.open_table(RECORDS)?;
        init.commit()?;

        let txn = db.begin_write()?;

        debug!(path = %self.path.display(), "opened store for writing");
        self.state = WriterState::Open(WriteHandle { txn, db });
        Ok(())
    }

    /// Commit all writes and release the database.
    ///
    /// Safe to call more than once, or without ever writing.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Open(WriteHandle { txn, db }) => {
                txn.commit()?;
                drop(db);
                debug!(path = %self.path.display(), "committed store");
            }
            WriterState::Unopened | WriterState::Closed => {}
        }
        Ok(())
    }

    /// Store an image, either copied from a file or re-encoded as PNG.
    ///
    /// Re-encoding keeps text metadata only.
    pub fn write_image(&mut self, index: u64, image: impl Into<ImageInput>) -> Result<()> {
        let image = image.into();
        self.put(RecordType::Image, index, || codec::encode_image(&image))
    }

    /// Store a video file byte for byte.
    pub fn write_video(&mut self, index: u64, path: impl AsRef<Path>) -> Result<()> {
        self.put(RecordType::Video, index, || codec::encode_video(path.as_ref()))
    }

    pub fn write_numpy(&mut self, index: u64, array: &NdArray) -> Result<()> {
        self.put(RecordType::Numpy, index, || codec::encode_array(array))
    }

    pub fn write_dict(&mut self, index: u64, fields: &Fields) -> Result<()> {
        self.put(RecordType::Dict, index, || codec::encode_fields(fields))?;
        let incoming: BTreeSet<String> = fields.keys().cloned().collect();
        self.key_names = self.key_names.union(&incoming).cloned().collect();
        Ok(())
    }

    /// Write the store descriptor next to the data.
    ///
    /// Call once, after the last write and before [`close`](Self::close).
    pub fn write_config(&mut self, mut overrides: ConfigOverrides) -> Result<StoreDescriptor> {
        let ty = self.record_type.get().ok_or(StoreError::TypeNotFixed)?;

        // A `data_name` given as an extra entry counts as the override.
        if let Some(value) = overrides.extra.remove("data_name") {
            overrides.data_name = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(name) => Some(name),
                other => {
                    return Err(StoreError::InvalidConfig(format!(
                        "data_name must be a string, got {other}"
                    )))
                }
            };
        }

        let data_name = match overrides.data_name {
            Some(_) if ty == RecordType::Dict => return Err(StoreError::DataNameOnDict),
            Some(name) => Some(name),
            None => ty.default_data_name().map(str::to_string),
        };

        let key_names = match ty {
            RecordType::Dict => self.key_names.iter().cloned().collect(),
            _ => data_name.iter().cloned().collect(),
        };

        let descriptor = StoreDescriptor {
            class_name: CLASS_NAME.to_string(),
            key_names,
            data_size: self.entry_count()?,
            data_type: ty,
            data_name,
            data_path: None,
            extra: serde_json::Map::new(),
        }
        .with_overrides(overrides.extra)?;

        let config_path = self.path.join(CONFIG_FILE);
        config::save_descriptor(&config_path, &descriptor)?;

        info!(
            path = %config_path.display(),
            data_type = %descriptor.data_type,
            data_size = descriptor.data_size,
            "wrote store config"
        );
        Ok(descriptor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store's record type, once something has been written.
    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type.get()
    }

    /// Field names collected from dict records so far, sorted.
    pub fn key_names(&self) -> &BTreeSet<String> {
        &self.key_names
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WriterState::Open(_))
    }

    /// Entries in the store, including uncommitted writes.
    pub fn entry_count(&self) -> Result<u64> {
        match &self.state {
            WriterState::Open(handle) => Ok(handle.txn.open_table(RECORDS)?.len()?),
            WriterState::Unopened => Ok(0),
            WriterState::Closed => Err(StoreError::WriterClosed),
        }
    }

    /// Check the type, encode and insert one record.
    ///
    /// The type is only fixed once the insert has gone through, so a failed
    /// write leaves the writer as it was.
    fn put<F>(&mut self, ty: RecordType, index: u64, encode: F) -> Result<()>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let next = self
            .record_type
            .admit(ty)
            .map_err(|(expected, got)| StoreError::TypeMismatch { expected, got })?;
        if matches!(self.state, WriterState::Closed) {
            return Err(StoreError::WriterClosed);
        }

        let payload = encode()?;

        self.open()?;
        let WriterState::Open(handle) = &self.state else {
            return Err(StoreError::WriterClosed);
        };
        {
            let mut table = handle.txn.open_table(RECORDS)?;
            table.insert(record_key(index).as_slice(), payload.as_slice())?;
        }

        self.record_type = next;
        trace!(index, data_type = %ty, bytes = payload.len(), "wrote record");
        Ok(())
    }
}

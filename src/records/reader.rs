//! Random-access record reader.

use super::{codec, shared, RECORDS};
use crate::config::{self, load_config, ConfigSource, CONFIG_FILE};
use crate::error::{Result, StoreError};
use crate::types::{record_key, RecordType, Sample};
use parking_lot::Mutex;
use redb::{Database, ReadOnlyTable, ReadableTableMetadata};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Reader configuration.
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    /// Expected record count. Checked on open; taken from the store if unset.
    pub data_size: Option<u64>,

    pub data_type: RecordType,

    /// Wrap every decoded record under this field name.
    pub data_name: Option<String>,

    /// Page cache size in bytes. Kept small: reads are random, so pages are
    /// fetched on demand only.
    pub cache_size: usize,
}

impl ReaderOptions {
    pub fn new(data_type: RecordType) -> Self {
        Self {
            data_size: None,
            data_type,
            data_name: None,
            cache_size: 16 << 20,
        }
    }

    pub fn with_data_size(mut self, data_size: u64) -> Self {
        self.data_size = Some(data_size);
        self
    }

    pub fn with_data_name(mut self, data_name: impl Into<String>) -> Self {
        self.data_name = Some(data_name.into());
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }
}

/// How [`RecordReader::save`] points the exported descriptor at the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveMode {
    /// Copy the database next to the descriptor; no `data_path` is stored.
    CopyData,
    /// Store `data_path` relative to the descriptor's directory.
    RelativePath,
    /// Store `data_path` as an absolute path.
    AbsolutePath,
}

/// Field order matters: the table must drop before its database.
struct ReadHandle {
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
    _db: Arc<Database>,
}

struct ReaderState {
    data_size: Option<u64>,
    handle: Option<ReadHandle>,
}

/// Serves records of an existing store by index.
///
/// The database is opened on the first [`len`] or [`get`] and stays open
/// until [`close`]. The handle sits behind a lock, so one reader can be
/// shared by several loader threads. Independent readers of the same store
/// in one process share the underlying database; a store cannot be read
/// from two processes at once.
///
/// [`len`]: RecordReader::len
/// [`get`]: RecordReader::get
/// [`close`]: RecordReader::close
pub struct RecordReader {
    path: PathBuf,
    config_path: Option<PathBuf>,
    data_type: RecordType,
    data_name: Option<String>,
    cache_size: usize,
    state: Mutex<ReaderState>,
}

impl RecordReader {
    pub fn new(path: impl AsRef<Path>, options: ReaderOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config_path: None,
            data_type: options.data_type,
            data_name: options.data_name,
            cache_size: options.cache_size,
            state: Mutex::new(ReaderState {
                data_size: options.data_size,
                handle: None,
            }),
        }
    }

    /// Build a reader from a store descriptor.
    pub fn load(source: impl Into<ConfigSource>) -> Result<Self> {
        let loaded = load_config(source)?;
        let descriptor = loaded.descriptor;

        let mut options =
            ReaderOptions::new(descriptor.data_type).with_data_size(descriptor.data_size);
        options.data_name = descriptor.data_name;

        let mut reader = Self::new(loaded.data_path, options);
        reader.config_path = loaded.config_path;
        Ok(reader)
    }

    /// Open the database read-only. Does nothing if already open.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.open_locked(&mut state)
    }

    /// Release the database. Safe to call when never opened; the next
    /// [`len`](Self::len) or [`get`](Self::get) opens it again.
    pub fn close(&self) {
        if self.state.lock().handle.take().is_some() {
            debug!(path = %self.path.display(), "closed store");
        }
    }

    /// Number of records.
    pub fn len(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if let Some(size) = state.data_size {
            return Ok(size);
        }
        self.open_locked(&mut state)?;
        state
            .data_size
            .ok_or_else(|| StoreError::InvalidConfig("record count unknown after open".into()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Decode the record at `index`.
    pub fn get(&self, index: u64) -> Result<Sample> {
        let bytes = {
            let mut state = self.state.lock();
            self.open_locked(&mut state)?;
            let handle = state
                .handle
                .as_ref()
                .ok_or_else(|| StoreError::InvalidConfig("store handle missing".into()))?;
            let guard = handle
                .table
                .get(record_key(index).as_slice())?
                .ok_or(StoreError::RecordNotFound(index))?;
            guard.value().to_vec()
        };

        let data = codec::decode(self.data_type, &bytes)?;
        Ok(Sample::wrap(data, self.data_name.as_deref()))
    }

    /// Export a descriptor for this store to `save_path`.
    ///
    /// `save_path` is either a `.json` file or a directory that receives
    /// `config.json`. Returns the descriptor file written.
    pub fn save(&self, save_path: impl AsRef<Path>, mode: SaveMode) -> Result<PathBuf> {
        let config_path = config::config_file(save_path.as_ref());
        let save_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let source = self
            .config_path
            .clone()
            .unwrap_or_else(|| self.path.join(CONFIG_FILE));
        let mut entries = config::load_json(&source)?;

        entries.insert("data_type".into(), Value::from(self.data_type.as_str()));
        let data_size = self.state.lock().data_size;
        if let Some(expected) = data_size {
            let actual = entries.get("data_size").and_then(Value::as_u64);
            if actual != Some(expected) {
                return Err(StoreError::SizeMismatch {
                    expected,
                    actual: actual.unwrap_or(0),
                });
            }
        }
        if let Some(name) = &self.data_name {
            entries.insert("_key_names".into(), Value::from(vec![name.clone()]));
            entries.insert("data_name".into(), Value::from(name.clone()));
        }

        fs::create_dir_all(&save_dir)?;
        match mode {
            SaveMode::CopyData => {
                self.copy_data(&save_dir)?;
                entries.remove("data_path");
            }
            SaveMode::RelativePath => {
                let relative = config::relative_path(&self.path, &save_dir)?;
                entries.insert("data_path".into(), Value::from(relative.to_string_lossy()));
            }
            SaveMode::AbsolutePath => {
                let absolute = fs::canonicalize(&self.path)?;
                entries.insert("data_path".into(), Value::from(absolute.to_string_lossy()));
            }
        }

        config::save_json(&config_path, &Value::Object(entries))?;
        info!(path = %config_path.display(), ?mode, "saved store config");
        Ok(config_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_type(&self) -> RecordType {
        self.data_type
    }

    pub fn data_name(&self) -> Option<&str> {
        self.data_name.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    fn open_locked(&self, state: &mut ReaderState) -> Result<()> {
        if state.handle.is_some() {
            return Ok(());
        }

        let db = shared::open(&self.path, self.cache_size)?;
        let table = db.begin_read()?.open_table(RECORDS)?;
        let actual = table.len()?;

        match state.data_size {
            Some(expected) if expected != actual => {
                return Err(StoreError::SizeMismatch { expected, actual });
            }
            Some(_) => {}
            None => state.data_size = Some(actual),
        }

        debug!(path = %self.path.display(), entries = actual, "opened store for reading");
        state.handle = Some(ReadHandle { table, _db: db });
        Ok(())
    }

    fn copy_data(&self, save_dir: &Path) -> Result<()> {
        if fs::canonicalize(&self.path)? == fs::canonicalize(save_dir)? {
            return Ok(());
        }
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "redb") {
                fs::copy(&path, save_dir.join(entry.file_name()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NdArray;
    use crate::records::{ConfigOverrides, RecordWriter};
    use crate::types::Data;
    use ndarray::{ArrayD, IxDyn};
    use tempfile::TempDir;

    fn numpy_store(dir: &TempDir, count: u64) -> PathBuf {
        let path = dir.path().join("store");
        let mut writer = RecordWriter::create(&path).unwrap();
        for i in 0..count {
            let array = ArrayD::from_elem(IxDyn(&[2, 2]), i as i32);
            writer.write_numpy(i, &NdArray::from(array)).unwrap();
        }
        writer.write_config(ConfigOverrides::default()).unwrap();
        writer.close().unwrap();
        path
    }

    #[test]
    fn test_len_opens_lazily() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 4);

        let reader = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy));
        assert!(!reader.is_open());
        assert_eq!(reader.len().unwrap(), 4);
        assert!(reader.is_open());
    }

    #[test]
    fn test_known_size_skips_open() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 2);

        let reader =
            RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy).with_data_size(2));
        assert_eq!(reader.len().unwrap(), 2);
        assert!(!reader.is_open());
    }

    #[test]
    fn test_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 3);

        let reader =
            RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy).with_data_size(4));
        assert!(matches!(
            reader.get(0),
            Err(StoreError::SizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(!reader.is_open());
    }

    #[test]
    fn test_get_wraps_under_data_name() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 3);

        let reader = RecordReader::new(
            &path,
            ReaderOptions::new(RecordType::Numpy).with_data_name("depth"),
        );
        let sample = reader.get(2).unwrap();
        let array = sample.field("depth").and_then(Data::as_array).unwrap();
        assert_eq!(array.downcast::<i32>().unwrap()[[1, 1]], 2);
    }

    #[test]
    fn test_missing_record() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 1);

        let reader = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy));
        assert!(matches!(reader.get(5), Err(StoreError::RecordNotFound(5))));
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 2);

        let reader = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy));
        reader.close();
        reader.get(0).unwrap();
        reader.close();
        reader.close();
        assert!(!reader.is_open());
        reader.get(1).unwrap();
        assert!(reader.is_open());
    }

    #[test]
    fn test_readers_share_one_handle() {
        let dir = TempDir::new().unwrap();
        let path = numpy_store(&dir, 3);

        let a = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy));
        let b = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy).with_data_size(3));
        a.get(0).unwrap();
        b.get(2).unwrap();
        assert!(shared::is_registered(&path));

        a.close();
        assert!(shared::is_registered(&path));
        b.get(1).unwrap();

        b.close();
        assert!(!shared::is_registered(&path));
    }

    #[test]
    fn test_missing_store_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let reader = RecordReader::new(dir.path().join("nope"), ReaderOptions::new(RecordType::Dict));
        assert!(reader.len().is_err());
    }
}

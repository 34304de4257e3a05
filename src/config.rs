//! Store descriptors.
//!
//! A descriptor is the `config.json` written beside a store. It names the
//! record type, the record count and the field names a reader exposes.

use crate::error::{Result, StoreError};
use crate::types::RecordType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Value of `_class_name` in every descriptor.
pub const CLASS_NAME: &str = "RedbDataset";

/// Descriptor file inside a store directory.
pub const CONFIG_FILE: &str = "config.json";

/// The persisted description of a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    #[serde(rename = "_class_name")]
    pub class_name: String,

    /// Sorted field names a reader exposes.
    #[serde(rename = "_key_names")]
    pub key_names: Vec<String>,

    /// Number of records.
    pub data_size: u64,

    pub data_type: RecordType,

    /// Field a single-valued record is wrapped under.
    #[serde(default)]
    pub data_name: Option<String>,

    /// Store directory, absolute or relative to the descriptor. Absent when
    /// the data sits next to the descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,

    /// Any other entries, kept as they are.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoreDescriptor {
    /// Apply `overrides` on top of this descriptor's entries.
    pub fn with_overrides(self, overrides: Map<String, Value>) -> Result<Self> {
        if overrides.is_empty() {
            return Ok(self);
        }

        let Value::Object(mut entries) = serde_json::to_value(&self)? else {
            return Err(StoreError::InvalidConfig("descriptor is not an object".into()));
        };
        entries.extend(overrides);
        Self::from_value(Value::Object(entries))
    }

    fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }
}

/// Where to load a descriptor from.
#[derive(Clone, Debug)]
pub enum ConfigSource {
    /// A store directory or a `.json` descriptor file.
    Path(PathBuf),
    /// An already parsed descriptor. Needs a `data_path`; a `config_path`
    /// entry, if present, anchors relative paths.
    Value(Value),
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::Path(path)
    }
}

impl From<&str> for ConfigSource {
    fn from(path: &str) -> Self {
        ConfigSource::Path(PathBuf::from(path))
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        ConfigSource::Value(value)
    }
}

/// A descriptor together with where it and its data live.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub descriptor: StoreDescriptor,

    /// Descriptor file, when loaded from disk.
    pub config_path: Option<PathBuf>,

    /// Resolved store directory.
    pub data_path: PathBuf,
}

/// Load a descriptor and resolve its data path.
pub fn load_config(source: impl Into<ConfigSource>) -> Result<LoadedConfig> {
    match source.into() {
        ConfigSource::Path(path) => {
            let config_path = config_file(&path);
            let descriptor = StoreDescriptor::from_value(serde_json::from_slice(&fs::read(
                &config_path,
            )?)?)?;
            let base = config_path.parent().unwrap_or(Path::new("")).to_path_buf();
            let data_path = resolve(&base, descriptor.data_path.as_deref());

            Ok(LoadedConfig {
                descriptor,
                config_path: Some(config_path),
                data_path,
            })
        }
        ConfigSource::Value(value) => {
            let mut descriptor = StoreDescriptor::from_value(value)?;
            let config_path = match descriptor.extra.remove("config_path") {
                Some(Value::String(path)) => Some(PathBuf::from(path)),
                Some(other) => {
                    return Err(StoreError::InvalidConfig(format!(
                        "config_path must be a string, got {other}"
                    )))
                }
                None => None,
            };
            let data_path = match (&config_path, descriptor.data_path.as_deref()) {
                (Some(config_path), data_path) => resolve(
                    config_path.parent().unwrap_or(Path::new("")),
                    data_path,
                ),
                (None, Some(data_path)) => PathBuf::from(data_path),
                (None, None) => {
                    return Err(StoreError::InvalidConfig(
                        "descriptor has neither data_path nor config_path".into(),
                    ))
                }
            };

            Ok(LoadedConfig {
                descriptor,
                config_path,
                data_path,
            })
        }
    }
}

/// Write a descriptor as pretty-printed JSON.
pub fn save_descriptor(path: &Path, descriptor: &StoreDescriptor) -> Result<()> {
    save_json(path, &serde_json::to_value(descriptor)?)
}

pub(crate) fn save_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

pub(crate) fn load_json(path: &Path) -> Result<Map<String, Value>> {
    match serde_json::from_slice(&fs::read(path)?)? {
        Value::Object(entries) => Ok(entries),
        other => Err(StoreError::InvalidConfig(format!(
            "{} holds {other}, not an object",
            path.display()
        ))),
    }
}

/// The descriptor file for `path`: itself if it ends in `.json`, otherwise
/// `path/config.json`.
pub fn config_file(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "json") {
        path.to_path_buf()
    } else {
        path.join(CONFIG_FILE)
    }
}

fn resolve(base: &Path, data_path: Option<&str>) -> PathBuf {
    match data_path {
        Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
        Some(path) => base.join(path),
        None => base.to_path_buf(),
    }
}

/// Express `path` relative to the directory `base`.
///
/// Both must exist.
pub fn relative_path(path: &Path, base: &Path) -> Result<PathBuf> {
    let path = fs::canonicalize(path)?;
    let base = fs::canonicalize(base)?;

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn descriptor() -> StoreDescriptor {
        StoreDescriptor {
            class_name: CLASS_NAME.into(),
            key_names: vec!["image".into()],
            data_size: 3,
            data_type: RecordType::Image,
            data_name: Some("image".into()),
            data_path: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_descriptor_json_layout() {
        let value = serde_json::to_value(descriptor()).unwrap();
        assert_eq!(
            value,
            json!({
                "_class_name": "RedbDataset",
                "_key_names": ["image"],
                "data_size": 3,
                "data_type": "image",
                "data_name": "image",
            })
        );
    }

    #[test]
    fn test_null_data_name_is_written() {
        let mut d = descriptor();
        d.data_type = RecordType::Dict;
        d.data_name = None;
        let value = serde_json::to_value(d).unwrap();
        assert_eq!(value["data_name"], Value::Null);
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut overrides = Map::new();
        overrides.insert("data_size".into(), json!(7));
        overrides.insert("source".into(), json!("laion"));

        let d = descriptor().with_overrides(overrides).unwrap();
        assert_eq!(d.data_size, 7);
        assert_eq!(d.extra["source"], "laion");
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut overrides = Map::new();
        overrides.insert("data_type".into(), json!("tensor"));
        assert!(matches!(
            descriptor().with_overrides(overrides),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store");
        save_descriptor(&store.join(CONFIG_FILE), &descriptor()).unwrap();

        let loaded = load_config(store.as_path()).unwrap();
        assert_eq!(loaded.descriptor, descriptor());
        assert_eq!(loaded.data_path, store);
        assert_eq!(loaded.config_path, Some(store.join(CONFIG_FILE)));

        let loaded = load_config(store.join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded.data_path, store);
    }

    #[test]
    fn test_relative_data_path_resolves_against_config() {
        let dir = TempDir::new().unwrap();
        let mut d = descriptor();
        d.data_path = Some("../store".into());
        let config = dir.path().join("exports").join("a.json");
        save_descriptor(&config, &d).unwrap();

        let loaded = load_config(config.as_path()).unwrap();
        assert_eq!(loaded.data_path, dir.path().join("exports").join("../store"));
    }

    #[test]
    fn test_load_from_value() {
        let mut value = serde_json::to_value(descriptor()).unwrap();
        value["data_path"] = json!("/data/shard-0");
        let loaded = load_config(value).unwrap();
        assert_eq!(loaded.data_path, PathBuf::from("/data/shard-0"));
        assert!(loaded.config_path.is_none());

        let value = serde_json::to_value(descriptor()).unwrap();
        assert!(matches!(load_config(value), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_relative_path() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("shards").join("0");
        let out = dir.path().join("exports");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&out).unwrap();

        assert_eq!(
            relative_path(&data, &out).unwrap(),
            PathBuf::from("../shards/0")
        );
        assert_eq!(relative_path(&out, &out).unwrap(), PathBuf::from("."));
    }
}

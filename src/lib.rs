//! # Sample Store
//!
//! A key-indexed, on-disk record store for machine-learning datasets, built
//! on the redb embedded B+tree.
//!
//! ## Core Concepts
//!
//! - **Records**: one sample per zero-based index, stored under the index's
//!   decimal string
//! - **Record types**: `image`, `video`, `numpy` or `dict`; a store holds one
//!   type only, fixed by its first write
//! - **Descriptor**: `config.json` beside the data, naming the type, size and
//!   field names of the store
//!
//! ## Example
//!
//! ```ignore
//! use sample_store::{ConfigOverrides, ReaderOptions, RecordReader, RecordType, RecordWriter};
//!
//! let mut writer = RecordWriter::create("./shard-0")?;
//! writer.write_image(0, "cat.jpg")?;
//! writer.write_image(1, "dog.png")?;
//! writer.write_config(ConfigOverrides::default())?;
//! writer.close()?;
//!
//! let reader = RecordReader::load("./shard-0")?;
//! assert_eq!(reader.len()?, 2);
//! let sample = reader.get(1)?;
//! let image = sample.field("image").and_then(|d| d.as_image());
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod records;
pub mod types;

// Re-exports
pub use config::{load_config, ConfigSource, LoadedConfig, StoreDescriptor};
pub use error::{Result, StoreError};
pub use media::{DType, Element, Image, ImageInput, MetadataValue, NdArray, VideoDecoder, VideoReader};
pub use records::{ConfigOverrides, ReaderOptions, RecordReader, RecordWriter, SaveMode, WriterOptions};
pub use types::*;

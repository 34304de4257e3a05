//! Record storage.
//!
//! Records live in a single redb table keyed by the decimal form of their
//! index. A [`RecordWriter`] fills a fresh store inside one write
//! transaction; a [`RecordReader`] serves random reads from it. Readers of one
//! store within a process share a single database handle.

pub mod codec;
mod reader;
mod shared;
mod writer;

pub use reader::{ReaderOptions, RecordReader, SaveMode};
pub use writer::{ConfigOverrides, RecordWriter, WriterOptions};

use redb::TableDefinition;

/// The one table of a store.
pub(crate) const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// Database file inside a store directory.
pub const DATA_FILE: &str = "data.redb";

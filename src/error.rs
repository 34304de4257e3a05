//! Error types for the sample store.

use crate::types::RecordType;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(u64),

    #[error("Record type mismatch: store holds {expected}, got {got}")]
    TypeMismatch { expected: RecordType, got: RecordType },

    #[error("Record type not fixed: nothing has been written")]
    TypeNotFixed,

    #[error("data_name cannot be set on a dict store")]
    DataNameOnDict,

    #[error("Record count mismatch: expected {expected}, store has {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Writer is closed")]
    WriterClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Image encode error: {0}")]
    ImageEncode(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

impl From<png::EncodingError> for StoreError {
    fn from(e: png::EncodingError) -> Self {
        StoreError::ImageEncode(e.to_string())
    }
}

impl From<image::ImageError> for StoreError {
    fn from(e: image::ImageError) -> Self {
        StoreError::ImageDecode(e.to_string())
    }
}

// redb splits its failures by stage; fold them all into `Database`.
macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Database(e.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

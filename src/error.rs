//! Error types for document storage and querying
//!
//! Every fallible operation in the crate returns [`Result`]. Backend failures
//! surface as [`Error::Storage`] and are passed through unmodified.

use crate::types::RowId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A native value has no mapping to a storage type
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// The target row's structural kind cannot accept the incoming value
    #[error("Illegal type: {0}")]
    IllegalType(String),

    /// An overwrite was attempted with an incompatible value kind
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: u64 },

    /// Malformed key or index argument, or an operation the node kind lacks
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Nesting depth exceeds limit of {0}")]
    NestingTooDeep(usize),

    #[error("Path syntax error at offset {position}: {message}")]
    PathSyntax { position: usize, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Row {0} not found")]
    RowNotFound(RowId),

    #[error("Document is closed")]
    DocumentClosed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::PathSyntax {
            position,
            message: message.into(),
        }
    }
}

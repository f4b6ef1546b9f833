//! # jsondb - JSON documents on a flat row store
//!
//! Decomposes nested JSON into typed rows linked by parent id, and reads them
//! back through cached JSONPath-style queries without materializing the whole
//! document.
//!
//! ## Modules
//!
//! - **feed**: turn incoming JSON into rows, merging objects and appending to arrays
//! - **query** / **path**: compile path expressions once and walk matches lazily
//! - **backend**: the storage contract plus in-memory and JSON-lines file stores
//! - **node** / **document**: typed handles and the session that owns them
//!
//! ## Quick Start
//!
//! ```rust
//! use jsondb::Document;
//! use serde_json::json;
//!
//! # fn main() -> jsondb::Result<()> {
//! let doc = Document::create(&json!({"x": [1, 2, 3]}), "memory://", true, None)?;
//!
//! let last = doc.query_first("$.x[-1]")?.expect("x has elements");
//! assert_eq!(last.value()?, json!(3));
//!
//! doc.get("x")?.expect("x exists").append(&json!(4))?;
//! doc.commit()?;
//! assert_eq!(doc.value()?, json!({"x": [1, 2, 3, 4]}));
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod feed;
pub mod import;
pub mod node;
pub mod path;
pub mod query;
pub mod types;

// Re-export commonly used types for convenience
pub use address::Address;
pub use backend::{Backend, MemoryBackend, RowCursor, RowFile};
pub use config::{DocumentConfig, DEFAULT_LINK_KEY};
pub use document::Document;
pub use error::{Error, Result};
pub use node::{Accessor, Node, NodeKind};
pub use path::{JsonPath, PathParser, Selector, StandardParser};
pub use query::QueryResult;
pub use types::{DataType, Row, RowId, RowValue};

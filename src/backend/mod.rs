//! Storage backend contract
//!
//! The decomposition and query engines reach physical storage only through
//! [`Backend`]. Any implementation satisfying it is interchangeable; the
//! crate ships an in-memory row store that can optionally persist to a
//! JSON-lines file.
//!
//! Lazy result streams are [`RowCursor`]s. A cursor holds no borrow of the
//! backend between steps; the caller lends the backend to each `advance`,
//! so a partially consumed stream can be dropped at any time.

pub mod file;
pub mod memory;

pub use file::RowFile;
pub use memory::MemoryBackend;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::path::JsonPath;
use crate::query::cursor::{PathCursor, SliceCursor};
use crate::types::{DataType, NewRow, Row, RowId, RowValue};
use serde_json::Value;
use std::rc::Rc;

/// Pull-based stream of rows
pub trait RowCursor {
    /// Perform just enough backend work to produce the next row
    fn advance(&mut self, backend: &dyn Backend) -> Result<Option<Row>>;
}

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

pub trait Backend {
    fn insert_root(&mut self, data_type: DataType, value: RowValue) -> Result<RowId>;

    fn insert(&mut self, parent: RowId, data_type: DataType, value: RowValue) -> Result<RowId>;

    /// Bulk-insert leaf rows, returning their ids in input order
    fn batch_insert(&mut self, rows: Vec<NewRow>) -> Result<Vec<RowId>> {
        rows.into_iter()
            .map(|row| self.insert(row.parent, row.data_type, row.value))
            .collect()
    }

    fn get_row(&self, id: RowId) -> Result<Option<Row>>;

    /// Direct children in stored order
    fn iter_children<'a>(&'a self, id: RowId) -> Result<RowIter<'a>>;

    /// Fails with `IndexOutOfRange` when `n` is past the last child
    fn get_nth_child(&self, id: RowId, n: u64) -> Result<Row>;

    /// Python-style slice over a list's elements
    fn iter_slice(
        &self,
        id: RowId,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Box<dyn RowCursor>> {
        let row = self.get_row(id)?.ok_or(Error::RowNotFound(id))?;
        if row.data_type != DataType::List {
            return Err(Error::TypeMismatch(format!(
                "cannot slice a {} row",
                row.data_type
            )));
        }
        Ok(Box::new(SliceCursor::new(id, row.count(), start, stop, step)?))
    }

    /// Look up an object property among a dict's direct children.
    /// Returns `(key_id, value_id)`.
    fn find_key(&self, name: &str, dict: RowId) -> Result<Option<(RowId, RowId)>>;

    /// Delete a row and its subtree. The caller adjusts the parent's count.
    fn remove(&mut self, id: RowId) -> Result<()>;

    /// Adjust a container's stored count
    fn increase_value(&mut self, id: RowId, delta: i64) -> Result<()>;

    /// Overwrite a leaf's payload; the type tag follows the new value.
    /// Fails with `TypeMismatch` on containers and keys.
    fn set_value(&mut self, id: RowId, value: &Value) -> Result<()>;

    fn update_link(&mut self, id: RowId, link: Option<Value>) -> Result<()>;

    fn get_link_key(&self) -> &str;

    fn set_link_key(&mut self, link_key: &str) -> Result<()>;

    /// Evaluate a compiled path against the subtree rooted at `parent`.
    /// With `one` set the stream ends after the first match.
    fn jsonpath(&self, path: Rc<JsonPath>, parent: RowId, one: bool) -> Result<Box<dyn RowCursor>> {
        Ok(Box::new(PathCursor::new(path, parent, one)))
    }

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Id of the document root, if one has been inserted
    fn get_root(&self) -> Result<Option<RowId>>;

    fn get_root_type(&self) -> Result<DataType> {
        let root = self
            .get_root()?
            .ok_or_else(|| Error::Storage("document has no root row".to_string()))?;
        let row = self.get_row(root)?.ok_or(Error::RowNotFound(root))?;
        Ok(row.data_type)
    }

    fn get_path(&self) -> &Address;

    /// Every row of the document in tree order (parents before children,
    /// siblings in stored order)
    fn dump_rows(&self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let Some(root) = self.get_root()? else {
            return Ok(rows);
        };
        let root = self.get_row(root)?.ok_or(Error::RowNotFound(root))?;
        let mut stack = vec![root];
        while let Some(row) = stack.pop() {
            let children = self.iter_children(row.id)?.collect::<Result<Vec<_>>>()?;
            rows.push(row);
            stack.extend(children.into_iter().rev());
        }
        Ok(rows)
    }
}

/// Open the backend an address names
pub fn open(address: &Address, overwrite: bool) -> Result<Box<dyn Backend>> {
    match address.driver() {
        "memory" => Ok(Box::new(MemoryBackend::new(address.clone()))),
        "file" => {
            let path = address.database.as_deref().ok_or_else(|| {
                Error::InvalidAddress(format!("'{}' names no file path", address))
            })?;
            let backend = MemoryBackend::with_file(address.clone(), RowFile::new(path), overwrite)?;
            Ok(Box::new(backend))
        }
        other => Err(Error::InvalidAddress(format!(
            "unsupported driver '{}'",
            other
        ))),
    }
}

//! Decomposition of JSON values into rows
//!
//! Objects merge into dicts, arrays always become fresh lists, scalars are
//! queued and written with one `batch_insert` when the feed finishes. Nothing
//! here commits; the caller owns the transaction.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{leaf_payload, DataType, NewRow, RowId, RowValue};
use serde_json::{Map, Value};
use tracing::debug;

pub struct Decomposer<'a> {
    backend: &'a mut dyn Backend,
    link_key: String,
    max_depth: usize,
    created: Vec<RowId>,
    pending: Vec<NewRow>,
}

impl<'a> Decomposer<'a> {
    /// Uses the backend's current link key
    pub fn new(backend: &'a mut dyn Backend, max_depth: usize) -> Self {
        let link_key = backend.get_link_key().to_string();
        Decomposer {
            backend,
            link_key,
            max_depth,
            created: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Feed one value under `target` and flush. Returns every new row id in
    /// the order the rows were written.
    pub fn feed(mut self, value: &Value, target: RowId) -> Result<Vec<RowId>> {
        self.push(value, target)?;
        self.finish()
    }

    /// Feed one value without flushing queued scalars yet
    pub fn push(&mut self, value: &Value, target: RowId) -> Result<()> {
        let row = self
            .backend
            .get_row(target)?
            .ok_or(Error::RowNotFound(target))?;
        self.feed_into(value, target, row.data_type, 0)
    }

    /// Write queued scalars in one batch
    pub fn finish(mut self) -> Result<Vec<RowId>> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let ids = self.backend.batch_insert(pending)?;
            self.created.extend(ids);
        }
        debug!(target: "jsondb::feed", rows = self.created.len(), "feed finished");
        Ok(self.created)
    }

    /// Route `value` by the kind of the target row.
    ///
    /// A scalar root is never promoted to a container: its kind is fixed at
    /// creation, so feeding it (like feeding any leaf) fails with `IllegalType`.
    fn feed_into(&mut self, value: &Value, target: RowId, target_type: DataType, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::NestingTooDeep(self.max_depth));
        }

        match (target_type, value) {
            (DataType::Dict, Value::Object(map)) => self.feed_object(map, target, depth),
            (DataType::Dict, other) => Err(Error::IllegalType(format!(
                "cannot feed {} into DICT row {}; only objects merge into objects",
                DataType::of(other)?,
                target
            ))),
            (DataType::List | DataType::Key, Value::Object(map)) => {
                let dict = self.insert_row(target, target_type, DataType::Dict, RowValue::Count(0))?;
                self.feed_object(map, dict, depth + 1)
            }
            (DataType::List | DataType::Key, Value::Array(items)) => {
                let list = self.insert_row(target, target_type, DataType::List, RowValue::Count(0))?;
                for item in items {
                    self.feed_into(item, list, DataType::List, depth + 1)?;
                }
                Ok(())
            }
            (DataType::List | DataType::Key, scalar) => self.queue_scalar(scalar, target, target_type),
            (leaf, _) => Err(Error::IllegalType(format!(
                "{} row {} cannot hold children",
                leaf, target
            ))),
        }
    }

    /// Merge properties into an existing dict, replacing same-named keys
    fn feed_object(&mut self, map: &Map<String, Value>, dict: RowId, depth: usize) -> Result<()> {
        for (name, value) in map {
            if *name == self.link_key {
                self.backend.update_link(dict, Some(value.clone()))?;
                continue;
            }

            if let Some((key, _)) = self.backend.find_key(name, dict)? {
                debug!(target: "jsondb::feed", key = %name, dict = %dict, "replacing existing key");
                self.backend.remove(key)?;
                self.backend.increase_value(dict, -1)?;
            }

            let key = self.insert_row(dict, DataType::Dict, DataType::Key, RowValue::Str(name.clone()))?;
            self.feed_into(value, key, DataType::Key, depth)?;
        }
        Ok(())
    }

    fn queue_scalar(&mut self, value: &Value, parent: RowId, parent_type: DataType) -> Result<()> {
        let (data_type, payload) = leaf_payload(value)?;
        self.pending.push(NewRow {
            parent,
            data_type,
            value: payload,
        });
        if parent_type.is_container() {
            self.backend.increase_value(parent, 1)?;
        }
        Ok(())
    }

    fn insert_row(&mut self, parent: RowId, parent_type: DataType, data_type: DataType, value: RowValue) -> Result<RowId> {
        let id = self.backend.insert(parent, data_type, value)?;
        if parent_type.is_container() {
            self.backend.increase_value(parent, 1)?;
        }
        self.created.push(id);
        Ok(id)
    }
}

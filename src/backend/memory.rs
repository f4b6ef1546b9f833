//! In-memory row store with an undo journal
//!
//! Every mutation since the last commit is journaled; `rollback` replays the
//! journal backwards. When a [`RowFile`] is attached, `commit` also writes the
//! whole tree to it and opening reloads the last committed state.

use super::{Backend, RowFile, RowIter};
use crate::address::Address;
use crate::config::DEFAULT_LINK_KEY;
use crate::error::{Error, Result};
use crate::types::{leaf_payload, DataType, NewRow, Row, RowId, RowValue};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Slot {
    row: Row,
    children: Vec<RowId>,
}

/// Reverse operation for one journaled mutation
#[derive(Debug)]
enum Undo {
    Inserted(RowId),
    Removed {
        position: usize,
        slots: Vec<Slot>,
    },
    Value {
        id: RowId,
        data_type: DataType,
        value: RowValue,
    },
    Link {
        id: RowId,
        link: Option<Value>,
    },
    LinkKey(String),
    Root(Option<RowId>),
}

pub struct MemoryBackend {
    address: Address,
    slots: HashMap<RowId, Slot>,
    root: Option<RowId>,
    next_id: u64,
    link_key: String,
    journal: Vec<Undo>,
    file: Option<RowFile>,
    closed: bool,
}

impl MemoryBackend {
    pub fn new(address: Address) -> Self {
        MemoryBackend {
            address,
            slots: HashMap::new(),
            root: None,
            next_id: 1,
            link_key: String::from(DEFAULT_LINK_KEY),
            journal: Vec::new(),
            file: None,
            closed: false,
        }
    }

    /// A store persisted to `file` on every commit. Unless `overwrite` is
    /// set, the last committed contents of the file are loaded.
    pub fn with_file(address: Address, file: RowFile, overwrite: bool) -> Result<Self> {
        let mut backend = MemoryBackend::new(address);

        if !overwrite {
            if let Some(snapshot) = file.load()? {
                backend.root = snapshot.header.root;
                backend.next_id = snapshot.header.next_id;
                backend.link_key = snapshot.header.link_key;
                for row in snapshot.rows {
                    if let Some(parent) = row.parent {
                        backend.slot_mut(parent)?.children.push(row.id);
                    }
                    backend.slots.insert(
                        row.id,
                        Slot {
                            row,
                            children: Vec::new(),
                        },
                    );
                }
                info!(
                    target: "jsondb::backend",
                    path = %file.path().display(),
                    rows = backend.slots.len(),
                    "loaded committed rows"
                );
            }
        }

        backend.file = Some(file);
        Ok(backend)
    }

    /// Number of stored rows, uncommitted ones included
    pub fn row_count(&self) -> usize {
        self.slots.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Storage(format!("backend '{}' is closed", self.address)))
        } else {
            Ok(())
        }
    }

    fn slot(&self, id: RowId) -> Result<&Slot> {
        self.slots.get(&id).ok_or(Error::RowNotFound(id))
    }

    fn slot_mut(&mut self, id: RowId) -> Result<&mut Slot> {
        self.slots.get_mut(&id).ok_or(Error::RowNotFound(id))
    }

    fn allocate(&mut self) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        id
    }

    fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::Inserted(id) => {
                if let Some(slot) = self.slots.remove(&id) {
                    if let Some(parent) = slot.row.parent.and_then(|p| self.slots.get_mut(&p)) {
                        if let Some(position) = parent.children.iter().rposition(|c| *c == id) {
                            parent.children.remove(position);
                        }
                    }
                }
            }
            Undo::Removed { position, slots } => {
                let Some(top) = slots.first() else {
                    return;
                };
                if let Some(parent) = top.row.parent.and_then(|p| self.slots.get_mut(&p)) {
                    let position = position.min(parent.children.len());
                    parent.children.insert(position, top.row.id);
                }
                for slot in slots {
                    self.slots.insert(slot.row.id, slot);
                }
            }
            Undo::Value {
                id,
                data_type,
                value,
            } => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.row.data_type = data_type;
                    slot.row.value = value;
                }
            }
            Undo::Link { id, link } => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.row.link = link;
                }
            }
            Undo::LinkKey(link_key) => self.link_key = link_key,
            Undo::Root(root) => self.root = root,
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let rows = self.dump_rows()?;
        file.save(self.root, self.next_id, &self.link_key, &rows)
    }
}

impl Backend for MemoryBackend {
    fn insert_root(&mut self, data_type: DataType, value: RowValue) -> Result<RowId> {
        self.ensure_open()?;
        if let Some(root) = self.root {
            return Err(Error::Storage(format!(
                "document at '{}' already has root {}",
                self.address, root
            )));
        }
        let id = self.allocate();
        self.slots.insert(
            id,
            Slot {
                row: Row::new(id, None, data_type, value),
                children: Vec::new(),
            },
        );
        self.journal.push(Undo::Root(self.root));
        self.journal.push(Undo::Inserted(id));
        self.root = Some(id);
        Ok(id)
    }

    fn insert(&mut self, parent: RowId, data_type: DataType, value: RowValue) -> Result<RowId> {
        self.ensure_open()?;
        self.slot(parent)?;
        let id = self.allocate();
        self.slots.insert(
            id,
            Slot {
                row: Row::new(id, Some(parent), data_type, value),
                children: Vec::new(),
            },
        );
        self.slot_mut(parent)?.children.push(id);
        self.journal.push(Undo::Inserted(id));
        Ok(id)
    }

    fn batch_insert(&mut self, rows: Vec<NewRow>) -> Result<Vec<RowId>> {
        self.ensure_open()?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.insert(row.parent, row.data_type, row.value)?);
        }
        debug!(target: "jsondb::backend", rows = ids.len(), "batch insert");
        Ok(ids)
    }

    fn get_row(&self, id: RowId) -> Result<Option<Row>> {
        self.ensure_open()?;
        Ok(self.slots.get(&id).map(|slot| slot.row.clone()))
    }

    fn iter_children<'a>(&'a self, id: RowId) -> Result<RowIter<'a>> {
        self.ensure_open()?;
        let slot = self.slot(id)?;
        Ok(Box::new(
            slot.children
                .iter()
                .map(move |child| self.slot(*child).map(|s| s.row.clone())),
        ))
    }

    fn get_nth_child(&self, id: RowId, n: u64) -> Result<Row> {
        self.ensure_open()?;
        let slot = self.slot(id)?;
        let child = usize::try_from(n)
            .ok()
            .and_then(|n| slot.children.get(n))
            .ok_or(Error::IndexOutOfRange {
                index: i64::try_from(n).unwrap_or(i64::MAX),
                len: slot.children.len() as u64,
            })?;
        Ok(self.slot(*child)?.row.clone())
    }

    fn find_key(&self, name: &str, dict: RowId) -> Result<Option<(RowId, RowId)>> {
        self.ensure_open()?;
        for child in &self.slot(dict)?.children {
            let key = self.slot(*child)?;
            if key.row.data_type == DataType::Key && key.row.value.as_str() == Some(name) {
                let value = key.children.first().copied().ok_or_else(|| {
                    Error::Storage(format!("key {} has no value row", key.row.id))
                })?;
                return Ok(Some((key.row.id, value)));
            }
        }
        Ok(None)
    }

    fn remove(&mut self, id: RowId) -> Result<()> {
        self.ensure_open()?;
        let parent = self.slot(id)?.row.parent.ok_or_else(|| {
            Error::UnsupportedOperation("the document root cannot be removed".to_string())
        })?;

        let siblings = &mut self.slot_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|c| *c == id)
            .ok_or(Error::RowNotFound(id))?;
        siblings.remove(position);

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(slot) = self.slots.remove(&next) {
                pending.extend(slot.children.iter().copied());
                removed.push(slot);
            }
        }
        self.journal.push(Undo::Removed {
            position,
            slots: removed,
        });
        Ok(())
    }

    fn increase_value(&mut self, id: RowId, delta: i64) -> Result<()> {
        self.ensure_open()?;
        let slot = self.slot_mut(id)?;
        let RowValue::Count(count) = slot.row.value else {
            return Err(Error::TypeMismatch(format!(
                "{} row {} holds no count",
                slot.row.data_type, id
            )));
        };
        let updated = count
            .checked_add_signed(delta)
            .ok_or_else(|| Error::Storage(format!("count of {} would underflow", id)))?;
        let previous = Undo::Value {
            id,
            data_type: slot.row.data_type,
            value: slot.row.value.clone(),
        };
        slot.row.value = RowValue::Count(updated);
        self.journal.push(previous);
        Ok(())
    }

    fn set_value(&mut self, id: RowId, value: &Value) -> Result<()> {
        self.ensure_open()?;
        let (data_type, payload) = leaf_payload(value)?;
        let slot = self.slot_mut(id)?;
        if !slot.row.data_type.is_leaf() {
            return Err(Error::TypeMismatch(format!(
                "cannot overwrite {} row {} with a scalar",
                slot.row.data_type, id
            )));
        }
        let previous = Undo::Value {
            id,
            data_type: slot.row.data_type,
            value: std::mem::replace(&mut slot.row.value, payload),
        };
        slot.row.data_type = data_type;
        self.journal.push(previous);
        Ok(())
    }

    fn update_link(&mut self, id: RowId, link: Option<Value>) -> Result<()> {
        self.ensure_open()?;
        let slot = self.slot_mut(id)?;
        let previous = std::mem::replace(&mut slot.row.link, link);
        self.journal.push(Undo::Link { id, link: previous });
        Ok(())
    }

    fn get_link_key(&self) -> &str {
        &self.link_key
    }

    fn set_link_key(&mut self, link_key: &str) -> Result<()> {
        self.ensure_open()?;
        let previous = std::mem::replace(&mut self.link_key, link_key.to_string());
        self.journal.push(Undo::LinkKey(previous));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.persist()?;
        debug!(
            target: "jsondb::backend",
            changes = self.journal.len(),
            "commit"
        );
        self.journal.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let changes = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            self.undo(undo);
        }
        debug!(target: "jsondb::backend", changes, "rollback");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.journal.is_empty() {
            warn!(
                target: "jsondb::backend",
                address = %self.address,
                changes = self.journal.len(),
                "closing with uncommitted changes; discarding them"
            );
            self.rollback()?;
        }
        self.closed = true;
        Ok(())
    }

    fn get_root(&self) -> Result<Option<RowId>> {
        self.ensure_open()?;
        Ok(self.root)
    }

    fn get_path(&self) -> &Address {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_list() -> (MemoryBackend, RowId) {
        let mut backend = MemoryBackend::new(Address::memory());
        let root = backend.insert_root(DataType::List, RowValue::Count(0)).unwrap();
        for i in 0..3 {
            backend.insert(root, DataType::Int, RowValue::Int(i)).unwrap();
            backend.increase_value(root, 1).unwrap();
        }
        backend.commit().unwrap();
        (backend, root)
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let (backend, root) = store_with_list();
        let values: Vec<Value> = backend
            .iter_children(root)
            .unwrap()
            .map(|row| row.unwrap().leaf_value())
            .collect();
        assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(backend.get_nth_child(root, 2).unwrap().leaf_value(), json!(2));
        assert!(matches!(
            backend.get_nth_child(root, 3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_rollback_restores_committed_state() {
        let (mut backend, root) = store_with_list();
        let before = backend.dump_rows().unwrap();

        let second = backend.get_nth_child(root, 1).unwrap().id;
        backend.remove(second).unwrap();
        backend.increase_value(root, -1).unwrap();
        backend.insert(root, DataType::Str, RowValue::Str("x".into())).unwrap();
        let first = backend.get_nth_child(root, 0).unwrap().id;
        backend.set_value(first, &json!("changed")).unwrap();
        backend.update_link(root, Some(json!("elsewhere"))).unwrap();

        backend.rollback().unwrap();
        assert_eq!(backend.dump_rows().unwrap(), before);
    }

    #[test]
    fn test_find_key_and_remove_subtree() {
        let mut backend = MemoryBackend::new(Address::memory());
        let root = backend.insert_root(DataType::Dict, RowValue::Count(0)).unwrap();
        let key = backend.insert(root, DataType::Key, RowValue::Str("a".into())).unwrap();
        let list = backend.insert(key, DataType::List, RowValue::Count(0)).unwrap();
        backend.insert(list, DataType::Nil, RowValue::Null).unwrap();

        assert_eq!(backend.find_key("a", root).unwrap(), Some((key, list)));
        assert_eq!(backend.find_key("b", root).unwrap(), None);

        backend.remove(key).unwrap();
        assert_eq!(backend.row_count(), 1);
        assert_eq!(backend.find_key("a", root).unwrap(), None);
    }

    #[test]
    fn test_set_value_rejects_containers() {
        let (mut backend, root) = store_with_list();
        assert!(matches!(
            backend.set_value(root, &json!(1)),
            Err(Error::TypeMismatch(_))
        ));
        let leaf = backend.get_nth_child(root, 0).unwrap().id;
        assert!(matches!(
            backend.set_value(leaf, &json!([1])),
            Err(Error::TypeMismatch(_))
        ));
        backend.set_value(leaf, &json!("now a string")).unwrap();
        assert_eq!(backend.get_row(leaf).unwrap().unwrap().data_type, DataType::Str);
    }

    #[test]
    fn test_closed_backend_refuses_work() {
        let (mut backend, root) = store_with_list();
        backend.insert(root, DataType::Nil, RowValue::Null).unwrap();
        backend.close().unwrap();
        assert!(matches!(backend.get_row(root), Err(Error::Storage(_))));
    }
}

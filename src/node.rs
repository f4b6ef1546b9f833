//! Typed handles over stored rows
//!
//! A [`Node`] is a row id plus a weak reference to its document session.
//! Reads always go to the backend, so a handle never serves stale data after
//! another handle mutated the same rows.

use crate::document::Session;
use crate::error::{Error, Result};
use crate::path::JsonPath;
use crate::query::cursor::resolve_index;
use crate::query::{build_node, QueryResult};
use crate::types::{DataType, Row, RowId};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Behavior family of a node, selected by its type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
    String,
    Scalar,
}

impl NodeKind {
    pub fn of(data_type: DataType) -> Self {
        match data_type {
            DataType::Dict | DataType::Key => NodeKind::Object,
            DataType::List => NodeKind::Array,
            DataType::Str | DataType::UnicodeStr => NodeKind::String,
            DataType::Nil | DataType::Bool | DataType::Int | DataType::Float => NodeKind::Scalar,
        }
    }
}

/// One-level child accessor: a property name or a list position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Key(String),
    Index(i64),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Key(name) => write!(f, "'{}'", name),
            Accessor::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for Accessor {
    fn from(name: &str) -> Self {
        Accessor::Key(name.to_string())
    }
}

impl From<String> for Accessor {
    fn from(name: String) -> Self {
        Accessor::Key(name)
    }
}

impl From<i64> for Accessor {
    fn from(index: i64) -> Self {
        Accessor::Index(index)
    }
}

impl From<i32> for Accessor {
    fn from(index: i32) -> Self {
        Accessor::Index(i64::from(index))
    }
}

impl From<usize> for Accessor {
    fn from(index: usize) -> Self {
        Accessor::Index(i64::try_from(index).unwrap_or(i64::MAX))
    }
}

impl TryFrom<&Value> for Accessor {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) => Ok(Accessor::Key(name.clone())),
            Value::Number(n) => n.as_i64().map(Accessor::Index).ok_or_else(|| {
                Error::UnsupportedOperation(format!("{} is not a usable index", n))
            }),
            other => Err(Error::UnsupportedOperation(format!(
                "{} cannot address a child",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    session: Weak<Session>,
    id: RowId,
    /// Leaf overwrites may change the tag; containers keep theirs
    data_type: Cell<DataType>,
}

impl Node {
    pub(crate) fn from_row(session: Weak<Session>, row: &Row) -> Self {
        Node {
            session,
            id: row.id,
            data_type: Cell::new(row.data_type),
        }
    }

    fn session(&self) -> Result<Rc<Session>> {
        self.session.upgrade().ok_or(Error::DocumentClosed)
    }

    fn row(&self, session: &Session) -> Result<Row> {
        let row = session
            .backend()?
            .get_row(self.id)?
            .ok_or(Error::RowNotFound(self.id))?;
        self.data_type.set(row.data_type);
        Ok(row)
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type.get()
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::of(self.data_type())
    }

    /// Materialize the subtree under this node
    pub fn value(&self) -> Result<Value> {
        let session = self.session()?;
        let row = self.row(&session)?;
        let backend = session.backend()?;
        let value = build_node(&*backend, row)?;
        Ok(value)
    }

    /// Out-of-band link stored on this row
    pub fn link(&self) -> Result<Option<Value>> {
        let session = self.session()?;
        Ok(self.row(&session)?.link)
    }

    pub fn set_link(&self, link: Option<Value>) -> Result<()> {
        let session = self.session()?;
        let mut backend = session.backend_mut()?;
        backend.update_link(self.id, link)
    }

    /// Child count of a container, character count of a string
    pub fn len(&self) -> Result<u64> {
        let session = self.session()?;
        let row = self.row(&session)?;
        match row.data_type {
            DataType::Dict | DataType::List => Ok(row.count()),
            data_type if data_type.is_string() => {
                Ok(row.value.as_str().map_or(0, |s| s.chars().count() as u64))
            }
            other => Err(Error::UnsupportedOperation(format!("{} has no length", other))),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Decompose `value` under this node: objects merge into an object,
    /// anything fed to an array becomes one new element.
    pub fn feed(&self, value: &Value) -> Result<Vec<RowId>> {
        self.session()?.feed(value, self.id)
    }

    /// Add `value` as the last element of an array
    pub fn append(&self, value: &Value) -> Result<Vec<RowId>> {
        self.expect_kind(NodeKind::Array, "append")?;
        self.feed(value)
    }

    /// Add each element of `values` to an array individually
    pub fn extend<'v, I>(&self, values: I) -> Result<Vec<RowId>>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        self.expect_kind(NodeKind::Array, "extend")?;
        self.session()?.feed_each(values, self.id)
    }

    /// Merge an object's properties, replacing same-named keys
    pub fn merge(&self, value: &Value) -> Result<Vec<RowId>> {
        self.expect_kind(NodeKind::Object, "merge")?;
        if !value.is_object() {
            return Err(Error::TypeMismatch(format!(
                "cannot merge {} into an object",
                DataType::of(value)?
            )));
        }
        self.feed(value)
    }

    /// Direct child by property name or list position; never parsed as a path.
    ///
    /// Missing properties and accessors of the other container kind give
    /// `None`; positions outside `[-len, len)` fail with `IndexOutOfRange`.
    pub fn get<A: Into<Accessor>>(&self, accessor: A) -> Result<Option<Node>> {
        let path = match (self.kind(), accessor.into()) {
            (NodeKind::Object, Accessor::Key(name)) => JsonPath::child(name),
            (NodeKind::Array, Accessor::Index(index)) => {
                let len = self.len()?;
                if resolve_index(index, len).is_none() {
                    return Err(Error::IndexOutOfRange { index, len });
                }
                JsonPath::index(index)
            }
            // a name on an array or a position on an object matches nothing
            (NodeKind::Object | NodeKind::Array, _) => return Ok(None),
            (_, accessor) => {
                return Err(Error::UnsupportedOperation(format!(
                    "{} has no child {}",
                    self.data_type(),
                    accessor
                )))
            }
        };
        self.evaluate(Rc::new(path), true)?.one()
    }

    /// Evaluate a path expression with this node as `$`
    pub fn query(&self, expression: &str) -> Result<QueryResult> {
        let path = self.session()?.compile(expression)?;
        self.evaluate(path, false)
    }

    /// First match of a path expression; evaluation stops there
    pub fn query_first(&self, expression: &str) -> Result<Option<Node>> {
        let path = self.session()?.compile(expression)?;
        self.evaluate(path, true)?.one()
    }

    fn evaluate(&self, path: Rc<JsonPath>, one: bool) -> Result<QueryResult> {
        let session = self.session()?;
        let cursor = session.backend()?.jsonpath(path, self.id, one)?;
        Ok(QueryResult::new(Rc::downgrade(&session), cursor))
    }

    /// Lazy slice of an array's elements
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<QueryResult> {
        self.expect_kind(NodeKind::Array, "slice")?;
        let session = self.session()?;
        let cursor = session.backend()?.iter_slice(self.id, start, stop, step)?;
        Ok(QueryResult::new(Rc::downgrade(&session), cursor))
    }

    /// Replace this node's content in place.
    ///
    /// Objects merge an incoming object, arrays swap their elements for the
    /// incoming array's, leaves take a new scalar. Other pairings fail with
    /// `TypeMismatch`.
    pub fn update(&self, value: &Value) -> Result<()> {
        let session = self.session()?;
        let row = self.row(&session)?;
        match (row.data_type, value) {
            (DataType::Dict, Value::Object(_)) => {
                session.feed(value, self.id)?;
            }
            (DataType::List, Value::Array(items)) => {
                {
                    let mut backend = session.backend_mut()?;
                    let children = backend
                        .iter_children(self.id)?
                        .map(|child| child.map(|row| row.id))
                        .collect::<Result<Vec<_>>>()?;
                    for child in children {
                        backend.remove(child)?;
                        backend.increase_value(self.id, -1)?;
                    }
                }
                session.feed_each(items, self.id)?;
            }
            (data_type, scalar) if data_type.is_leaf() && !scalar.is_array() && !scalar.is_object() => {
                session.backend_mut()?.set_value(self.id, scalar)?;
                self.data_type.set(DataType::of(scalar)?);
            }
            (data_type, other) => {
                return Err(Error::TypeMismatch(format!(
                    "cannot update {} with {}",
                    data_type,
                    DataType::of(other)?
                )))
            }
        }
        Ok(())
    }

    /// Assign a child. On an object an existing property of the same shape is
    /// updated in place, anything else replaces it. On an array the element at
    /// `index` is updated.
    pub fn set<A: Into<Accessor>>(&self, accessor: A, value: &Value) -> Result<()> {
        match (self.kind(), accessor.into()) {
            (NodeKind::Object, Accessor::Key(name)) => {
                if let Some(child) = self.get(name.as_str())? {
                    if same_shape(child.data_type(), value) {
                        return child.update(value);
                    }
                }
                let mut entry = Map::new();
                entry.insert(name, value.clone());
                self.feed(&Value::Object(entry))?;
                Ok(())
            }
            (NodeKind::Array, Accessor::Index(index)) => match self.get(index)? {
                Some(child) => child.update(value),
                None => Err(Error::IndexOutOfRange {
                    index,
                    len: self.len()?,
                }),
            },
            (_, accessor) => Err(Error::UnsupportedOperation(format!(
                "cannot assign {} on {}",
                accessor,
                self.data_type()
            ))),
        }
    }

    fn expect_kind(&self, kind: NodeKind, operation: &str) -> Result<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation(format!(
                "{} is not supported on {}",
                operation,
                self.data_type()
            )))
        }
    }
}

fn same_shape(data_type: DataType, value: &Value) -> bool {
    match value {
        Value::Object(_) => data_type == DataType::Dict,
        Value::Array(_) => data_type == DataType::List,
        _ => data_type.is_leaf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;

    fn document(value: Value) -> Document {
        Document::create(&value, "memory://", true, None).unwrap()
    }

    #[test]
    fn test_accessor_conversions() {
        assert_eq!(Accessor::from("a"), Accessor::Key("a".to_string()));
        assert_eq!(Accessor::from(-1), Accessor::Index(-1));
        assert_eq!(Accessor::try_from(&json!(2)).unwrap(), Accessor::Index(2));
        assert!(matches!(
            Accessor::try_from(&json!(true)),
            Err(Error::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Accessor::try_from(&json!(1.5)),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_array_bounds() {
        let doc = document(json!([10, 20, 30]));
        let root = doc.root();
        assert_eq!(root.get(-1).unwrap().unwrap().value().unwrap(), json!(30));
        assert_eq!(root.get(-3).unwrap().unwrap().value().unwrap(), json!(10));
        assert!(matches!(root.get(3), Err(Error::IndexOutOfRange { index: 3, len: 3 })));
        assert!(matches!(root.get(-4), Err(Error::IndexOutOfRange { index: -4, len: 3 })));
        assert!(root.get("a").unwrap().is_none());

        let object = document(json!({"a": 1}));
        assert!(object.root().get(0).unwrap().is_none());
        assert!(object.root().get("b").unwrap().is_none());
    }

    #[test]
    fn test_string_and_scalar_len() {
        let doc = document(json!({"s": "naïve", "n": 4}));
        let s = doc.root().get("s").unwrap().unwrap();
        assert_eq!(s.kind(), NodeKind::String);
        assert_eq!(s.len().unwrap(), 5);

        let n = doc.root().get("n").unwrap().unwrap();
        assert!(matches!(n.len(), Err(Error::UnsupportedOperation(_))));
        assert!(matches!(n.get("x"), Err(Error::UnsupportedOperation(_))));
    }

    #[test]
    fn test_update_by_kind() {
        let doc = document(json!({"list": [1, 2], "obj": {"a": 1}, "leaf": "x"}));
        let root = doc.root();

        let list = root.get("list").unwrap().unwrap();
        list.update(&json!([3])).unwrap();
        assert_eq!(list.value().unwrap(), json!([3]));
        assert_eq!(list.len().unwrap(), 1);

        let obj = root.get("obj").unwrap().unwrap();
        obj.update(&json!({"b": 2})).unwrap();
        assert_eq!(obj.value().unwrap(), json!({"a": 1, "b": 2}));

        let leaf = root.get("leaf").unwrap().unwrap();
        leaf.update(&json!(7)).unwrap();
        assert_eq!(leaf.data_type(), DataType::Int);
        assert_eq!(leaf.value().unwrap(), json!(7));

        assert!(matches!(leaf.update(&json!([1])), Err(Error::TypeMismatch(_))));
        assert!(matches!(list.update(&json!({"a": 1})), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_set_on_object_and_array() {
        let doc = document(json!({"a": 1, "l": [1, 2]}));
        let root = doc.root();
        root.set("a", &json!(2)).unwrap();
        root.set("b", &json!({"c": true})).unwrap();
        root.set("a", &json!([9])).unwrap();
        assert_eq!(root.value().unwrap(), json!({"a": [9], "b": {"c": true}, "l": [1, 2]}));
        assert_eq!(root.len().unwrap(), 3);

        let list = root.get("l").unwrap().unwrap();
        list.set(-1, &json!("last")).unwrap();
        assert_eq!(list.value().unwrap(), json!([1, "last"]));
        assert!(matches!(list.set(2, &json!(0)), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_append_versus_extend() {
        let doc = document(json!([]));
        let root = doc.root();
        root.append(&json!([1, 2])).unwrap();
        root.extend(&[json!(3), json!(4)]).unwrap();
        assert_eq!(root.value().unwrap(), json!([[1, 2], 3, 4]));
        assert_eq!(root.len().unwrap(), 3);
        assert!(matches!(root.merge(&json!({"a": 1})), Err(Error::UnsupportedOperation(_))));
    }

    #[test]
    fn test_links() {
        let doc = document(json!({"a": {}}));
        let a = doc.root().get("a").unwrap().unwrap();
        assert_eq!(a.link().unwrap(), None);
        a.set_link(Some(json!({"ref": 1}))).unwrap();
        assert_eq!(a.link().unwrap(), Some(json!({"ref": 1})));
        assert_eq!(a.value().unwrap(), json!({}));
    }

    #[test]
    fn test_closed_document() {
        let doc = document(json!({"a": 1}));
        let a = doc.root().get("a").unwrap().unwrap();
        doc.close().unwrap();
        assert!(matches!(a.value(), Err(Error::DocumentClosed)));
    }
}

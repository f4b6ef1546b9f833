//! Document sessions
//!
//! A [`Document`] owns the session: the backend, the compiled-path cache and
//! the feed limits. Nodes and query results only hold weak references to it,
//! so once the document is closed or dropped they fail with
//! [`Error::DocumentClosed`].

use crate::address::Address;
use crate::backend::{self, Backend};
use crate::config::DocumentConfig;
use crate::error::{Error, Result};
use crate::feed::Decomposer;
use crate::import;
use crate::node::{Accessor, Node};
use crate::path::{JsonPath, PathCache, PathParser};
use crate::query::QueryResult;
use crate::types::{leaf_payload, DataType, Row, RowId, RowValue};
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

pub(crate) struct Session {
    backend: RefCell<Box<dyn Backend>>,
    paths: RefCell<PathCache>,
    max_depth: usize,
}

impl Session {
    pub(crate) fn backend(&self) -> Result<Ref<'_, dyn Backend>> {
        let backend = self
            .backend
            .try_borrow()
            .map_err(|_| Error::Storage("backend is busy with a write".to_string()))?;
        Ok(Ref::map(backend, |b| &**b))
    }

    pub(crate) fn backend_mut(&self) -> Result<RefMut<'_, dyn Backend>> {
        let backend = self
            .backend
            .try_borrow_mut()
            .map_err(|_| Error::Storage("backend is busy".to_string()))?;
        Ok(RefMut::map(backend, |b| &mut **b))
    }

    pub(crate) fn compile(&self, expression: &str) -> Result<Rc<JsonPath>> {
        self.paths
            .try_borrow_mut()
            .map_err(|_| Error::Storage("path cache is busy".to_string()))?
            .compile(expression)
    }

    pub(crate) fn feed(&self, value: &Value, target: RowId) -> Result<Vec<RowId>> {
        let mut backend = self.backend_mut()?;
        Decomposer::new(&mut *backend, self.max_depth).feed(value, target)
    }

    /// Feed each value under `target` separately, flushing once at the end
    pub(crate) fn feed_each<'v, I>(&self, values: I, target: RowId) -> Result<Vec<RowId>>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let mut backend = self.backend_mut()?;
        let mut decomposer = Decomposer::new(&mut *backend, self.max_depth);
        for value in values {
            decomposer.push(value, target)?;
        }
        decomposer.finish()
    }
}

/// A JSON document decomposed into rows
pub struct Document {
    session: Rc<Session>,
    root: Node,
}

impl Document {
    /// Create a document at `address` holding `initial`.
    ///
    /// `link_key` replaces the reserved link property name when given.
    pub fn create(initial: &Value, address: &str, overwrite: bool, link_key: Option<&str>) -> Result<Self> {
        let mut config = DocumentConfig::default().overwrite(overwrite);
        if let Some(link_key) = link_key {
            config = config.link_key(link_key);
        }
        Self::create_with(initial, address, config)
    }

    pub fn create_with(initial: &Value, address: &str, config: DocumentConfig) -> Result<Self> {
        let address = Address::parse(address)?;
        let mut backend = backend::open(&address, config.overwrite)?;
        if let Some(root) = backend.get_root()? {
            return Err(Error::Storage(format!(
                "'{}' already holds a document rooted at {}",
                address, root
            )));
        }

        let data_type = DataType::of(initial)?;
        let value = if data_type.is_container() {
            RowValue::Count(0)
        } else {
            leaf_payload(initial)?.1
        };
        backend.set_link_key(&config.link_key)?;
        let root = backend.insert_root(data_type, value)?;

        let document = Document::from_backend(backend, root, &config)?;
        let filled = match initial {
            Value::Object(_) => document.session.feed(initial, root).map(|_| ()),
            Value::Array(items) => document.session.feed_each(items, root).map(|_| ()),
            _ => Ok(()),
        };
        match filled {
            Ok(()) => document.commit()?,
            Err(e) => {
                document.rollback()?;
                return Err(e);
            }
        }

        info!(
            target: "jsondb::document",
            address = %address,
            root_type = %data_type,
            "created document"
        );
        Ok(document)
    }

    /// Open the committed document at `address`
    pub fn load(address: &str) -> Result<Self> {
        Self::load_with(address, DocumentConfig::default().overwrite(false))
    }

    /// The stored link key wins over `config.link_key`
    pub fn load_with(address: &str, config: DocumentConfig) -> Result<Self> {
        let address = Address::parse(address)?;
        let backend = backend::open(&address, false)?;
        let root = backend
            .get_root()?
            .ok_or_else(|| Error::Storage(format!("'{}' holds no document", address)))?;
        info!(
            target: "jsondb::document",
            address = %address,
            root_type = %backend.get_root_type()?,
            "loaded document"
        );
        Document::from_backend(backend, root, &config)
    }

    /// Parse JSON from `reader` and store it as a new document in one step
    pub fn import<R: Read>(address: &str, reader: R, config: DocumentConfig) -> Result<Self> {
        let value = import::read_value(reader)?;
        Self::create_with(&value, address, config)
    }

    pub fn from_file<P: AsRef<Path>>(address: &str, path: P) -> Result<Self> {
        let value = import::read_file(path)?;
        Self::create_with(&value, address, DocumentConfig::default())
    }

    fn from_backend(backend: Box<dyn Backend>, root: RowId, config: &DocumentConfig) -> Result<Self> {
        let row = backend.get_row(root)?.ok_or(Error::RowNotFound(root))?;
        let session = Rc::new(Session {
            backend: RefCell::new(backend),
            paths: RefCell::new(PathCache::new(config.path_cache_capacity)),
            max_depth: config.max_depth,
        });
        let root = Node::from_row(Rc::downgrade(&session), &row);
        Ok(Document { session, root })
    }

    /// Replace the path parser; cached compilations are discarded
    pub fn with_parser(self, parser: Box<dyn PathParser>) -> Self {
        self.session.paths.borrow_mut().set_parser(parser);
        self
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn feed(&self, value: &Value) -> Result<Vec<RowId>> {
        self.root.feed(value)
    }

    pub fn query(&self, expression: &str) -> Result<QueryResult> {
        self.root.query(expression)
    }

    pub fn query_first(&self, expression: &str) -> Result<Option<Node>> {
        self.root.query_first(expression)
    }

    pub fn get<A: Into<Accessor>>(&self, accessor: A) -> Result<Option<Node>> {
        self.root.get(accessor)
    }

    pub fn value(&self) -> Result<Value> {
        self.root.value()
    }

    pub fn len(&self) -> Result<u64> {
        self.root.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.root.is_empty()
    }

    pub fn commit(&self) -> Result<()> {
        self.session.backend_mut()?.commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.session.backend_mut()?.rollback()
    }

    /// Run `f`, committing when it succeeds and rolling back when it fails
    pub fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Document) -> Result<T>,
    {
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = self.rollback() {
                    warn!(target: "jsondb::document", error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Close the backend. Uncommitted changes are discarded.
    pub fn close(self) -> Result<()> {
        self.session.backend_mut()?.close()
    }

    pub fn path(&self) -> Result<Address> {
        Ok(self.session.backend()?.get_path().clone())
    }

    pub fn link_key(&self) -> Result<String> {
        Ok(self.session.backend()?.get_link_key().to_string())
    }

    /// Change the reserved link property for later feeds
    pub fn set_link_key(&self, link_key: &str) -> Result<()> {
        self.session.backend_mut()?.set_link_key(link_key)
    }

    /// The whole document as JSON text
    pub fn dumps(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.value()?)?)
    }

    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let value = self.value()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &value)?;
        writer.flush()?;
        Ok(())
    }

    /// Every stored row in tree order
    pub fn dump_rows(&self) -> Result<Vec<Row>> {
        self.session.backend()?.dump_rows()
    }

    /// Containers whose stored count disagrees with their actual children
    pub fn check_counts(&self) -> Result<Vec<RowId>> {
        let backend = self.session.backend()?;
        let mut mismatched = Vec::new();
        for row in backend.dump_rows()? {
            if !row.data_type.is_container() {
                continue;
            }
            let actual = backend.iter_children(row.id)?.count() as u64;
            if actual != row.count() {
                mismatched.push(row.id);
            }
        }
        Ok(mismatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use serde_json::json;

    #[test]
    fn test_create_and_read_back() {
        let value = json!({"a": [1, {"b": null}], "c": "héllo"});
        let doc = Document::create(&value, "memory://", true, None).unwrap();
        assert_eq!(doc.value().unwrap(), value);
        assert_eq!(doc.len().unwrap(), 2);
        assert!(doc.check_counts().unwrap().is_empty());
    }

    #[test]
    fn test_scalar_root() {
        let doc = Document::create(&json!(42), "memory://", true, None).unwrap();
        assert_eq!(doc.value().unwrap(), json!(42));
        assert!(matches!(doc.feed(&json!({"a": 1})), Err(Error::IllegalType(_))));
        assert!(matches!(doc.feed(&json!([1])), Err(Error::IllegalType(_))));
        assert_eq!(doc.root().kind(), NodeKind::Scalar);
        assert_eq!(doc.value().unwrap(), json!(42));
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let doc = Document::create(&json!({"a": 1}), "memory://", true, None).unwrap();
        let result: Result<()> = doc.atomically(|doc| {
            doc.feed(&json!({"b": 2}))?;
            doc.feed(&json!([1]))?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::IllegalType(_))));
        assert_eq!(doc.value().unwrap(), json!({"a": 1}));

        doc.atomically(|doc| doc.feed(&json!({"b": 2}))).unwrap();
        doc.rollback().unwrap();
        assert_eq!(doc.value().unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_custom_link_key() {
        let doc = Document::create(&json!({"$ref": "x", "a": 1}), "memory://", true, Some("$ref")).unwrap();
        assert_eq!(doc.link_key().unwrap(), "$ref");
        assert_eq!(doc.value().unwrap(), json!({"a": 1}));
        assert_eq!(doc.root().link().unwrap(), Some(json!("x")));

        doc.set_link_key("@id").unwrap();
        doc.feed(&json!({"@id": 7, "$ref": "stored"})).unwrap();
        assert_eq!(doc.root().link().unwrap(), Some(json!(7)));
        assert_eq!(doc.value().unwrap(), json!({"a": 1, "$ref": "stored"}));
    }

    #[test]
    fn test_unknown_driver() {
        assert!(matches!(
            Document::create(&json!({}), "postgres://localhost/db", true, None),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_dumps() {
        let doc = Document::create(&json!([1, "two"]), "memory://", true, None).unwrap();
        assert_eq!(doc.dumps().unwrap(), r#"[1,"two"]"#);
        assert_eq!(doc.dump_rows().unwrap().len(), 3);
    }
}

//! Query evaluation and materialization
//!
//! A [`QueryResult`] is a lazy stream over matched rows. It keeps only a weak
//! reference to the document session and lends the backend to its cursor one
//! step at a time, so a partially read result can simply be dropped.

pub mod cursor;
pub mod materialize;

pub use materialize::build_node;

use crate::backend::RowCursor;
use crate::document::Session;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::types::Row;
use serde_json::Value;
use std::rc::Weak;

pub struct QueryResult {
    session: Weak<Session>,
    cursor: Box<dyn RowCursor>,
    done: bool,
}

impl QueryResult {
    pub(crate) fn new(session: Weak<Session>, cursor: Box<dyn RowCursor>) -> Self {
        QueryResult {
            session,
            cursor,
            done: false,
        }
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        let session = self.session.upgrade().ok_or(Error::DocumentClosed)?;
        let backend = session.backend()?;
        let row = self.cursor.advance(&*backend)?;
        if row.is_none() {
            self.done = true;
        }
        Ok(row)
    }

    /// First match, if any
    pub fn one(mut self) -> Result<Option<Node>> {
        Ok(self
            .next_row()?
            .map(|row| Node::from_row(self.session.clone(), &row)))
    }

    /// Every remaining match as a node handle
    pub fn nodes(self) -> Result<Vec<Node>> {
        self.collect()
    }

    /// Every remaining match, materialized
    pub fn values(self) -> Result<Vec<Value>> {
        self.into_values().collect()
    }

    /// Lazily materialize each match as it is pulled
    pub fn into_values(self) -> Values {
        Values { inner: self }
    }
}

impl Iterator for QueryResult {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(row) => row.map(|row| Ok(Node::from_row(self.session.clone(), &row))),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub struct Values {
    inner: QueryResult,
}

impl Iterator for Values {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.inner.next_row() {
            Ok(row) => row?,
            Err(e) => {
                self.inner.done = true;
                return Some(Err(e));
            }
        };
        Some(self.materialize(row))
    }
}

impl Values {
    fn materialize(&self, row: Row) -> Result<Value> {
        let session = self.inner.session.upgrade().ok_or(Error::DocumentClosed)?;
        let backend = session.backend()?;
        let value = build_node(&*backend, row)?;
        Ok(value)
    }
}

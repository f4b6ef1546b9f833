use super::ast::JsonPath;
use super::parser::{PathParser, StandardParser};
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Compiled path expressions keyed by their literal text.
///
/// Each distinct expression reaches the parser once while it stays cached.
pub struct PathCache {
    parser: Box<dyn PathParser>,
    compiled: LruCache<String, Rc<JsonPath>>,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_parser(Box::new(StandardParser), capacity)
    }

    pub fn with_parser(parser: Box<dyn PathParser>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PathCache {
            parser,
            compiled: LruCache::new(capacity),
        }
    }

    /// Swap the parser; previously compiled paths are dropped
    pub fn set_parser(&mut self, parser: Box<dyn PathParser>) {
        self.parser = parser;
        self.compiled.clear();
    }

    pub fn compile(&mut self, text: &str) -> Result<Rc<JsonPath>> {
        if let Some(path) = self.compiled.get(text) {
            return Ok(Rc::clone(path));
        }
        let path = Rc::new(self.parser.parse(text)?);
        tracing::trace!(target: "jsondb::path", expression = text, "compiled path");
        self.compiled.put(text.to_string(), Rc::clone(&path));
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

//! Path expressions - parsing, the compiled form, and the per-session cache

pub mod ast;
pub mod cache;
pub mod parser;

pub use ast::{JsonPath, Selector};
pub use cache::PathCache;
pub use parser::{PathParser, StandardParser};

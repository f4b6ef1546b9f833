use crate::backend::{Backend, RowIter};
use crate::error::Result;
use crate::types::{DataType, Row};
use serde_json::{Map, Value};

enum Shape {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Key(String, Option<Value>),
}

/// A finished subtree: a plain value, or one property from a key row
enum Built {
    Value(Value),
    Entry(String, Value),
}

impl Built {
    fn into_value(self) -> Value {
        match self {
            Built::Value(value) => value,
            Built::Entry(name, value) => {
                let mut map = Map::new();
                map.insert(name, value);
                Value::Object(map)
            }
        }
    }
}

struct Frame<'a> {
    shape: Shape,
    children: RowIter<'a>,
}

impl Frame<'_> {
    fn accept(&mut self, built: Built) {
        match (&mut self.shape, built) {
            (Shape::Object(map), Built::Entry(name, value)) => {
                map.insert(name, value);
            }
            (Shape::Object(map), Built::Value(Value::Object(entries))) => map.extend(entries),
            (Shape::Array(items), built) => items.push(built.into_value()),
            (Shape::Key(_, slot), built) => {
                if slot.is_none() {
                    *slot = Some(built.into_value());
                }
            }
            (Shape::Object(_), Built::Value(_)) => {}
        }
    }

    fn finish(self) -> Built {
        match self.shape {
            Shape::Object(map) => Built::Value(Value::Object(map)),
            Shape::Array(items) => Built::Value(Value::Array(items)),
            Shape::Key(name, value) => Built::Entry(name, value.unwrap_or(Value::Null)),
        }
    }
}

/// Start building `row`: leaves finish immediately, everything else opens a frame
fn open<'a>(backend: &'a dyn Backend, row: Row, stack: &mut Vec<Frame<'a>>) -> Result<Option<Built>> {
    let shape = match row.data_type {
        DataType::Dict => Shape::Object(Map::new()),
        DataType::List => Shape::Array(Vec::new()),
        DataType::Key => Shape::Key(row.value.as_str().unwrap_or_default().to_string(), None),
        _ => return Ok(Some(Built::Value(row.leaf_value()))),
    };
    stack.push(Frame {
        shape,
        children: backend.iter_children(row.id)?,
    });
    Ok(None)
}

/// Rebuild the JSON value stored under `row`.
///
/// Objects gather their key rows, arrays keep child order, containers without
/// children come back as `{}` / `[]`. A key row materializes as a one-entry
/// object. Uses an explicit stack, so depth is bounded only by memory.
pub fn build_node(backend: &dyn Backend, row: Row) -> Result<Value> {
    let mut stack = Vec::new();
    if let Some(built) = open(backend, row, &mut stack)? {
        return Ok(built.into_value());
    }

    while let Some(frame) = stack.last_mut() {
        let built = match frame.children.next() {
            Some(child) => match open(backend, child?, &mut stack)? {
                Some(built) => built,
                None => continue,
            },
            None => match stack.pop() {
                Some(frame) => frame.finish(),
                None => break,
            },
        };

        match stack.last_mut() {
            Some(parent) => parent.accept(built),
            None => return Ok(built.into_value()),
        }
    }

    Ok(Value::Null)
}

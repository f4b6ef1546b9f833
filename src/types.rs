use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Opaque identity of a stored row, stable for the row's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type tag carried by every row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    UnicodeStr,
    List,
    Dict,
    /// One object property; only ever a child of a `Dict`
    Key,
}

impl DataType {
    /// Map a JSON value onto its storage tag
    pub fn of(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Null => DataType::Nil,
            Value::Bool(_) => DataType::Bool,
            Value::Number(n) => {
                if n.as_i64().is_some() {
                    DataType::Int
                } else if n.is_f64() {
                    DataType::Float
                } else {
                    return Err(Error::UnsupportedType(format!(
                        "integer {} does not fit a signed 64-bit row",
                        n
                    )));
                }
            }
            Value::String(s) if s.is_ascii() => DataType::Str,
            Value::String(_) => DataType::UnicodeStr,
            Value::Array(_) => DataType::List,
            Value::Object(_) => DataType::Dict,
        })
    }

    pub fn is_container(self) -> bool {
        matches!(self, DataType::List | DataType::Dict)
    }

    pub fn is_string(self) -> bool {
        matches!(self, DataType::Str | DataType::UnicodeStr)
    }

    /// True for the six kinds that carry a direct scalar payload
    pub fn is_leaf(self) -> bool {
        !self.is_container() && self != DataType::Key
    }

    /// The value a container of this kind materializes to when it has no children
    pub fn initial_value(self) -> Value {
        match self {
            DataType::Dict => Value::Object(Map::new()),
            DataType::List => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Nil => "NIL",
            DataType::Bool => "BOOL",
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Str => "STR",
            DataType::UnicodeStr => "UNICODE_STR",
            DataType::List => "LIST",
            DataType::Dict => "DICT",
            DataType::Key => "KEY",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar payload of a row. Containers store their child count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Count(u64),
}

impl RowValue {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            RowValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Split a scalar JSON value into its storage tag and payload.
///
/// Arrays and objects are not leaves and fail with `TypeMismatch`.
pub fn leaf_payload(value: &Value) -> Result<(DataType, RowValue)> {
    let data_type = DataType::of(value)?;
    let payload = match value {
        Value::Null => RowValue::Null,
        Value::Bool(b) => RowValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RowValue::Int(i),
            None => RowValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => RowValue::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(Error::TypeMismatch(format!(
                "{} is not a scalar value",
                data_type
            )))
        }
    };
    Ok((data_type, payload))
}

/// One stored row of the decomposed tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,

    /// Structural parent; `None` marks the document root
    pub parent: Option<RowId>,

    pub data_type: DataType,

    pub value: RowValue,

    /// Out-of-band reference value, never counted as a child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Value>,
}

impl Row {
    pub fn new(id: RowId, parent: Option<RowId>, data_type: DataType, value: RowValue) -> Self {
        Row {
            id,
            parent,
            data_type,
            value,
            link: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Live child count of a container, zero for every other kind
    pub fn count(&self) -> u64 {
        if self.data_type.is_container() {
            self.value.as_count().unwrap_or(0)
        } else {
            0
        }
    }

    /// Decode the scalar payload by type tag.
    ///
    /// Containers decode to their empty initial value; a key decodes to its name.
    pub fn leaf_value(&self) -> Value {
        match (self.data_type, &self.value) {
            (DataType::Nil, _) => Value::Null,
            (DataType::Bool, RowValue::Bool(b)) => Value::Bool(*b),
            (DataType::Int, RowValue::Int(i)) => Value::from(*i),
            (DataType::Float, RowValue::Float(f)) => {
                Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
            }
            (DataType::Str | DataType::UnicodeStr | DataType::Key, RowValue::Str(s)) => {
                Value::String(s.clone())
            }
            (data_type, _) => data_type.initial_value(),
        }
    }
}

/// A leaf row waiting in a pending batch
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub parent: RowId,
    pub data_type: DataType,
    pub value: RowValue,
}

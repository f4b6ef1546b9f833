//! Parsing external JSON before it is fed
//!
//! simd-json handles the common case; anything it rejects is retried with
//! serde_json so error messages carry line and column.

use crate::error::Result;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Read one JSON document from `reader`
pub fn read_value<R: Read>(mut reader: R) -> Result<Value> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;

    // simd-json parses in place, so it gets its own copy
    let mut scratch = content.clone();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!(target: "jsondb::import", error = %e, "simd-json rejected input; retrying with serde_json");
            Ok(serde_json::from_slice(&content)?)
        }
    }
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Value> {
    read_value(BufReader::new(File::open(path)?))
}

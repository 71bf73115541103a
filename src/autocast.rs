//! Type normalization for decoded values.
//!
//! Sources hand back numbers as text (CSV always, JSON and Excel
//! sometimes). [`autocast`] walks a value recursively and rewrites every
//! text leaf that parses cleanly as an integer, or failing that as a float,
//! into the numeric type. Everything else is returned untouched.
//!
//! The rewrite is total and idempotent: it never fails, and running it on
//! its own output changes nothing.

use serde_json::Number;
use tracing::trace;

use crate::models::{Record, Value};

/// Normalize a value of any shape.
///
/// Sequences keep their order and mappings keep their keys and insertion
/// order; only text leaves can change type.
pub fn autocast(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(autocast).collect()),
        Value::Object(map) => Value::Object(autocast_record(map)),
        Value::String(text) => {
            trace!(value = %text, "evaluate value");
            match cast_text(&text) {
                Some(number) => {
                    trace!(value = %number, "casted to number");
                    number
                }
                None => {
                    trace!("fallback to string");
                    Value::String(text)
                }
            }
        }
        other => {
            trace!(value = %other, "keeping type");
            other
        }
    }
}

/// Normalize every value of a record, keeping key order.
pub fn autocast_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| (key, autocast(value)))
        .collect()
}

/// Integer first, then float. `None` keeps the text as it is.
///
/// Surrounding whitespace is ignored for the attempt. Integers wider than
/// `i64` fall through to `u64` and then to float; floats that are not
/// finite (`nan`, `inf`, overflow) have no numeric representation and stay
/// text.
pub fn cast_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    if let Ok(int) = trimmed.parse::<u64>() {
        return Some(Value::Number(int.into()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

//! Canonical string form of filter elements.
//!
//! Strings are taken verbatim, numbers and booleans use their display form,
//! arrays and objects are written as compact JSON with object keys sorted so
//! that two structurally equal values always hash to the same positions.

use super::{FilterError, FilterResult};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

pub fn canonical_form<T: Serialize + ?Sized>(element: &T) -> FilterResult<String> {
    let value = serde_json::to_value(element)
        .map_err(|e| FilterError::UnsupportedType(e.to_string()))?;
    canonical_value(&value)
}

pub fn canonical_value(value: &Value) -> FilterResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(FilterError::UnsupportedType(
            "null (or a non-finite number) has no canonical form".into(),
        )),
        Value::Array(_) | Value::Object(_) => {
            let mut out = String::new();
            write_sorted(value, &mut out)?;
            Ok(out)
        }
    }
}

fn write_sorted(value: &Value, out: &mut String) -> FilterResult<()> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_sorted(&map[key], out)?;
            }
            out.push('}');
        }
        scalar => {
            write!(out, "{}", scalar)
                .map_err(|e| FilterError::Serialization(e.to_string()))?;
        }
    }
    Ok(())
}

//! View key collation.
//!
//! Keys are ordered by type first, then by value within a type:
//!
//! `null < false < true < numbers < strings < arrays < objects`
//!
//! Arrays compare element by element, then by length. Objects compare their
//! members pairwise in insertion order (key first, then value), then by size.
//! Strings compare by code point, which is stricter than the Unicode collation
//! a real server applies but agrees with it on ASCII keys of a single case.

use serde_json::Value;
use std::cmp::Ordering;

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Compares two view keys.
pub fn collate(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| collate(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .zip(b)
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| collate(va, vb)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Returns `true` if both keys collate equal.
pub fn keys_equal(left: &Value, right: &Value) -> bool {
    collate(left, right).is_eq()
}

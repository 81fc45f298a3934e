//! Deep merge for layered settings.
//!
//! Rules: maps union with the higher layer winning per key (recursively);
//! lists concatenate lower-then-higher with duplicates removed, preserving
//! first occurrence; scalars take the higher value; an explicit `null` in
//! the higher layer leaves the lower value in place (null means "unset").
//! Inputs are never mutated.

use serde_json::{Map, Value};

/// Merge `higher` over `lower`, returning a new value.
pub fn merge_values(lower: &Value, higher: &Value) -> Value {
    match (lower, higher) {
        (_, Value::Null) => lower.clone(),
        (Value::Object(lo), Value::Object(hi)) => {
            let mut out: Map<String, Value> = lo.clone();
            for (key, hi_value) in hi {
                let merged = match lo.get(key) {
                    Some(lo_value) => merge_values(lo_value, hi_value),
                    None => hi_value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Array(lo), Value::Array(hi)) => {
            let mut out: Vec<Value> = Vec::with_capacity(lo.len() + hi.len());
            for item in lo.iter().chain(hi.iter()) {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        _ => higher.clone(),
    }
}

/// Fold a list of layers ordered lowest precedence first.
pub fn merge_layers<'a, I>(layers: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    layers
        .into_iter()
        .fold(Value::Object(Map::new()), |acc, layer| {
            merge_values(&acc, layer)
        })
}

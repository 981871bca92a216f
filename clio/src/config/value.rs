//! Helpers over `serde_yaml::Value` trees used while layering sources.

use serde_yaml::{Mapping, Number, Value};

/// Deep-merge `overlay` into `base`.
///
/// Mappings merge key by key; any other overlay value replaces the base
/// value. A null overlay (an empty YAML key) leaves the base untouched.
pub(crate) fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Every non-mapping value reachable through string keys, with its path.
pub(crate) fn leaves(value: &Value) -> Vec<(Vec<String>, Value)> {
    let mut out = Vec::new();
    collect_leaves(value, &mut Vec::new(), &mut out);
    out
}

fn collect_leaves(value: &Value, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, Value)>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if let Value::String(key) = key {
                    path.push(key.clone());
                    collect_leaves(child, path, out);
                    path.pop();
                }
            }
        }
        leaf if !path.is_empty() => out.push((path.clone(), leaf.clone())),
        _ => {}
    }
}

/// Look up a value by path.
pub(crate) fn get_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_mapping()?.get(key.as_str()))
}

/// Set a value by path, creating intermediate mappings as needed.
pub(crate) fn set_path(value: &mut Value, path: &[String], new: Value) {
    let Some((first, rest)) = path.split_first() else {
        *value = new;
        return;
    };

    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = value {
        let child = map
            .entry(Value::String(first.clone()))
            .or_insert(Value::Null);
        set_path(child, rest, new);
    }
}

/// Convert a raw string (from the environment or a flag) to a value shaped
/// like `existing`.
///
/// Returns `None` when the string cannot represent the existing type.
pub(crate) fn coerce(existing: Option<&Value>, raw: &str) -> Option<Value> {
    match existing {
        Some(Value::String(_)) => Some(Value::String(raw.to_string())),
        Some(Value::Bool(_)) => raw.trim().parse::<bool>().ok().map(Value::Bool),
        Some(Value::Number(current)) => parse_number(current, raw.trim()).map(Value::Number),
        Some(Value::Sequence(items)) => Some(Value::Sequence(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    coerce(items.first(), item).unwrap_or_else(|| Value::String(item.to_string()))
                })
                .collect(),
        )),
        _ => Some(
            serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        ),
    }
}

fn parse_number(current: &Number, raw: &str) -> Option<Number> {
    if current.is_f64() {
        return raw.parse::<f64>().ok().map(Number::from);
    }
    raw.parse::<i64>()
        .map(Number::from)
        .or_else(|_| raw.parse::<u64>().map(Number::from))
        .ok()
}

/// Environment variable name for a configuration path.
pub(crate) fn env_key(prefix: &str, path: &[String]) -> String {
    let mut key = String::from(prefix);
    for segment in path {
        key.push('_');
        key.push_str(segment);
    }
    key.to_uppercase().replace(['.', '-'], "_")
}

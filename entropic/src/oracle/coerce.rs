//! Table-driven normalization of loosely shaped step plans.
//!
//! Oracles frequently answer with near-miss field names (`files` for
//! `file_writes`, `command` for `cmd`) or scalars where lists are expected.
//! These tables map such shapes onto the canonical step plan before strict
//! schema validation. Keys outside the canonical set are dropped.

use serde_json::{Map, Value, json};

use crate::core::types::DEFAULT_COMMAND_TIMEOUT_SECS;

/// String fields: canonical key, then fallbacks in priority order.
const STRING_FIELDS: &[(&str, &[&str], &str)] = &[
    ("step_goal", &["objective", "goal", "step_id", "title"], ""),
    ("rationale", &["why", "objective", "notes"], ""),
];

/// List fields: canonical key, then alternate keys.
const LIST_FIELDS: &[(&str, &[&str])] = &[
    ("file_writes", &["files"]),
    ("commands", &["cmds"]),
    ("expected_outcomes", &["outcomes"]),
    ("new_tasks", &[]),
    ("notes", &[]),
];

const FILE_WRITE_FIELDS: &[(&str, &[&str], &str)] = &[
    ("path", &["file", "name"], ""),
    ("content", &[], ""),
    ("mode", &[], "overwrite"),
];

const COMMAND_FIELDS: &[(&str, &[&str], &str)] = &[
    ("cmd", &["command"], ""),
    ("purpose", &["why"], "Run command"),
];

/// Normalize a step plan value. Non-objects are returned unchanged so schema
/// validation reports them.
pub fn coerce_step_plan(value: Value) -> Value {
    let Value::Object(raw) = value else {
        return value;
    };

    let mut out = Map::new();
    for &(key, aliases, default) in STRING_FIELDS {
        out.insert(
            key.to_string(),
            Value::String(first_string(&raw, key, aliases).unwrap_or(default).to_string()),
        );
    }
    for &(key, aliases) in LIST_FIELDS {
        let found = std::iter::once(key)
            .chain(aliases.iter().copied())
            .find_map(|k| raw.get(k).filter(|v| !v.is_null()));
        let items = found.map(|v| ensure_list(v.clone())).unwrap_or_default();
        let items = match key {
            "file_writes" => items
                .into_iter()
                .filter_map(|item| coerce_object(item, FILE_WRITE_FIELDS, "path"))
                .map(Value::Object)
                .collect(),
            "commands" => coerce_commands(items),
            _ => items,
        };
        out.insert(key.to_string(), Value::Array(items));
    }
    Value::Object(out)
}

fn coerce_commands(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter_map(|item| {
            let timeout = item
                .get("timeout_sec")
                .filter(|v| v.is_u64())
                .cloned()
                .unwrap_or_else(|| json!(DEFAULT_COMMAND_TIMEOUT_SECS));
            let mut cmd = coerce_object(item, COMMAND_FIELDS, "cmd")?;
            cmd.insert("timeout_sec".to_string(), timeout);
            Some(Value::Object(cmd))
        })
        .collect()
}

/// Rebuild an object from `fields`. Non-objects, and objects whose `required`
/// field ends up blank, yield `None`.
fn coerce_object(
    item: Value,
    fields: &[(&str, &[&str], &str)],
    required: &str,
) -> Option<Map<String, Value>> {
    let Value::Object(raw) = item else {
        return None;
    };
    let mut out = Map::new();
    for &(key, aliases, default) in fields {
        let value = first_string(&raw, key, aliases)
            .filter(|s| !s.is_empty())
            .unwrap_or(default);
        out.insert(key.to_string(), Value::String(value.to_string()));
    }
    let keep = out
        .get(required)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    keep.then_some(out)
}

fn first_string<'a>(raw: &'a Map<String, Value>, key: &str, aliases: &[&str]) -> Option<&'a str> {
    std::iter::once(key)
        .chain(aliases.iter().copied())
        .find_map(|k| raw.get(k).and_then(Value::as_str))
}

fn ensure_list(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

use std::collections::{BTreeMap, HashMap};

use aivenctl_core::resource::Value;
use serde_json::Value as JsonValue;

use crate::errors::{AivenError, Result};

const MIB: i64 = 1024 * 1024;

/// Marker the API puts in place of secrets it chose not to return
pub const REDACTED: &str = "<redacted>";

/// Fails if a user config returned with `include_secrets=true` still has redacted values
pub fn contains_redacted_creds(config: &JsonValue) -> Result<()> {
    let text = serde_json::to_string(config)?;
    if text.contains(REDACTED) {
        return Err(AivenError::Other(
            "unexpected redacted credentials".to_string(),
        ));
    }
    Ok(())
}

/// Strings out of a list value, skipping anything else
pub fn flatten_to_string(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Int(i) => Some(i.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `5GiB`-style string for a size in bytes, in binary units up to GiB
pub fn human_readable_byte_size(bytes: i64) -> String {
    const SUFFIXES: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size.abs() >= 1024.0 && unit < SUFFIXES.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{}{}", size, SUFFIXES[unit])
}

/// Megabytes in a size such as `90GiB` or `10G`; 0 when it cannot be parsed
pub fn disk_space_mb(size: &str) -> i64 {
    let size = size.trim();
    let digits_end = size
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size.len());
    let Ok(number) = size[..digits_end].parse::<f64>() else {
        return 0;
    };

    let multiplier: f64 = match size[digits_end..].trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => MIB as f64,
        "g" | "gb" | "gib" => (MIB * 1024) as f64,
        "t" | "tb" | "tib" => (MIB * 1024 * 1024) as f64,
        _ => return 0,
    };
    ((number * multiplier) as i64) / MIB
}

pub fn get_str<'a>(attrs: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn get_bool(attrs: &HashMap<String, Value>, key: &str) -> bool {
    matches!(attrs.get(key), Some(Value::Bool(true)))
}

pub fn get_int(attrs: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match attrs.get(key) {
        Some(Value::Int(i)) => Some(*i),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// A required string attribute
pub fn require_str<'a>(attrs: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    get_str(attrs, key)
        .ok_or_else(|| AivenError::Config(format!("attribute '{}' is required", key)))
}

/// First element of a nested block, accepting both object and list-of-one forms
pub fn get_block<'a>(
    attrs: &'a HashMap<String, Value>,
    key: &str,
) -> Option<&'a HashMap<String, Value>> {
    match attrs.get(key) {
        Some(Value::Map(m)) => Some(m),
        Some(Value::List(items)) => match items.first() {
            Some(Value::Map(m)) => Some(m),
            _ => None,
        },
        _ => None,
    }
}

/// `tag` blocks as the key/value map the API expects
pub fn get_tags(attrs: &HashMap<String, Value>, key: &str) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    let blocks = match attrs.get(key) {
        Some(Value::List(items)) => items.as_slice(),
        Some(single @ Value::Map(_)) => std::slice::from_ref(single),
        _ => return Ok(tags),
    };

    for block in blocks {
        let Value::Map(m) = block else { continue };
        let (Some(k), Some(v)) = (
            m.get("key").and_then(Value::as_str),
            m.get("value").and_then(Value::as_str),
        ) else {
            continue;
        };
        if tags.insert(k.to_string(), v.to_string()).is_some() {
            return Err(AivenError::Config(format!(
                "tag keys should be unique, '{}' is repeated",
                k
            )));
        }
    }
    Ok(tags)
}

/// API tags as `tag` blocks, sorted by key
pub fn tags_to_value(tags: &BTreeMap<String, String>) -> Value {
    Value::List(
        tags.iter()
            .map(|(k, v)| {
                Value::Map(HashMap::from([
                    ("key".to_string(), Value::String(k.clone())),
                    ("value".to_string(), Value::String(v.clone())),
                ]))
            })
            .collect(),
    )
}

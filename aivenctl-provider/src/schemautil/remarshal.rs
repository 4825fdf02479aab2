//! Conversion between flat attribute maps and API DTOs
//!
//! Instead of copying every field by hand, attributes are turned into a JSON
//! object, adjusted by a list of [`MapModifier`]s and deserialized into the
//! DTO. The reverse direction serializes the DTO, applies the modifiers and
//! keeps only the keys the resource schema knows about.

use std::collections::HashMap;

use aivenctl_core::resource::{Value, attributes_from_json};
use aivenctl_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use super::id::split_resource_id;
use crate::errors::{AivenError, Result};

type JsonMap = Map<String, JsonValue>;

/// Adjusts the intermediate JSON object
#[derive(Debug, Clone, Copy)]
pub enum MapModifier<'a> {
    /// Attribute name -> DTO field name
    RenameAliases(&'a [(&'a str, &'a str)]),
    /// DTO field name -> attribute name
    RenameAliasesReverse(&'a [(&'a str, &'a str)]),
    /// Fill the given keys from the parts of the resource ID when absent
    ResourceIdKeys(&'a [&'a str]),
}

pub fn rename_aliases<'a>(aliases: &'a [(&'a str, &'a str)]) -> MapModifier<'a> {
    MapModifier::RenameAliases(aliases)
}

pub fn rename_aliases_reverse<'a>(aliases: &'a [(&'a str, &'a str)]) -> MapModifier<'a> {
    MapModifier::RenameAliasesReverse(aliases)
}

pub fn resource_id_keys<'a>(keys: &'a [&'a str]) -> MapModifier<'a> {
    MapModifier::ResourceIdKeys(keys)
}

impl MapModifier<'_> {
    fn apply(&self, id: &str, m: &mut JsonMap) -> Result<()> {
        match self {
            MapModifier::RenameAliases(aliases) => {
                rename(m, aliases.iter().map(|(from, to)| (*from, *to)));
            }
            MapModifier::RenameAliasesReverse(aliases) => {
                rename(m, aliases.iter().map(|(from, to)| (*to, *from)));
            }
            MapModifier::ResourceIdKeys(keys) => {
                let chunks = split_resource_id(id, keys.len())?;
                for (key, chunk) in keys.iter().zip(chunks) {
                    if !m.contains_key(*key) {
                        m.insert(key.to_string(), JsonValue::String(chunk));
                    }
                }
            }
        }
        Ok(())
    }
}

fn rename<'a>(m: &mut JsonMap, pairs: impl Iterator<Item = (&'a str, &'a str)>) {
    for (from, to) in pairs {
        if let Some(v) = m.remove(from) {
            m.insert(to.to_string(), v);
        }
    }
}

/// Read configured attributes into a DTO
pub fn resource_data_get<T: DeserializeOwned>(
    id: &str,
    attributes: &HashMap<String, Value>,
    modifiers: &[MapModifier<'_>],
) -> Result<T> {
    let mut m: JsonMap = attributes
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    for modifier in modifiers {
        modifier.apply(id, &mut m)?;
    }

    Ok(serde_json::from_value(JsonValue::Object(m))?)
}

/// Turn a DTO into schema-shaped attributes
pub fn resource_data_set<T: Serialize>(
    schema: &ResourceSchema,
    id: &str,
    dto: &T,
    modifiers: &[MapModifier<'_>],
) -> Result<HashMap<String, Value>> {
    let mut m = match serde_json::to_value(dto)? {
        JsonValue::Object(m) => m,
        other => {
            return Err(AivenError::Other(format!(
                "expected an object to set, got {}",
                other
            )));
        }
    };

    for modifier in modifiers {
        modifier.apply(id, &mut m)?;
    }

    let fields: Vec<&AttributeSchema> = schema.attributes.values().collect();
    serialize_set(&fields, &mut m)?;

    Ok(attributes_from_json(&JsonValue::Object(m)))
}

/// Drop keys the schema does not define and normalise nested blocks to lists
pub fn serialize_set(fields: &[&AttributeSchema], m: &mut JsonMap) -> Result<()> {
    m.retain(|k, _| fields.iter().any(|f| &f.name == k));

    for field in fields {
        let Some(value) = m.get_mut(&field.name) else {
            if field.force_new && field.required {
                return Err(AivenError::Other(format!(
                    "missing required ForceNew field: {:?}",
                    field.name
                )));
            }
            continue;
        };

        let nested = match &field.attr_type {
            AttributeType::Struct(nested) => nested,
            AttributeType::List(inner) => match inner.as_ref() {
                AttributeType::Struct(nested) => nested,
                _ => continue,
            },
            _ => continue,
        };

        if value.is_null() {
            continue;
        }

        // A single object and a list of objects are the same thing
        if !value.is_array() {
            *value = JsonValue::Array(vec![value.take()]);
        }

        let nested_fields: Vec<&AttributeSchema> = nested.iter().collect();
        if let JsonValue::Array(items) = value {
            for item in items {
                let JsonValue::Object(o) = item else {
                    return Err(AivenError::Other(format!(
                        "expected object for field {:?}, got {}",
                        field.name, item
                    )));
                };
                serialize_set(&nested_fields, o).map_err(|e| {
                    AivenError::Other(format!(
                        "failed to serialize object {:?}: {}",
                        field.name, e
                    ))
                })?;
            }
        }
    }

    Ok(())
}

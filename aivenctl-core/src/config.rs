//! Config - Load resource definitions from a JSON document
//!
//! ```json
//! {
//!   "provider": { "api_url": "https://api.aiven.io/v1", "timeouts": { "create": "30m" } },
//!   "resources": [
//!     { "type": "project_vpc", "name": "vpc", "attributes": { "project": "acme" } },
//!     { "type": "pg", "name": "db", "attributes": { "project_vpc_id": "${vpc.id}" } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::resource::{Resource, Value};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z0-9_-]+)\.([A-Za-z0-9_.]+)\}$").expect("valid reference regex")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate resource {resource_type}.{name}")]
    Duplicate { resource_type: String, name: String },

    #[error("duplicate binding name '{0}'")]
    DuplicateBinding(String),

    #[error("attributes of {0} must be a JSON object")]
    NotAnObject(String),

    #[error("{resource} references unknown binding '{binding}'")]
    UnknownBinding { resource: String, binding: String },
}

/// Provider-level settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub api_url: Option<String>,
    /// Operation name ("create", "read", "update", "delete", "default") to
    /// a duration such as "30m" or "1h"
    #[serde(default)]
    pub timeouts: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    provider: ProviderConfig,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    data: bool,
    #[serde(default)]
    attributes: serde_json::Value,
}

/// Parsed configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub resources: Vec<Resource>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;

        let mut seen = HashSet::new();
        let mut bindings = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());

        for r in raw.resources {
            if !seen.insert((r.resource_type.clone(), r.name.clone())) {
                return Err(ConfigError::Duplicate {
                    resource_type: r.resource_type,
                    name: r.name,
                });
            }
            if !bindings.insert(r.name.clone()) {
                return Err(ConfigError::DuplicateBinding(r.name));
            }

            let mut resource = Resource::new(&r.resource_type, &r.name).with_read_only(r.data);
            match &r.attributes {
                serde_json::Value::Null => {}
                serde_json::Value::Object(map) => {
                    for (key, value) in map {
                        if let Some(value) = parse_value(value) {
                            resource.attributes.insert(key.clone(), value);
                        }
                    }
                }
                _ => return Err(ConfigError::NotAnObject(resource.id.to_string())),
            }
            resources.push(resource);
        }

        for resource in &resources {
            for value in resource.attributes.values() {
                for binding in references(value) {
                    if !bindings.contains(binding) {
                        return Err(ConfigError::UnknownBinding {
                            resource: resource.id.to_string(),
                            binding: binding.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Config {
            provider: raw.provider,
            resources,
        })
    }
}

/// Like `Value::from_json`, turning `${binding.attr}` strings into references
fn parse_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(match REFERENCE.captures(s) {
            Some(caps) => Value::ResourceRef(caps[1].to_string(), caps[2].to_string()),
            None => Value::String(s.clone()),
        }),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(parse_value).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| parse_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        other => Value::from_json(other),
    }
}

/// Binding names referenced anywhere inside a value
pub fn references(value: &Value) -> Vec<&str> {
    match value {
        Value::ResourceRef(binding, _) => vec![binding.as_str()],
        Value::List(items) => items.iter().flat_map(references).collect(),
        Value::Map(map) => map.values().flat_map(references).collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resources_and_references() {
        let config = Config::parse(
            r#"{
                "provider": { "timeouts": { "create": "30m" } },
                "resources": [
                    { "type": "project_vpc", "name": "vpc",
                      "attributes": { "project": "acme", "cloud_name": "aws-eu-west-1" } },
                    { "type": "pg", "name": "db",
                      "attributes": { "project_vpc_id": "${vpc.id}", "tag": [{ "key": "env", "value": "prod" }] } },
                    { "type": "project", "name": "acme", "data": true,
                      "attributes": { "project": "acme" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.provider.timeouts.get("create").unwrap(), "30m");
        assert_eq!(config.resources.len(), 3);
        assert_eq!(
            config.resources[1].attributes.get("project_vpc_id"),
            Some(&Value::ResourceRef("vpc".to_string(), "id".to_string()))
        );
        assert!(config.resources[2].is_data_source());
    }

    #[test]
    fn interpolation_inside_text_stays_a_string() {
        let config = Config::parse(
            r#"{ "resources": [ { "type": "project", "name": "p",
                 "attributes": { "project": "prefix-${x.y}" } } ] }"#,
        )
        .unwrap();
        assert_eq!(
            config.resources[0].get_str("project"),
            Some("prefix-${x.y}")
        );
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let err = Config::parse(
            r#"{ "resources": [
                { "type": "project", "name": "p", "attributes": {} },
                { "type": "project", "name": "p", "attributes": {} }
            ] }"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate resource project.p");
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = Config::parse(r#"{ "resource": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_binding_is_rejected() {
        let err = Config::parse(
            r#"{ "resources": [ { "type": "pg", "name": "db",
                 "attributes": { "project": "${nope.project}" } } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBinding { .. }));
    }
}

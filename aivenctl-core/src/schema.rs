//! Schema - Define type schemas for resources
//!
//! Each resource type exposes a schema describing its attributes: their types,
//! whether they are required, computed or force a replacement, and how diffs
//! against remote state are suppressed.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block; accepted either as a single object or a list of objects
    Struct(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve at apply time
            (_, Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Struct(fields), Value::Map(map)) => validate_struct(fields, map),

            (AttributeType::Struct(fields), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let result = match item {
                        Value::Map(map) => validate_struct(fields, map),
                        other => Err(TypeError::TypeMismatch {
                            expected: "Struct".to_string(),
                            got: other.type_name(),
                        }),
                    };
                    result.map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Struct(_) => "Struct".to_string(),
        }
    }
}

fn validate_struct(fields: &[AttributeSchema], map: &HashMap<String, Value>) -> Result<(), TypeError> {
    for field in fields {
        match map.get(&field.name) {
            Some(v) => field.attr_type.validate(v).map_err(|e| TypeError::MapValueError {
                key: field.name.clone(),
                inner: Box::new(e),
            })?,
            None if field.required => {
                return Err(TypeError::MissingRequired {
                    name: field.name.clone(),
                });
            }
            None => {}
        }
    }
    for key in map.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            return Err(TypeError::UnknownAttribute { name: key.clone() });
        }
    }
    Ok(())
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", .expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Attribute '{name}' requires '{other}' to be set")]
    RequiredWith { name: String, other: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
        }
    }
}

/// Rules that hide a difference between desired and remote values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSuppress {
    /// Only meaningful when creating; later changes are ignored
    CreateOnly,
    /// An empty desired value never overrides a value the API filled in
    EmptyObject,
    /// An empty desired string is treated as "not managed"
    EmptyObjectNoChange,
    /// Leading and trailing whitespace is not significant
    TrimSpace,
    /// Unset IP filter equals the API default `0.0.0.0/0`
    IpFilterDefault,
    /// Strings holding JSON documents compare structurally
    JsonEquivalent,
    /// Clearing the value is ignored
    EmptyNew,
}

impl DiffSuppress {
    /// Returns true when the difference should not produce a change
    pub fn suppresses(&self, current: Option<&Value>, desired: Option<&Value>) -> bool {
        let desired_empty = desired.is_none_or(Value::is_empty);
        match self {
            DiffSuppress::CreateOnly => true,
            DiffSuppress::EmptyObject => {
                desired_empty && current.is_some_and(|c| !c.is_empty())
            }
            DiffSuppress::EmptyObjectNoChange | DiffSuppress::EmptyNew => desired_empty,
            DiffSuppress::TrimSpace => match (current, desired) {
                (Some(Value::String(c)), Some(Value::String(d))) => c.trim() == d.trim(),
                _ => false,
            },
            DiffSuppress::IpFilterDefault => {
                desired_empty
                    && matches!(current, Some(Value::List(items))
                        if items.len() == 1 && items[0] == Value::String("0.0.0.0/0".to_string()))
            }
            DiffSuppress::JsonEquivalent => match (current, desired) {
                (Some(Value::String(c)), Some(Value::String(d))) => {
                    match (
                        serde_json::from_str::<serde_json::Value>(c),
                        serde_json::from_str::<serde_json::Value>(d),
                    ) {
                        (Ok(a), Ok(b)) => a == b,
                        _ => false,
                    }
                }
                _ => false,
            },
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub deprecated: Option<String>,
    pub diff_suppress: Option<DiffSuppress>,
    pub required_with: Vec<String>,
    /// API-side field name when it differs from the attribute name
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            deprecated: None,
            diff_suppress: None,
            required_with: Vec::new(),
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Set by the API only
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Set by the user or, when omitted, by the API
    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    pub fn diff_suppress(mut self, rule: DiffSuppress) -> Self {
        self.diff_suppress = Some(rule);
        self
    }

    pub fn required_with(mut self, others: &[&str]) -> Self {
        self.required_with = others.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Computed without being settable from configuration
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            deprecation: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    /// Add several attributes at once (shared attribute groups)
    pub fn attributes(mut self, schemas: impl IntoIterator<Item = AttributeSchema>) -> Self {
        for schema in schemas {
            self.attributes.insert(schema.name.clone(), schema);
        }
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecation = Some(message.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    pub fn is_force_new(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.force_new)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.sensitive)
    }

    /// Fill in defaults for attributes the configuration leaves out
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !attributes.contains_key(name)
            {
                attributes.insert(name.clone(), default.clone());
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
            if attributes.contains_key(name) {
                for other in &schema.required_with {
                    if !attributes.contains_key(other) {
                        errors.push(TypeError::RequiredWith {
                            name: name.clone(),
                            other: other.clone(),
                        });
                    }
                }
            }
        }

        for (name, value) in attributes {
            // Internal attributes (e.g. _binding) are not part of the schema
            if name.starts_with('_') {
                continue;
            }
            match self.attributes.get(name) {
                Some(schema) if schema.is_read_only() => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() });
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::MapValueError {
                            key: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Attribute schemas sorted by name, for stable output
    pub fn sorted_attributes(&self) -> Vec<&AttributeSchema> {
        let mut attrs: Vec<_> = self.attributes.values().collect();
        attrs.sort_by(|a, b| a.name.cmp(&b.name));
        attrs
    }
}

static HUMAN_BYTE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*(GiB|G)$").expect("valid regex"));

static PROJECT_SCOPED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]*/{1}[a-zA-Z0-9_-]*$").expect("valid regex"));

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_cidr(s),
                _ => Ok(()),
            },
        }
    }

    /// Lower-case email address
    pub fn email() -> AttributeType {
        AttributeType::Custom {
            name: "Email".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_email(s),
                _ => Ok(()),
            },
        }
    }

    /// Disk size such as "90GiB"
    pub fn human_byte_size() -> AttributeType {
        AttributeType::Custom {
            name: "HumanByteSize".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if HUMAN_BYTE_SIZE.is_match(s) => Ok(()),
                Value::String(_) => {
                    Err("configured string must match ^[1-9][0-9]*(G|GiB)".to_string())
                }
                _ => Ok(()),
            },
        }
    }

    /// String holding a JSON document
    pub fn json_string() -> AttributeType {
        AttributeType::Custom {
            name: "JsonString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .map(|_| ())
                    .map_err(|e| format!("invalid JSON: {}", e)),
                _ => Ok(()),
            },
        }
    }

    /// Identifier in the form `<project>/<name>`
    pub fn project_scoped_id() -> AttributeType {
        AttributeType::Custom {
            name: "ProjectScopedId".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if PROJECT_SCOPED_ID.is_match(s) => Ok(()),
                Value::String(s) => Err(format!(
                    "invalid {}, expected <project_name>/<id>",
                    s
                )),
                _ => Ok(()),
            },
        }
    }

    /// Day of week for maintenance windows
    pub fn maintenance_dow() -> AttributeType {
        AttributeType::Enum(
            [
                "monday",
                "tuesday",
                "wednesday",
                "thursday",
                "friday",
                "saturday",
                "sunday",
                "never",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }

    /// Key/value tag block
    pub fn tag() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::Struct(vec![
            AttributeSchema::new("key", AttributeType::String).required(),
            AttributeSchema::new("value", AttributeType::String).required(),
        ])))
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    }

    let ip = parts[0];
    let prefix = parts[1];

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

/// Validate an email address; the API stores addresses lower-cased
pub fn validate_email(addr: &str) -> Result<(), String> {
    let (local, domain) = addr
        .split_once('@')
        .ok_or_else(|| format!("mail: missing '@' in address '{}'", addr))?;

    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || addr.chars().any(char::is_whitespace)
    {
        return Err(format!("mail: invalid address '{}'", addr));
    }

    if addr.to_lowercase() != addr {
        return Err(format!("{:?}: invalid email address", addr));
    }

    Ok(())
}

//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared in configuration with the current state
//! fetched from the Provider, and generates the list of required Effects (Plan).

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute differs -> needs delete and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// Schema defaults are filled into the desired attributes first, so an
/// attribute dropped from the configuration falls back to its default.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    let mut desired = desired.clone();
    if let Some(schema) = schema {
        schema.apply_defaults(&mut desired.attributes);
    }

    if !current.exists {
        return Diff::Create(desired);
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| changed.iter().any(|k| s.is_force_new(k)));
    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        let attr = schema.and_then(|s| s.get(key));
        if attr.is_some_and(|a| a.is_read_only()) {
            continue;
        }

        let current_value = current.get(key);
        if let Some(rule) = attr.and_then(|a| a.diff_suppress)
            && rule.suppresses(current_value, Some(desired_value))
        {
            continue;
        }

        match current_value {
            Some(current_value)
                if value_matches(desired_value, current_value, attr.map(|a| &a.attr_type)) => {}
            // An empty desired value matches an attribute the API omits
            None if desired_value.is_empty() => {}
            _ => changed.push(key.clone()),
        }
    }

    // Attributes that were set remotely but are no longer configured
    if let Some(schema) = schema {
        for (key, current_value) in current {
            if key.starts_with('_') || desired.contains_key(key) || current_value.is_empty() {
                continue;
            }
            let Some(attr) = schema.get(key) else {
                continue;
            };
            if attr.computed {
                continue;
            }
            if let Some(rule) = attr.diff_suppress
                && rule.suppresses(Some(current_value), None)
            {
                continue;
            }
            changed.push(key.clone());
        }
    }

    changed.sort();
    changed
}

/// Structural comparison where `desired` may be a subset of `current`.
/// Lists of scalars are compared as sets. Fields of nested blocks honour
/// their own diff-suppress rules.
fn value_matches(desired: &Value, current: &Value, ty: Option<&AttributeType>) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d.iter().all(|(k, dv)| {
            let field = match ty {
                Some(AttributeType::Struct(fields)) => fields.iter().find(|f| f.name == *k),
                _ => None,
            };
            if let Some(rule) = field.and_then(|f| f.diff_suppress)
                && rule.suppresses(c.get(k), Some(dv))
            {
                return true;
            }
            let field_ty = match ty {
                Some(AttributeType::Map(inner)) => Some(inner.as_ref()),
                _ => field.map(|f| &f.attr_type),
            };
            match c.get(k) {
                Some(cv) => value_matches(dv, cv, field_ty),
                None => dv.is_empty(),
            }
        }),
        (Value::List(d), Value::List(c)) => {
            if d.len() != c.len() {
                return false;
            }
            let scalars = d.iter().all(|v| !matches!(v, Value::Map(_) | Value::List(_)));
            if scalars {
                d.iter().all(|dv| c.contains(dv)) && c.iter().all(|cv| d.contains(cv))
            } else {
                let item_ty = match ty {
                    Some(AttributeType::List(inner)) => Some(inner.as_ref()),
                    other => other,
                };
                d.iter().zip(c).all(|(dv, cv)| value_matches(dv, cv, item_ty))
            }
        }
        // A single block compared with the API's list-of-one form
        (Value::Map(_), Value::List(c)) if c.len() == 1 => value_matches(desired, &c[0], ty),
        (Value::Int(d), Value::Float(c)) => (*d as f64) == *c,
        (Value::String(d), Value::Int(c)) => d.parse::<i64>().is_ok_and(|d| d == *c),
        _ => desired == current,
    }
}

/// Compute Diff for multiple resources and generate a Plan
///
/// `orphans` are resources recorded in state that no longer appear in the
/// configuration, paired with their identifiers. They are deleted last, in
/// the order given.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
    orphans: &[(ResourceId, String)],
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    for (id, identifier) in orphans {
        plan.add(Effect::Delete {
            id: id.clone(),
            identifier: identifier.clone(),
        });
    }

    plan
}

//! Plan and state rendering

use std::collections::HashMap;

use colored::Colorize;

use aivenctl_core::effect::Effect;
use aivenctl_core::plan::Plan;
use aivenctl_core::resource::Value;
use aivenctl_core::schema::ResourceSchema;

const SENSITIVE: &str = "(sensitive)";

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.has_no_changes() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let id = effect.resource_id();
        let schema = schemas.get(&id.resource_type);
        let address = format!("{}.{}", id.resource_type, id.name);

        match effect {
            Effect::Read(_) => {
                println!("  {} {}", "<=".cyan().bold(), format!("data.{}", address).cyan());
            }
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), address.bold());
                let mut keys: Vec<_> = r.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    println!(
                        "      {}: {}",
                        key,
                        display_value(schema, key, &r.attributes[key]).green()
                    );
                }
            }
            Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            } => {
                println!("  {} {}", "~".yellow().bold(), address.bold());
                for key in changed_attributes {
                    print_change(schema, key, from.attributes.get(key), to.attributes.get(key), false);
                }
            }
            Effect::Replace {
                from,
                to,
                changed_attributes,
                ..
            } => {
                println!("  {} {}", "-/+".magenta().bold(), address.bold());
                for key in changed_attributes {
                    let forces = schema.is_some_and(|s| s.is_force_new(key));
                    print_change(schema, key, from.attributes.get(key), to.attributes.get(key), forces);
                }
            }
            Effect::Delete { identifier, .. } => {
                println!("  {} {}", "-".red().bold(), address.bold());
                println!("      id: {}", identifier.red());
            }
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn print_change(
    schema: Option<&ResourceSchema>,
    key: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    forces_replacement: bool,
) {
    let old = old
        .map(|v| display_value(schema, key, v))
        .unwrap_or_else(|| "(none)".to_string());
    let new = new
        .map(|v| display_value(schema, key, v))
        .unwrap_or_else(|| "(none)".to_string());
    let suffix = if forces_replacement {
        format!(" {}", "# forces replacement".magenta())
    } else {
        String::new()
    };
    println!("      {}: {} → {}{}", key, old.red(), new.green(), suffix);
}

/// Value as shown to the user; sensitive attributes are masked
pub fn display_value(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    if schema.is_some_and(|s| s.is_sensitive(key)) {
        return SENSITIVE.to_string();
    }
    format_value(value)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, format_value(&map[k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("(known after apply: {}.{})", binding, attr),
    }
}

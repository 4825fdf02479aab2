//! Per-operation timeouts

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::errors::{AivenError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(h|m|s)").expect("valid duration regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Build from provider config entries like `{"default": "30m", "create": "1h"}`
    pub fn from_config(entries: &HashMap<String, String>) -> Result<Self> {
        let base = match entries.get("default") {
            Some(v) => parse_duration(v)?,
            None => DEFAULT_TIMEOUT,
        };
        let mut timeouts = Self {
            create: base,
            read: base,
            update: base,
            delete: base,
        };

        for (op, value) in entries {
            let duration = parse_duration(value)?;
            match op.as_str() {
                "default" => {}
                "create" => timeouts.create = duration,
                "read" => timeouts.read = duration,
                "update" => timeouts.update = duration,
                "delete" => timeouts.delete = duration,
                other => {
                    return Err(AivenError::Config(format!(
                        "unknown timeout '{}', expected one of: create, read, update, delete, default",
                        other
                    )));
                }
            }
        }
        Ok(timeouts)
    }
}

/// Parse durations such as `90s`, `20m` or `1h30m`
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || AivenError::Config(format!("invalid duration '{}'", value));

    let mut total = 0u64;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(value) {
        let whole = caps.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let n: u64 = caps[1].parse().map_err(|_| invalid())?;
        total += match &caps[2] {
            "h" => n * 3600,
            "m" => n * 60,
            _ => n,
        };
    }

    if consumed == 0 || consumed != value.len() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

//! Composite resource IDs such as `project/service_name/username`

use percent_encoding::percent_decode_str;

use crate::client::escape;
use crate::errors::{AivenError, Result};

/// Path-escape each part and join them with `/`
pub fn build_resource_id(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| escape(p).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reverse of the escaping applied by [`build_resource_id`] to one part
pub fn unescape(part: &str) -> Option<String> {
    percent_decode_str(part)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Split an ID built by [`build_resource_id`] into exactly `n` parts
pub fn split_resource_id(id: &str, n: usize) -> Result<Vec<String>> {
    let parts: Vec<&str> = id.splitn(n, '/').collect();
    if parts.len() != n {
        return Err(AivenError::InvalidId(id.to_string()));
    }

    parts
        .into_iter()
        .map(|p| unescape(p).ok_or_else(|| AivenError::InvalidId(id.to_string())))
        .collect()
}

pub fn split2(id: &str) -> Result<(String, String)> {
    let mut parts = split_resource_id(id, 2)?.into_iter();
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(AivenError::InvalidId(id.to_string())),
    }
}

pub fn split3(id: &str) -> Result<(String, String, String)> {
    let mut parts = split_resource_id(id, 3)?.into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => Ok((a, b, c)),
        _ => Err(AivenError::InvalidId(id.to_string())),
    }
}

pub fn split4(id: &str) -> Result<(String, String, String, String)> {
    let mut parts = split_resource_id(id, 4)?.into_iter();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c), Some(d)) => Ok((a, b, c, d)),
        _ => Err(AivenError::InvalidId(id.to_string())),
    }
}

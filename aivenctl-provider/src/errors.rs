//! Aiven provider error types and classification

use aivenctl_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

use crate::waiter::WaitError;

/// Error returned by the Aiven REST API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}{}", .more_info.as_deref().map(|m| format!(" - {}", m)).unwrap_or_default())]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub more_info: Option<String>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            more_info: None,
        }
    }

    /// A 404 for lookups that scan a list instead of hitting a resource endpoint
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }
}

#[derive(Error, Debug)]
pub enum AivenError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid resource id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("the service is powered off")]
    ServicePoweredOff,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AivenError>;

impl AivenError {
    fn api(&self) -> Option<&ApiError> {
        match self {
            AivenError::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.api().map(|e| e.status)
    }
}

/// HTTP 404 from the API
pub fn is_not_found(err: &AivenError) -> bool {
    err.status() == Some(404)
}

/// Everything except a 404 is fatal
pub fn is_critical(err: &AivenError) -> bool {
    !is_not_found(err)
}

pub fn is_already_exists(err: &AivenError) -> bool {
    err.status() == Some(409)
}

/// The database rejected the call because the role does not exist
pub fn is_unknown_role(err: &AivenError) -> bool {
    err.api().is_some_and(|e| e.message.contains("Code: 511"))
}

/// Errors treated as "the resource is gone"
pub fn is_unknown_resource(err: &AivenError) -> bool {
    is_not_found(err) || is_unknown_role(err)
}

/// Turn a 404 into success
pub fn omit_not_found<T: Default>(res: Result<T>) -> Result<T> {
    match res {
        Err(e) if is_not_found(&e) => Ok(T::default()),
        other => other,
    }
}

/// A read of a resource that has vanished yields `None`, unless the resource
/// was just created, in which case the error stands.
pub fn read_handle_not_found<T>(res: Result<T>, is_new: bool) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if is_unknown_resource(&e) && !is_new => Ok(None),
        Err(e) => Err(e),
    }
}

impl From<AivenError> for ProviderError {
    fn from(err: AivenError) -> Self {
        let kind = match &err {
            e if is_unknown_resource(e) => ErrorKind::NotFound,
            AivenError::Api(_) | AivenError::Http(_) => ErrorKind::Api,
            AivenError::Wait(WaitError::Timeout { .. }) => ErrorKind::Timeout,
            AivenError::InvalidId(_) | AivenError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Other,
        };
        ProviderError::new(err.to_string())
            .with_kind(kind)
            .with_cause(err)
    }
}

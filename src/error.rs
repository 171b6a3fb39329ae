//! Unified error model for the registry.
//! Every layer (path model, pipeline, mounts, storage fallback) reports through `RegistryError`,
//! so callers can match on the kind without caring which layer raised it.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("mount configuration error: {0}")]
    MountConfiguration(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("cannot instantiate '{name}': {reason}")]
    HandlerInstantiation { name: String, reason: String },

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl RegistryError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryError::InvalidPath { path: path.into(), reason: reason.into() }
    }
    pub fn not_found(path: impl Into<String>) -> Self { RegistryError::NotFound(path.into()) }
    pub fn mount(msg: impl Into<String>) -> Self { RegistryError::MountConfiguration(msg.into()) }
    pub fn permission(msg: impl Into<String>) -> Self { RegistryError::Permission(msg.into()) }
    pub fn instantiation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryError::HandlerInstantiation { name: name.into(), reason: reason.into() }
    }
    pub fn failed(msg: impl Into<String>) -> Self { RegistryError::OperationFailed(msg.into()) }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::InvalidPath { .. } => "invalid_path",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::MountConfiguration(_) => "mount_configuration",
            RegistryError::Permission(_) => "permission_denied",
            RegistryError::HandlerInstantiation { .. } => "handler_instantiation",
            RegistryError::OperationFailed(_) => "operation_failed",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            RegistryError::InvalidPath { .. } => 400,
            RegistryError::NotFound(_) => 404,
            RegistryError::MountConfiguration(_) => 409,
            RegistryError::Permission(_) => 403,
            RegistryError::HandlerInstantiation { .. } => 500,
            RegistryError::OperationFailed(_) => 422,
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, RegistryError::NotFound(_)) }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::OperationFailed(format!("serialization: {err}"))
    }
}

impl From<regex::Error> for RegistryError {
    fn from(err: regex::Error) -> Self {
        RegistryError::HandlerInstantiation { name: "regex".into(), reason: err.to_string() }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::OperationFailed(format!("io: {err}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;

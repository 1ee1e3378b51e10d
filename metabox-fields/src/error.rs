//! Error types for the field schema

use std::path::PathBuf;
use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, FieldsError>;

/// Errors that can occur while building, loading or addressing a schema
#[derive(Debug, Error)]
pub enum FieldsError {
    /// A field definition breaks a schema invariant. Raised when the schema
    /// is built or loaded, never deferred to render or sanitize time.
    #[error("schema violation at '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// A flat submission key could not be decoded into a field path
    #[error("malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// Meta box not found by id
    #[error("meta box not found: {id}")]
    SchemaNotFound { id: String },

    /// Two schema files declare the same meta box id
    #[error("duplicate meta box id '{id}' in {path}")]
    DuplicateSchema { id: String, path: PathBuf },

    /// Schema directory not found
    #[error("schema directory not found: {path}")]
    NotInitialized { path: PathBuf },

    /// Write or delete attempted on a context opened read-only
    #[error("schema directory is read-only: {path}")]
    ReadOnly { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl FieldsError {
    pub(crate) fn violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FieldsError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        FieldsError::MalformedKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

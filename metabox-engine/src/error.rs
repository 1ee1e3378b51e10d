//! Error types for the render and sanitize engine

use std::path::PathBuf;

use metabox_fields::FieldsError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while configuring the engine or reading host input.
///
/// Rendering and sanitizing themselves never fail; these cover the edges
/// around them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema construction or loading failed
    #[error(transparent)]
    Fields(#[from] FieldsError),

    /// Configuration could not be merged or extracted
    #[error("failed to load configuration: {source}")]
    Config { source: Box<figment::Error> },

    /// An explicitly named configuration file does not exist
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file extension is not toml, yaml, yml or json
    #[error("unsupported configuration file format: {path}")]
    UnsupportedConfigFormat { path: PathBuf },

    /// A configuration value is out of range
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    /// Host input (stored values or a submission) is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for EngineError {
    fn from(error: figment::Error) -> Self {
        EngineError::Config {
            source: Box::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_errors_pass_through() {
        let err: EngineError = FieldsError::SchemaNotFound { id: "seo".into() }.into();
        assert_eq!(err.to_string(), "meta box not found: seo");
    }

    #[test]
    fn invalid_config_names_the_key() {
        let err = EngineError::InvalidConfig {
            key: "default_size".into(),
            message: "must be positive".into(),
        };
        assert!(err.to_string().contains("default_size"));
    }
}

//! # Configuration Error Types
//!
//! Structured error types for configuration loading and validation using
//! thiserror. Configuration failures are always fatal to startup: the
//! runtime refuses to poll anything with wiring it cannot trust.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file not found. Searched: {searched_paths}")]
    FileNotFound { searched_paths: String },

    #[error("Failed to read configuration file {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Missing required field {field}: {context}")]
    MissingRequiredField { field: String, context: String },

    #[error("Invalid value for {field}: {value}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate source name in catalog: {name}")]
    DuplicateSource { name: String },
}

impl ConfigurationError {
    /// Create a file-not-found error listing every searched path
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        let searched = searched_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::FileNotFound {
            searched_paths: searched,
        }
    }

    /// Create a file read error
    pub fn file_read_error(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create an invalid YAML error
    pub fn invalid_yaml(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::InvalidYaml {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate source error
    pub fn duplicate_source(name: impl Into<String>) -> Self {
        Self::DuplicateSource { name: name.into() }
    }
}

/// Conversion into the crate error type; configuration failures fail closed
impl From<ConfigurationError> for crate::error::VigilError {
    fn from(err: ConfigurationError) -> Self {
        crate::error::VigilError::configuration("config", err.to_string())
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

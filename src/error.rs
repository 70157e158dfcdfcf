//! Error types for Basic Memory
//!
//! Provides structured error types with context for better debugging
//! and user-friendly error messages. Variants are organized by the
//! subsystem that raises them.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Basic Memory operations.
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Dataview / Markdown parse errors
    // ==========================================================================
    #[error("parse error in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("malformed YAML frontmatter in '{path}': {message}")]
    YamlParseError { path: PathBuf, message: String },

    // ==========================================================================
    // File I/O errors
    // ==========================================================================
    #[error("file operation failed for '{path}': {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum mismatch writing '{path}': expected {expected}, found {found}")]
    DirtyFileError {
        path: PathBuf,
        expected: String,
        found: String,
    },

    // ==========================================================================
    // Graph store errors
    // ==========================================================================
    #[error("entity not found: {identifier}")]
    EntityNotFound { identifier: String },

    #[error("project '{name}' does not exist")]
    ProjectNotFound { name: String },

    #[error("project '{name}' already exists")]
    ProjectAlreadyExists { name: String },

    #[error("graph store error: {message}")]
    StoreError { message: String },

    // ==========================================================================
    // Search errors
    // ==========================================================================
    #[error("semantic search is disabled for this project")]
    SemanticSearchDisabled,

    #[error("semantic search dependencies are missing: {message}")]
    SemanticDependenciesMissing { message: String },

    #[error("search error: {message}")]
    SearchError { message: String },

    // ==========================================================================
    // Dataview query errors
    // ==========================================================================
    #[error("dataview query error: {message}")]
    DataviewError { message: String },

    // ==========================================================================
    // Sync / watch errors
    // ==========================================================================
    #[error("sync error for '{path}': {message}")]
    SyncError { path: PathBuf, message: String },

    #[error("watch service error: {message}")]
    WatchError { message: String },

    // ==========================================================================
    // Schema / Picoschema errors
    // ==========================================================================
    #[error("schema validation failed for '{entity_type}': {message}")]
    SchemaValidation { entity_type: String, message: String },

    // ==========================================================================
    // Validation errors
    // ==========================================================================
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("reserved name '{name}' cannot be used")]
    ReservedName { name: String },

    // ==========================================================================
    // Config errors
    // ==========================================================================
    #[error("config error: {message}")]
    ConfigError { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Basic Memory operations.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreError {
            message: err.to_string(),
        }
    }
}

impl From<dataview::ParseError> for Error {
    fn from(err: dataview::ParseError) -> Self {
        Error::DataviewError {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        match err {
            crate::validation::ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidIdentifier {
                    kind: "identifier",
                    value,
                    reason,
                }
            }
            crate::validation::ValidationError::TooLong(value, _max) => Error::InvalidIdentifier {
                kind: "identifier",
                value,
                reason: "exceeds maximum length",
            },
            crate::validation::ValidationError::Empty => Error::InvalidIdentifier {
                kind: "identifier",
                value: String::new(),
                reason: "cannot be empty",
            },
            crate::validation::ValidationError::Reserved(name) => Error::ReservedName { name },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::EntityNotFound { .. } => Some("Check the permalink, title, or file path"),
            Error::ProjectNotFound { .. } => Some("Run `basic-memory init <name> <path>` first"),
            Error::InvalidIdentifier { .. } => {
                Some("Use only letters, numbers, underscores, and hyphens")
            }
            Error::SemanticSearchDisabled => {
                Some("Enable semantic_search_enabled in the project config")
            }
            Error::SemanticDependenciesMissing { .. } => {
                Some("Install the configured embedding provider's dependencies")
            }
            _ => None,
        }
    }

    /// Returns true if this error is recoverable without aborting the
    /// enclosing sync batch or watch loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ParseError { .. }
                | Error::YamlParseError { .. }
                | Error::EntityNotFound { .. }
                | Error::DataviewError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EntityNotFound {
            identifier: "notes/missing".to_string(),
        };
        assert_eq!(err.to_string(), "entity not found: notes/missing");
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::EntityNotFound {
            identifier: "notes/missing".to_string(),
        };
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn dirty_file_error_is_not_recoverable() {
        let err = Error::DirtyFileError {
            path: PathBuf::from("notes/x.md"),
            expected: "abc".into(),
            found: "def".into(),
        };
        assert!(!err.is_recoverable());
    }
}

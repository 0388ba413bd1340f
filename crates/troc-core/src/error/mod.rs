//! Error types and result aliases for troc operations.
//!
//! Every failure the gateway can produce is expressed as a [`TrocError`].
//! Command handlers resolve these into HTTP responses; the CLI prints them
//! with a suggestion attached when one is known.

use thiserror::Error;

/// Unified error type for all troc operations
#[derive(Error, Debug)]
pub enum TrocError {
    // Config errors
    #[error("Failed to parse config: {0}")]
    TomlParse(String),

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Request errors
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Upstream errors
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Storage errors
    #[error("Invalid JSON: {message}")]
    Json { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for troc operations
pub type TrocResult<T> = Result<T, TrocError>;

impl TrocError {
    /// Create an upstream error from any error type
    pub fn upstream<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a JSON error from a serde_json failure
    pub fn json(context: &str, source: serde_json::Error) -> Self {
        Self::Json {
            message: format!("{}: {}", context, source),
        }
    }

    /// Whether the failed operation may succeed against another upstream
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrocError::Upstream { .. } | TrocError::Io { .. })
    }

    /// Get an operator-facing suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            TrocError::TomlParse(_) => Some("Check the config file syntax against troc.example.toml"),
            TrocError::ConfigValidation { .. } => {
                Some("Fix the reported field in the config file or the matching TROC_* variable")
            },
            TrocError::Io { .. } => Some("Check that the storage directory exists and is writable"),
            TrocError::Upstream { .. } => Some("Check that the upstream registry is reachable"),
            _ => None,
        }
    }
}

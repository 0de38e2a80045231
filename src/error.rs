//! Error types for mail-rules.

use std::path::PathBuf;

/// Top-level error type for a full sync-and-apply pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Rule run failed: {0}")]
    Runner(#[from] RunnerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the remote mail provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// A rule document that does not fit the grammar.
///
/// Carries every violation found, not just the first.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Rules must be a list of rule objects")]
    NotAnArray,

    #[error("Validation failed: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },
}

impl SchemaError {
    /// All violations, in document order.
    pub fn errors(&self) -> Vec<String> {
        match self {
            SchemaError::NotAnArray => vec![self.to_string()],
            SchemaError::Invalid { errors } => errors.clone(),
        }
    }
}

/// Bad field data on one record for one condition.
///
/// Never escapes the evaluator: the condition is treated as not matching.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Unparsable received timestamp '{0}'")]
    BadTimestamp(String),
}

/// A single action that failed against the mailbox.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Provider rejected {action}: {source}")]
    Provider {
        action: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Store rejected {action}: {source}")]
    Store {
        action: &'static str,
        #[source]
        source: DatabaseError,
    },
}

/// Fatal errors that abort a rule run before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Rules file not found: {}", .0.display())]
    RulesNotFound(PathBuf),

    #[error("Error reading rules file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in rules file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Could not load records: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias for mail-rules.
pub type Result<T> = std::result::Result<T, Error>;

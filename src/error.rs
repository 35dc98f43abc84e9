use std::io;

use crate::aggregate::BatchError;

/// Per-item error produced while normalizing, resolving or synchronizing.
///
/// Everything except configuration problems is collected by an
/// [`ErrorList`](crate::aggregate::ErrorList) and never stops sibling work.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to parse {event} payload: {message}")]
    Parse { event: String, message: String },

    #[error("Invalid source location '{src_path}': {message}")]
    SourceLocation { src_path: String, message: String },

    #[error("Service template '{service}' is not from {expected} (stored source: {actual})")]
    SourceMismatch {
        service: String,
        expected: String,
        actual: String,
    },

    #[error("Provider query failed: {operation}\n{message}")]
    ProviderQuery { operation: String, message: String },

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Template validation failed: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Workflow trigger failed: {0}")]
    Trigger(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Request-level outcome of a rejected or partially failed webhook.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown webhook provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Failed(#[from] BatchError),
}

/// Helper type for Results that use SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

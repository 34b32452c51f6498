use thiserror::Error;

use crate::job::JobState;

#[derive(Error, Debug)]
pub enum BatchVisionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The extraction call itself failed (transport, status, unreadable body).
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extraction service answered with an explicit `{"error": ...}` body.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid transition for item {item}: {from} -> {to}")]
    InvalidTransition {
        item: String,
        from: JobState,
        to: JobState,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A batch run is already in progress")]
    RunInProgress,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Item-level failures produced while checking a response against a schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for required field {field}: {reason}")]
    InvalidRequired { field: String, reason: String },

    #[error("Response contained no usable fields")]
    NoUsableFields,
}

/// A single field that could not be coerced to its declared type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Invalid number format for field: {field}")]
    InvalidNumber { field: String },

    #[error("Field {field} should be a number")]
    NotANumber { field: String },

    #[error("Invalid boolean value for field: {field}")]
    InvalidBoolean { field: String },

    #[error("Field {field} should be a boolean")]
    NotABoolean { field: String },
}

pub type Result<T> = std::result::Result<T, BatchVisionError>;

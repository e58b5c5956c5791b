//! Error types for request handling.

use thiserror::Error;

/// Result type alias using RequestError.
pub type RequestResult<T> = Result<T, RequestError>;

/// Errors raised while reading values out of a caller request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid date '{0}': expected YYYY-MM-DD, YYYYMMDD or START/END")]
    InvalidDate(String),

    #[error("Date list covers {count} days, the limit is {limit}")]
    TooManyDates { count: u64, limit: u64 },

    #[error("Invalid request document: {0}")]
    InvalidDocument(String),
}

impl RequestError {
    /// Shorthand for an [`RequestError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        RequestError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::InvalidDocument(err.to_string())
    }
}

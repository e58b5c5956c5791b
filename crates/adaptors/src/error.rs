//! Error types for the adaptors crate.

use adaptor_common::RequestError;
use definitions::DefinitionError;
use thiserror::Error;

/// Errors raised while validating, costing or retrieving a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdaptorError {
    #[error("Unknown variable(s): {}", .0.join(", "))]
    UnknownVariable(Vec<String>),

    #[error("Unknown model(s): {}", .0.join(", "))]
    UnknownModel(Vec<String>),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Request cannot be satisfied: {0}")]
    Constraint(String),

    #[error("Cannot estimate cost: {0}")]
    Estimation(String),

    #[error("{operation} is not allowed in state {state}")]
    Precondition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("No data: {0}")]
    NoData(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Reduction failed: {0}")]
    Reduce(String),

    #[error("Reformat failed: {0}")]
    Reformat(String),

    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<AdaptorError>,
    },

    #[error("Retrieval cancelled during step '{step}'")]
    Cancelled { step: String },

    #[error("Invalid adaptor configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl AdaptorError {
    /// Name of the pipeline step the error originated in, if any.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            AdaptorError::Step { step, .. } | AdaptorError::Cancelled { step } => Some(step),
            _ => None,
        }
    }

    /// True for errors caused by the caller's request rather than by the
    /// system. These are reported to the requester and never retried.
    pub fn is_caller_error(&self) -> bool {
        match self {
            AdaptorError::UnknownVariable(_)
            | AdaptorError::UnknownModel(_)
            | AdaptorError::Validation(_)
            | AdaptorError::Constraint(_)
            | AdaptorError::Request(_) => true,
            AdaptorError::Step { source, .. } => source.is_caller_error(),
            _ => false,
        }
    }

    /// Error raised inside a step, without the step wrapper.
    pub fn root(&self) -> &AdaptorError {
        match self {
            AdaptorError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn backend(err: anyhow::Error) -> Self {
        AdaptorError::Backend(format!("{:#}", err))
    }
}

/// Result type for adaptor operations.
pub type Result<T> = std::result::Result<T, AdaptorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wrapping_keeps_origin() {
        let err = AdaptorError::Step {
            step: "fetch".to_string(),
            source: Box::new(AdaptorError::NoData("nothing matched".to_string())),
        };
        assert_eq!(err.failed_step(), Some("fetch"));
        assert_eq!(err.root(), &AdaptorError::NoData("nothing matched".to_string()));
        assert!(!err.is_caller_error());
        assert_eq!(err.to_string(), "Step 'fetch' failed: No data: nothing matched");
    }

    #[test]
    fn test_caller_errors() {
        assert!(AdaptorError::UnknownVariable(vec!["x".into()]).is_caller_error());
        assert!(AdaptorError::Request(RequestError::MissingField("date".into())).is_caller_error());
        assert!(!AdaptorError::Estimation("overflow".into()).is_caller_error());
    }

    #[test]
    fn test_backend_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("fetching O3_USI");
        assert_eq!(
            AdaptorError::backend(err).to_string(),
            "Backend failure: fetching O3_USI: connection reset"
        );
    }
}

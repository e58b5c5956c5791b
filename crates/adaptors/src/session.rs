//! Per-request lifecycle over an adaptor.
//!
//! ```text
//! created → validated → constrained → estimated → retrieving → completed
//!                            │                        │
//!                            └──────── retrieve ──────┴──→ failed
//! ```
//!
//! `retrieve` is accepted once constraints have been applied, with or
//! without a cost estimate. A failed retrieval may be retried; whether that
//! is safe depends on the backend call being idempotent.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use adaptor_common::Request;

use crate::adaptor::{Adaptor, Retrieval, ValidatedRequest};
use crate::costing::CostEstimate;
use crate::error::{AdaptorError, Result};
use crate::licence::Licence;
use crate::receipt::Receipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Validated,
    Constrained,
    Estimated,
    Retrieving,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Validated => "validated",
            SessionState::Constrained => "constrained",
            SessionState::Estimated => "estimated",
            SessionState::Retrieving => "retrieving",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one request through an adaptor's capabilities in order.
///
/// A failing capability leaves the state where it was.
pub struct AdaptorSession {
    adaptor: Box<dyn Adaptor>,
    state: SessionState,
    request: Option<ValidatedRequest>,
    estimate: Option<CostEstimate>,
}

impl AdaptorSession {
    pub fn new(adaptor: Box<dyn Adaptor>) -> Self {
        Self {
            adaptor,
            state: SessionState::Created,
            request: None,
            estimate: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn adaptor(&self) -> &dyn Adaptor {
        self.adaptor.as_ref()
    }

    /// The current request, narrowed once constraints have been applied.
    pub fn request(&self) -> Option<&ValidatedRequest> {
        self.request.as_ref()
    }

    pub fn estimate(&self) -> Option<CostEstimate> {
        self.estimate
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AdaptorError::Precondition {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    pub fn validate(&mut self, request: &Request) -> Result<&ValidatedRequest> {
        self.require("validate", &[SessionState::Created])?;
        let validated = self.adaptor.validate(request)?;
        self.state = SessionState::Validated;
        Ok(self.request.insert(validated))
    }

    pub fn apply_constraints(&mut self) -> Result<&ValidatedRequest> {
        self.require("apply_constraints", &[SessionState::Validated])?;
        let validated = self.current("apply_constraints")?;
        let narrowed = self.adaptor.apply_constraints(validated)?;
        self.state = SessionState::Constrained;
        Ok(self.request.insert(narrowed))
    }

    pub fn estimate_costs(&mut self) -> Result<CostEstimate> {
        self.require(
            "estimate_costs",
            &[SessionState::Constrained, SessionState::Estimated],
        )?;
        let estimate = self.adaptor.estimate_costs(self.current("estimate_costs")?)?;
        self.estimate = Some(estimate);
        self.state = SessionState::Estimated;
        Ok(estimate)
    }

    /// Licences for the current selection. Available from validation on.
    pub fn get_licences(&self) -> Result<Vec<Licence>> {
        if self.state == SessionState::Created {
            return Err(AdaptorError::Precondition {
                operation: "get_licences",
                state: self.state.as_str(),
            });
        }
        Ok(self.adaptor.get_licences(self.current("get_licences")?))
    }

    /// Run the retrieval. On success the result carries a [`Receipt`].
    #[instrument(skip_all, fields(collection_id = %self.adaptor.collection_id(), state = %self.state))]
    pub async fn retrieve(&mut self, cancel: &CancellationToken) -> Retrieval {
        if let Err(e) = self.require(
            "retrieve",
            &[
                SessionState::Constrained,
                SessionState::Estimated,
                SessionState::Failed,
            ],
        ) {
            warn!(error = %e, "Retrieve refused");
            return Retrieval::rejected(e);
        }
        let Some(validated) = self.request.as_ref() else {
            return Retrieval::rejected(AdaptorError::Precondition {
                operation: "retrieve",
                state: self.state.as_str(),
            });
        };

        self.state = SessionState::Retrieving;
        let mut retrieval = self.adaptor.retrieve(validated, cancel).await;

        match &retrieval.result {
            Ok(output) => {
                self.state = SessionState::Completed;
                let receipt = Receipt::new(
                    self.adaptor.collection_id(),
                    validated.original.clone(),
                    output.size(),
                    output.filenames(),
                    self.adaptor.get_licences(validated),
                );
                info!(
                    request_id = %receipt.request_id,
                    download_size = receipt.download_size,
                    steps = retrieval.metrics.len(),
                    "Retrieval completed"
                );
                retrieval.receipt = Some(receipt);
            }
            Err(e) => {
                self.state = SessionState::Failed;
                warn!(
                    error = %e,
                    failed_step = e.failed_step().unwrap_or("none"),
                    steps = retrieval.metrics.len(),
                    "Retrieval failed"
                );
            }
        }
        retrieval
    }

    fn current(&self, operation: &'static str) -> Result<&ValidatedRequest> {
        self.request.as_ref().ok_or(AdaptorError::Precondition {
            operation,
            state: self.state.as_str(),
        })
    }
}

impl fmt::Debug for AdaptorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptorSession")
            .field("kind", &self.adaptor.kind())
            .field("state", &self.state)
            .field("request", &self.request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::{create_adaptor, AdaptorConfig, AdaptorKind, Backends};
    use definitions::Registry;
    use serde_json::json;
    use std::sync::Arc;
    use test_utils::definitions as docs;

    fn dummy_session() -> AdaptorSession {
        let registry = Arc::new(Registry::load(docs::MINIMAL).unwrap());
        let adaptor = create_adaptor(
            AdaptorConfig::new(AdaptorKind::Dummy, "dummy"),
            registry,
            Backends::new(),
        )
        .unwrap();
        AdaptorSession::new(adaptor)
    }

    #[tokio::test]
    async fn test_retrieve_before_validate_is_refused() {
        let mut session = dummy_session();
        let retrieval = session.retrieve(&CancellationToken::new()).await;

        assert!(retrieval.metrics.is_empty());
        assert!(retrieval.receipt.is_none());
        assert_eq!(
            retrieval.result.unwrap_err(),
            AdaptorError::Precondition {
                operation: "retrieve",
                state: "created"
            }
        );
        assert_eq!(session.state(), SessionState::Created);
    }

    #[tokio::test]
    async fn test_retrieve_requires_constraints() {
        let mut session = dummy_session();
        session.validate(&Request::new().with("size", 4)).unwrap();

        let retrieval = session.retrieve(&CancellationToken::new()).await;
        assert!(retrieval.metrics.is_empty());
        assert!(matches!(
            retrieval.result,
            Err(AdaptorError::Precondition { state: "validated", .. })
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut session = dummy_session();
        session.validate(&Request::new().with("size", json!(4))).unwrap();
        session.apply_constraints().unwrap();
        assert_eq!(session.estimate_costs().unwrap().size, 4);
        assert_eq!(session.state(), SessionState::Estimated);
        assert!(session.get_licences().unwrap().is_empty());

        let retrieval = session.retrieve(&CancellationToken::new()).await;
        assert_eq!(session.state(), SessionState::Completed);
        let receipt = retrieval.receipt.unwrap();
        assert_eq!(receipt.download_size, 4);
        assert_eq!(receipt.collection_id, "dummy");
        assert_eq!(receipt.request.get("size"), Some(&json!(4)));
    }

    #[test]
    fn test_validate_only_once() {
        let mut session = dummy_session();
        session.validate(&Request::new()).unwrap();
        assert!(matches!(
            session.validate(&Request::new()),
            Err(AdaptorError::Precondition { operation: "validate", .. })
        ));
        assert!(matches!(
            session.estimate_costs(),
            Err(AdaptorError::Precondition { operation: "estimate_costs", .. })
        ));
    }
}

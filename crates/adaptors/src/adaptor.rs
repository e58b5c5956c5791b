//! The adaptor capability set and the factory selecting a concrete variant.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use adaptor_common::Request;
use definitions::Registry;

use crate::backend::{FieldSource, PostProcessor, Reformatter};
use crate::constraints::ConstraintSet;
use crate::costing::{self, CostEstimate};
use crate::dummy::DummyAdaptor;
use crate::error::{AdaptorError, Result};
use crate::licence::{self, Licence};
use crate::normalize::{normalize, NormalizedRequest};
use crate::options::{DataFormat, DownloadFormat};
use crate::pipeline::StepMetric;
use crate::receipt::Receipt;
use crate::regional::RegionalForecastAdaptor;

/// Estimated size of one field when none is configured (1 MiB).
pub const DEFAULT_GRANULE_SIZE: u64 = 1 << 20;

fn default_granule_size() -> u64 {
    DEFAULT_GRANULE_SIZE
}

// ============================================================================
// Configuration
// ============================================================================

/// Concrete adaptor variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptorKind {
    /// Diagnostic adaptor producing synthetic payloads.
    Dummy,
    RegionalForecast,
}

impl AdaptorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptorKind::Dummy => "dummy",
            AdaptorKind::RegionalForecast => "regional_forecast",
        }
    }
}

/// Per-collection adaptor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptorConfig {
    pub kind: AdaptorKind,
    pub collection_id: String,
    /// Licences every request must accept.
    #[serde(default)]
    pub licences: Vec<Licence>,
    /// Extra licences keyed by frontend model name.
    #[serde(default)]
    pub model_licences: BTreeMap<String, Vec<Licence>>,
    #[serde(default)]
    pub constraints: ConstraintSet,
    /// Estimated bytes per field.
    #[serde(default = "default_granule_size")]
    pub granule_size: u64,
    /// Upper bound on the number of fields one request may address.
    #[serde(default)]
    pub max_fields: Option<u64>,
}

impl AdaptorConfig {
    pub fn new(kind: AdaptorKind, collection_id: impl Into<String>) -> Self {
        Self {
            kind,
            collection_id: collection_id.into(),
            licences: Vec::new(),
            model_licences: BTreeMap::new(),
            constraints: ConstraintSet::default(),
            granule_size: DEFAULT_GRANULE_SIZE,
            max_fields: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection_id.trim().is_empty() {
            return Err(AdaptorError::InvalidConfig(
                "collection_id must not be empty".to_string(),
            ));
        }
        if self.granule_size == 0 {
            return Err(AdaptorError::InvalidConfig(
                "granule_size must be greater than zero".to_string(),
            ));
        }
        if self.max_fields == Some(0) {
            return Err(AdaptorError::InvalidConfig(
                "max_fields must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// State shared by every adaptor variant.
#[derive(Debug, Clone)]
pub struct AdaptorCore {
    pub config: AdaptorConfig,
    pub registry: Arc<Registry>,
}

impl AdaptorCore {
    pub fn new(config: AdaptorConfig, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }
}

/// Collaborators a retrieval may delegate to.
#[derive(Clone, Default)]
pub struct Backends {
    pub source: Option<Arc<dyn FieldSource>>,
    pub post_processor: Option<Arc<dyn PostProcessor>>,
    pub reformatter: Option<Arc<dyn Reformatter>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn FieldSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn with_reformatter(mut self, reformatter: Arc<dyn Reformatter>) -> Self {
        self.reformatter = Some(reformatter);
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("source", &self.source.is_some())
            .field("post_processor", &self.post_processor.is_some())
            .field("reformatter", &self.reformatter.is_some())
            .finish()
    }
}

// ============================================================================
// Requests and results
// ============================================================================

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRequest {
    /// The request as the caller submitted it.
    pub original: Request,
    /// Frontend request, narrowed once constraints have been applied.
    pub request: Request,
    pub normalized: NormalizedRequest,
}

impl ValidatedRequest {
    pub fn new(original: Request, normalized: NormalizedRequest) -> Self {
        Self {
            request: original.clone(),
            original,
            normalized,
        }
    }
}

/// One produced file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Bytes,
}

impl OutputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Files produced by a successful retrieval.
///
/// Packaging into zip/tgz according to `download_format` is left to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutput {
    pub files: Vec<OutputFile>,
    pub data_format: DataFormat,
    pub download_format: DownloadFormat,
}

impl RetrievalOutput {
    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.files.iter().map(|f| f.bytes.len() as u64).sum()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

/// Outcome of a `retrieve` call. Metrics are returned whether or not the
/// retrieval succeeded.
#[derive(Debug)]
pub struct Retrieval {
    pub result: Result<RetrievalOutput>,
    pub metrics: Vec<StepMetric>,
    pub receipt: Option<Receipt>,
}

impl Retrieval {
    pub fn new(result: Result<RetrievalOutput>, metrics: Vec<StepMetric>) -> Self {
        Self {
            result,
            metrics,
            receipt: None,
        }
    }

    /// A retrieval refused before any step ran.
    pub fn rejected(error: AdaptorError) -> Self {
        Self::new(Err(error), Vec::new())
    }
}

// ============================================================================
// Capability set
// ============================================================================

/// Capabilities every adaptor exposes to the hosting broker.
///
/// Only `retrieve` performs backend I/O and every variant supplies its own.
/// The remaining capabilities default to behaviour driven by the registry and
/// the adaptor configuration.
#[async_trait]
pub trait Adaptor: Send + Sync {
    fn core(&self) -> &AdaptorCore;

    fn kind(&self) -> AdaptorKind {
        self.core().config.kind
    }

    fn collection_id(&self) -> &str {
        &self.core().config.collection_id
    }

    /// Check the request shape and translate it to its backend form.
    fn validate(&self, request: &Request) -> Result<ValidatedRequest> {
        let normalized = normalize(request, &self.core().registry)?;
        Ok(ValidatedRequest::new(request.clone(), normalized))
    }

    /// Narrow the request to combinations the backend can serve.
    fn apply_constraints(&self, validated: &ValidatedRequest) -> Result<ValidatedRequest> {
        let narrowed = self.core().config.constraints.apply(&validated.request)?;
        if narrowed == validated.request {
            return Ok(validated.clone());
        }
        let normalized = normalize(&narrowed, &self.core().registry)?;
        Ok(ValidatedRequest {
            original: validated.original.clone(),
            request: narrowed,
            normalized,
        })
    }

    fn estimate_costs(&self, validated: &ValidatedRequest) -> Result<CostEstimate> {
        let config = &self.core().config;
        costing::estimate(
            &validated.normalized.backend,
            config.granule_size,
            config.max_fields,
        )
    }

    fn get_licences(&self, validated: &ValidatedRequest) -> Vec<Licence> {
        let config = &self.core().config;
        // A validated request always has string-coercible models.
        let models = validated
            .request
            .values("model")
            .ok()
            .flatten()
            .unwrap_or_default();
        licence::resolve(&config.licences, &config.model_licences, &models)
    }

    /// Fetch and produce the requested data.
    async fn retrieve(&self, validated: &ValidatedRequest, cancel: &CancellationToken) -> Retrieval;
}

/// Build the adaptor variant selected by `config.kind`.
pub fn create_adaptor(
    config: AdaptorConfig,
    registry: Arc<Registry>,
    backends: Backends,
) -> Result<Box<dyn Adaptor>> {
    config.validate()?;
    info!(
        kind = config.kind.as_str(),
        collection_id = %config.collection_id,
        "Creating adaptor"
    );

    let core = AdaptorCore::new(config, registry);
    let adaptor: Box<dyn Adaptor> = match core.config.kind {
        AdaptorKind::Dummy => Box::new(DummyAdaptor::new(core)),
        AdaptorKind::RegionalForecast => Box::new(RegionalForecastAdaptor::new(core, backends)?),
    };
    Ok(adaptor)
}

//! Adaptor execution for regional forecast data products.
//!
//! # Architecture
//!
//! - [`normalize`]: frontend request → backend request plus extracted
//!   format/reduction directives, using the definition registry
//! - [`Adaptor`]: the capability set every adaptor exposes (validate,
//!   constraints, costing, licences, retrieve) with shared defaults
//! - [`AdaptorSession`]: enforces the order in which the capabilities are
//!   called for one request
//! - [`PipelineExecutor`]: runs `retrieve` as named, timed, cancellable steps
//!
//! Backend transport, post-processing and netCDF writing are collaborators
//! behind the traits in [`backend`].

pub mod adaptor;
pub mod backend;
pub mod constraints;
pub mod costing;
mod dummy;
pub mod error;
pub mod export;
pub mod licence;
pub mod normalize;
pub mod options;
pub mod pipeline;
pub mod receipt;
mod regional;
pub mod session;

// Re-exports
pub use adaptor::{
    create_adaptor, Adaptor, AdaptorConfig, AdaptorCore, AdaptorKind, Backends, OutputFile,
    Retrieval, RetrievalOutput, ValidatedRequest,
};
pub use backend::{FieldSource, PostProcessor, Reformatter, RetrievedField};
pub use constraints::ConstraintSet;
pub use costing::CostEstimate;
pub use dummy::DummyAdaptor;
pub use error::{AdaptorError, Result};
pub use export::{netcdf_groups, NetcdfGroup, NetcdfLayout, NetcdfVariableLayout};
pub use licence::Licence;
pub use normalize::{normalize, NormalizedRequest};
pub use options::{AdaptorOptions, DataFormat, DownloadFormat, ReduceSpec};
pub use pipeline::{PipelineExecutor, PipelineRun, Step, StepMetric, StepOutcome, StepStatus};
pub use receipt::Receipt;
pub use regional::RegionalForecastAdaptor;
pub use session::{AdaptorSession, SessionState};

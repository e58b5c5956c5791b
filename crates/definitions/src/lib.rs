//! Variable and model definition registry.
//!
//! Loads the declarative definitions document that maps the catalogue's
//! frontend vocabulary (variable and model names shown to users) onto a
//! backend provider's codes and onto GRIB key/value signatures, and provides
//! the reverse translation used when decoding backend payloads.
//!
//! # Architecture
//!
//! - [`Registry`]: immutable, validated index built once from the document
//! - [`RegistryHandle`]: publishes whole registry snapshots for hot reload
//! - [`EncodingResolver`]: signature → definition resolution, reconstruction
//!   of the backend request of a decoded field, and synthesis of parameter
//!   tables for encodings the decoder does not know natively

pub mod error;
mod handle;
pub mod param_table;
mod product;
pub mod registry;
mod resolver;
pub mod signature;
pub mod source;

// Re-exports
pub use error::{DefinitionError, RegistryLoadError, Result};
pub use handle::RegistryHandle;
pub use param_table::{ParameterTable, ParameterTableEntry};
pub use product::ProductType;
pub use registry::{
    definitions_path, definitions_path_from, Definition, DefinitionKind, ModelDefinition,
    ModelExport, Registry, SynthesizedParameter, VariableDefinition, VariableExport,
    DEFAULT_DEFINITIONS_PATH,
};
pub use resolver::{EncodingResolver, FieldRequest};
pub use signature::{FieldHeader, GribSignature, GribValue, GribValueType};

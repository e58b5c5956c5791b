//! Error types for the definitions crate.

use std::path::PathBuf;
use thiserror::Error;

use crate::registry::DefinitionKind;
use crate::signature::GribValueType;

/// Reasons the definitions document cannot be turned into a registry.
///
/// All of these are fatal at process start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryLoadError {
    #[error("Cannot read definitions from {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Malformed definitions document: {0}")]
    Malformed(String),

    #[error("Duplicate {kind} frontend name: {name}")]
    DuplicateFrontendName { kind: DefinitionKind, name: String },

    #[error("{kind} '{name}' declares no grib_representations")]
    EmptySignatures { kind: DefinitionKind, name: String },

    #[error("paramId {param_id} is assigned to both '{first}' and '{second}'")]
    DuplicateParameterId {
        param_id: u32,
        first: String,
        second: String,
    },

    #[error("Ambiguous {kind} signature {signature}: claimed by '{first}' and '{second}'")]
    AmbiguousSignature {
        kind: DefinitionKind,
        signature: String,
        first: String,
        second: String,
    },

    #[error("{kind} '{second}' encoding {signature} is unreachable: '{first}' already matches it with {shadowed_by}")]
    ShadowedSignature {
        kind: DefinitionKind,
        signature: String,
        shadowed_by: String,
        first: String,
        second: String,
    },

    #[error("GRIB key '{key}' used as {found} by '{name}' but as {expected} elsewhere")]
    KeyTypeMismatch {
        key: String,
        expected: GribValueType,
        found: GribValueType,
        name: String,
    },
}

/// Errors raised by registry lookups and the encoding resolver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error(transparent)]
    RegistryLoad(#[from] RegistryLoadError),

    #[error("No {kind} matches {key}")]
    NotFound { kind: String, key: String },

    #[error("Parameter table conflict: paramId {param_id} claimed by '{first}' and '{second}'")]
    ParameterTableConflict {
        param_id: u32,
        first: String,
        second: String,
    },

    #[error("Malformed field header key '{key}': {message}")]
    MalformedHeader { key: String, message: String },
}

impl DefinitionError {
    pub(crate) fn not_found(kind: impl ToString, key: impl Into<String>) -> Self {
        DefinitionError::NotFound {
            kind: kind.to_string(),
            key: key.into(),
        }
    }
}

/// Result type for definition lookups.
pub type Result<T> = std::result::Result<T, DefinitionError>;

//! Definition registry built from the declarative definitions document.
//!
//! The registry is validated once at load time and never mutated afterwards,
//! so it can be shared between concurrent retrievals without locking. All
//! reverse indexes (signature → definition) are built during load.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::error::{DefinitionError, RegistryLoadError, Result};
use crate::product::ProductType;
use crate::signature::{GribSignature, GribValueType};
use crate::source::{DefinitionsDocument, ModelEntry, VariableEntry};

/// Keys every decoded field is read with, independent of the document.
const BASE_KEY_TYPES: [(&str, GribValueType); 3] = [
    ("dataDate", GribValueType::Int),
    ("dataTime", GribValueType::Int),
    ("forecastTime", GribValueType::Int),
];

// ============================================================================
// Definition Types
// ============================================================================

/// The two vocabularies held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Variable,
    Model,
}

impl DefinitionKind {
    /// Request field carrying values of this kind.
    pub fn request_key(&self) -> &'static str {
        match self {
            DefinitionKind::Variable => "variable",
            DefinitionKind::Model => "model",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.request_key())
    }
}

/// Parameter-table entry to fabricate for a variable the decoder does not
/// know natively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedParameter {
    pub short_name: String,
    pub name: String,
    pub param_id: u32,
    pub units: String,
}

/// How a variable is written when exporting to netCDF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableExport {
    pub varname: String,
    pub species: String,
    pub shortname: String,
    pub units: String,
    /// Multiplier from the GRIB unit to the exported unit.
    pub scale: f64,
    pub standard_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDefinition {
    pub frontend_name: String,
    pub backend_name: String,
    pub standard_name: Option<String>,
    /// Hidden from discovery, still accessible.
    pub hidden: bool,
    pub display_label: String,
    pub display_units: String,
    /// Historical encodings, tried in declared order.
    pub binary_signatures: Vec<GribSignature>,
    pub synthesized_parameter: Option<SynthesizedParameter>,
    pub export: VariableExport,
}

impl VariableDefinition {
    /// Standard name written to netCDF, falling back to "Not Defined".
    pub fn export_standard_name(&self) -> &str {
        self.export
            .standard_name
            .as_deref()
            .or(self.standard_name.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("Not Defined")
    }
}

/// Global netCDF attributes contributed by a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelExport {
    pub institution: String,
    pub name: String,
    pub name2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDefinition {
    pub frontend_name: String,
    pub backend_name: String,
    pub display_label: String,
    pub binary_signatures: Vec<GribSignature>,
    pub export: ModelExport,
}

/// A borrowed definition of either kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Definition<'a> {
    Variable(&'a VariableDefinition),
    Model(&'a ModelDefinition),
}

impl<'a> Definition<'a> {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Definition::Variable(_) => DefinitionKind::Variable,
            Definition::Model(_) => DefinitionKind::Model,
        }
    }

    pub fn frontend_name(&self) -> &'a str {
        match self {
            Definition::Variable(v) => &v.frontend_name,
            Definition::Model(m) => &m.frontend_name,
        }
    }

    pub fn backend_name(&self) -> &'a str {
        match self {
            Definition::Variable(v) => &v.backend_name,
            Definition::Model(m) => &m.backend_name,
        }
    }

    pub fn binary_signatures(&self) -> &'a [GribSignature] {
        match self {
            Definition::Variable(v) => &v.binary_signatures,
            Definition::Model(m) => &m.binary_signatures,
        }
    }

    pub fn as_variable(&self) -> Option<&'a VariableDefinition> {
        match self {
            Definition::Variable(v) => Some(v),
            Definition::Model(_) => None,
        }
    }

    pub fn as_model(&self) -> Option<&'a ModelDefinition> {
        match self {
            Definition::Model(m) => Some(m),
            Definition::Variable(_) => None,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable index over the variable and model definitions.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    variables: Vec<VariableDefinition>,
    models: Vec<ModelDefinition>,
    variable_index: HashMap<String, usize>,
    model_index: HashMap<String, usize>,
    key_types: BTreeMap<String, GribValueType>,
}

/// Shipped definitions document, relative to the working directory.
pub const DEFAULT_DEFINITIONS_PATH: &str = "config/regional_fc_definitions.yaml";

/// Get the default definitions document path.
///
/// Checks the DEFINITIONS_PATH environment variable first, falls back to
/// "config/regional_fc_definitions.yaml".
pub fn definitions_path() -> PathBuf {
    definitions_path_from(env::var_os("DEFINITIONS_PATH"))
}

/// Resolve the definitions path from an already-read override.
pub fn definitions_path_from(overridden: Option<OsString>) -> PathBuf {
    overridden
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFINITIONS_PATH))
}

impl Registry {
    /// Parse and validate a YAML definitions document.
    pub fn load(source: &str) -> std::result::Result<Self, RegistryLoadError> {
        let document: DefinitionsDocument = serde_yaml::from_str(source)
            .map_err(|e| RegistryLoadError::Malformed(e.to_string()))?;
        Self::from_document(document)
    }

    /// Load the definitions document at `path`.
    ///
    /// Callers should treat errors as fatal startup errors.
    pub fn load_path(path: impl AsRef<Path>) -> std::result::Result<Self, RegistryLoadError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            error!(
                path = ?path,
                error = %e,
                "CRITICAL: Cannot read definitions document. Adaptors cannot start."
            );
            RegistryLoadError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        Self::load(&contents).map_err(|e| {
            error!(
                path = ?path,
                error = %e,
                "CRITICAL: Invalid definitions document. Adaptors cannot start."
            );
            e
        })
    }

    /// Load from [`definitions_path`].
    pub fn load_default() -> std::result::Result<Self, RegistryLoadError> {
        Self::load_path(definitions_path())
    }

    /// Validate a parsed document and build the indexes.
    pub fn from_document(document: DefinitionsDocument) -> std::result::Result<Self, RegistryLoadError> {
        let mut registry = Registry::default();
        let mut param_ids: HashMap<u32, String> = HashMap::new();

        for entry in document.variable {
            let definition = variable_from_entry(entry);
            let name = definition.frontend_name.clone();

            if registry.variable_index.contains_key(&name) {
                return Err(RegistryLoadError::DuplicateFrontendName {
                    kind: DefinitionKind::Variable,
                    name,
                });
            }
            if definition.binary_signatures.is_empty() {
                return Err(RegistryLoadError::EmptySignatures {
                    kind: DefinitionKind::Variable,
                    name,
                });
            }
            if let Some(param) = &definition.synthesized_parameter {
                if let Some(first) = param_ids.insert(param.param_id, name.clone()) {
                    return Err(RegistryLoadError::DuplicateParameterId {
                        param_id: param.param_id,
                        first,
                        second: name,
                    });
                }
            }

            check_signatures(
                DefinitionKind::Variable,
                &name,
                &definition.binary_signatures,
                registry
                    .variables
                    .iter()
                    .map(|v| (v.frontend_name.as_str(), v.binary_signatures.as_slice())),
            )?;
            registry.variable_index.insert(name, registry.variables.len());
            registry.variables.push(definition);
        }

        for entry in document.model {
            let definition = model_from_entry(entry);
            let name = definition.frontend_name.clone();

            if registry.model_index.contains_key(&name) {
                return Err(RegistryLoadError::DuplicateFrontendName {
                    kind: DefinitionKind::Model,
                    name,
                });
            }
            if definition.binary_signatures.is_empty() {
                return Err(RegistryLoadError::EmptySignatures {
                    kind: DefinitionKind::Model,
                    name,
                });
            }

            check_signatures(
                DefinitionKind::Model,
                &name,
                &definition.binary_signatures,
                registry
                    .models
                    .iter()
                    .map(|m| (m.frontend_name.as_str(), m.binary_signatures.as_slice())),
            )?;
            registry.model_index.insert(name, registry.models.len());
            registry.models.push(definition);
        }

        registry.key_types = collect_key_types(&registry)?;

        debug!(
            variables = registry.variables.len(),
            models = registry.models.len(),
            grib_keys = registry.key_types.len(),
            "Built definition registry"
        );

        Ok(registry)
    }

    /// Variable definitions in declared order.
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Model definitions in declared order.
    pub fn models(&self) -> &[ModelDefinition] {
        &self.models
    }

    pub fn variable(&self, frontend_name: &str) -> Option<&VariableDefinition> {
        self.variable_index
            .get(frontend_name)
            .map(|&i| &self.variables[i])
    }

    pub fn model(&self, frontend_name: &str) -> Option<&ModelDefinition> {
        self.model_index.get(frontend_name).map(|&i| &self.models[i])
    }

    /// Look up a definition by its frontend name.
    pub fn lookup_by_frontend_name(&self, kind: DefinitionKind, name: &str) -> Result<Definition<'_>> {
        let found = match kind {
            DefinitionKind::Variable => self.variable(name).map(Definition::Variable),
            DefinitionKind::Model => self.model(name).map(Definition::Model),
        };
        found.ok_or_else(|| DefinitionError::not_found(kind, format!("frontend name '{}'", name)))
    }

    /// First definition, in declared order, using `name` as backend code.
    pub fn lookup_by_backend_name(&self, kind: DefinitionKind, name: &str) -> Result<Definition<'_>> {
        let found = match kind {
            DefinitionKind::Variable => self
                .variables
                .iter()
                .find(|v| v.backend_name == name)
                .map(Definition::Variable),
            DefinitionKind::Model => self
                .models
                .iter()
                .find(|m| m.backend_name == name)
                .map(Definition::Model),
        };
        found.ok_or_else(|| DefinitionError::not_found(kind, format!("backend name '{}'", name)))
    }

    /// Look up the definition owning a signature.
    ///
    /// The signature is treated as an observed header: definitions are
    /// scanned in declared order, each definition's encodings in declared
    /// order, and the first encoding fully contained in the header wins.
    pub fn lookup_by_signature(&self, kind: DefinitionKind, signature: &GribSignature) -> Result<Definition<'_>> {
        let found = match kind {
            DefinitionKind::Variable => self
                .variables
                .iter()
                .find(|v| v.binary_signatures.iter().any(|s| signature.matches(s)))
                .map(Definition::Variable),
            DefinitionKind::Model => self
                .models
                .iter()
                .find(|m| m.binary_signatures.iter().any(|s| signature.matches(s)))
                .map(Definition::Model),
        };
        found.ok_or_else(|| DefinitionError::not_found(kind, format!("signature {}", signature)))
    }

    /// Type each GRIB key must be read as when decoding a field.
    pub fn key_types(&self) -> &BTreeMap<String, GribValueType> {
        &self.key_types
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.models.is_empty()
    }

    /// Append a variable without any load-time checks.
    #[cfg(test)]
    pub(crate) fn push_variable_unchecked(&mut self, definition: VariableDefinition) {
        self.variables.push(definition);
    }
}

// ============================================================================
// Load Helpers
// ============================================================================

fn variable_from_entry(entry: VariableEntry) -> VariableDefinition {
    VariableDefinition {
        frontend_name: entry.frontend_api_name,
        backend_name: entry.backend_api_name,
        standard_name: entry.standard_name,
        hidden: entry.hidden,
        display_label: entry.form_label,
        display_units: entry.var_table_units,
        binary_signatures: entry.grib_representations,
        synthesized_parameter: entry.eccodes_definition.map(|d| SynthesizedParameter {
            short_name: d.short_name,
            name: d.name,
            param_id: d.param_id,
            units: d.units,
        }),
        export: VariableExport {
            varname: entry.netcdf.varname,
            species: entry.netcdf.species,
            shortname: entry.netcdf.shortname,
            units: entry.netcdf.units,
            scale: entry.netcdf.scale,
            standard_name: entry.netcdf.standard_name,
        },
    }
}

fn model_from_entry(entry: ModelEntry) -> ModelDefinition {
    ModelDefinition {
        frontend_name: entry.frontend_api_name,
        backend_name: entry.backend_api_name,
        display_label: entry.form_label,
        binary_signatures: entry.grib_representations,
        export: ModelExport {
            institution: entry.netcdf.institution,
            name: entry.netcdf.name,
            name2: entry.netcdf.name2,
        },
    }
}

/// Reject encodings that an earlier definition of the same kind already
/// answers for. An identical encoding is ambiguous; an encoding containing
/// an earlier one could never be reached by a declared-order lookup.
fn check_signatures<'a>(
    kind: DefinitionKind,
    name: &str,
    signatures: &[GribSignature],
    earlier: impl Iterator<Item = (&'a str, &'a [GribSignature])>,
) -> std::result::Result<(), RegistryLoadError> {
    for (owner, claimed) in earlier {
        for existing in claimed {
            for signature in signatures {
                if signature == existing {
                    return Err(RegistryLoadError::AmbiguousSignature {
                        kind,
                        signature: signature.to_string(),
                        first: owner.to_string(),
                        second: name.to_string(),
                    });
                }
                if signature.matches(existing) {
                    return Err(RegistryLoadError::ShadowedSignature {
                        kind,
                        signature: signature.to_string(),
                        shadowed_by: existing.to_string(),
                        first: owner.to_string(),
                        second: name.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// All values of a GRIB key must share one type across the document.
fn collect_key_types(
    registry: &Registry,
) -> std::result::Result<BTreeMap<String, GribValueType>, RegistryLoadError> {
    let mut key_types: BTreeMap<String, GribValueType> = BASE_KEY_TYPES
        .iter()
        .map(|(k, t)| (k.to_string(), *t))
        .collect();

    let products: Vec<(String, Vec<GribSignature>)> = ProductType::ALL
        .iter()
        .map(|p| (p.as_str().to_string(), vec![p.signature()]))
        .collect();

    let owners = products
        .iter()
        .map(|(name, sigs)| (name.as_str(), sigs.as_slice()))
        .chain(
            registry
                .variables
                .iter()
                .map(|v| (v.frontend_name.as_str(), v.binary_signatures.as_slice())),
        )
        .chain(
            registry
                .models
                .iter()
                .map(|m| (m.frontend_name.as_str(), m.binary_signatures.as_slice())),
        );

    for (name, signatures) in owners {
        for signature in signatures {
            for (key, value) in signature.iter() {
                let found = value.value_type();
                match key_types.get(key) {
                    Some(&expected) if expected != found => {
                        return Err(RegistryLoadError::KeyTypeMismatch {
                            key: key.to_string(),
                            expected,
                            found,
                            name: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        key_types.insert(key.to_string(), found);
                    }
                }
            }
        }
    }

    Ok(key_types)
}

//! Translation between decoded GRIB headers and registry definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{DefinitionError, Result};
use crate::param_table::{ParameterTable, ParameterTableEntry};
use crate::product::ProductType;
use crate::registry::{Definition, DefinitionKind, ModelDefinition, Registry, VariableDefinition};
use crate::signature::{FieldHeader, GribValue};

/// Backend request reconstructed from one decoded message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRequest {
    pub variable: String,
    pub model: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HHMM`
    pub time: String,
    pub step: String,
    pub level: String,
}

impl FieldRequest {
    /// Value of a request key, as the backend spells it.
    pub fn value(&self, key: &str) -> Option<&str> {
        match key {
            "variable" => Some(&self.variable),
            "model" => Some(&self.model),
            "type" => Some(self.product_type.as_str()),
            "date" => Some(&self.date),
            "time" => Some(&self.time),
            "step" => Some(&self.step),
            "level" => Some(&self.level),
            _ => None,
        }
    }
}

/// Resolves observed encodings against one registry snapshot.
#[derive(Debug, Clone)]
pub struct EncodingResolver {
    registry: Arc<Registry>,
}

impl EncodingResolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Translate an observed signature back to the definition it encodes.
    pub fn resolve_for_decode(&self, kind: DefinitionKind, header: &FieldHeader) -> Result<Definition<'_>> {
        self.registry.lookup_by_signature(kind, header)
    }

    pub fn resolve_variable(&self, header: &FieldHeader) -> Result<&VariableDefinition> {
        self.registry
            .lookup_by_signature(DefinitionKind::Variable, header)?
            .as_variable()
            .ok_or_else(|| DefinitionError::not_found(DefinitionKind::Variable, header.to_string()))
    }

    pub fn resolve_model(&self, header: &FieldHeader) -> Result<&ModelDefinition> {
        self.registry
            .lookup_by_signature(DefinitionKind::Model, header)?
            .as_model()
            .ok_or_else(|| DefinitionError::not_found(DefinitionKind::Model, header.to_string()))
    }

    /// First product type whose encoding the header carries.
    pub fn resolve_product_type(&self, header: &FieldHeader) -> Result<ProductType> {
        ProductType::ALL
            .into_iter()
            .find(|p| header.matches(&p.signature()))
            .ok_or_else(|| DefinitionError::not_found("type", header.to_string()))
    }

    /// Reconstruct the backend request that produced a decoded message.
    pub fn field_to_request(&self, header: &FieldHeader) -> Result<FieldRequest> {
        let variable = self.resolve_variable(header)?;
        let model = self.resolve_model(header)?;
        let product_type = self.resolve_product_type(header)?;

        let date = int_key(header, "dataDate")?;
        let time = int_key(header, "dataTime")?;
        let step = match product_type {
            ProductType::Forecast => int_key(header, "forecastTime")?.to_string(),
            ProductType::Analysis => "0".to_string(),
        };
        let level = header
            .get("level")
            .map(GribValue::to_string)
            .ok_or_else(|| malformed("level", "missing"))?;

        if !(0..=99_991_231).contains(&date) {
            return Err(malformed("dataDate", format!("{} is not a YYYYMMDD date", date)));
        }

        Ok(FieldRequest {
            variable: variable.backend_name.clone(),
            model: model.backend_name.clone(),
            product_type,
            date: format!("{}-{:02}-{:02}", date / 10000, (date / 100) % 100, date % 100),
            time: format!("{:02}{:02}", time / 100, time % 100),
            step,
            level,
        })
    }

    /// Build the parameter table for every variable carrying a synthesized
    /// parameter, ordered by id.
    ///
    /// Ids are unique after a successful load; a clash here is reported
    /// rather than overwritten.
    #[instrument(skip(self))]
    pub fn synthesize_parameter_table(&self) -> Result<ParameterTable> {
        let mut by_id: BTreeMap<u32, ParameterTableEntry> = BTreeMap::new();

        for variable in self.registry.variables() {
            let Some(param) = &variable.synthesized_parameter else {
                continue;
            };
            if let Some(existing) = by_id.get(&param.param_id) {
                return Err(DefinitionError::ParameterTableConflict {
                    param_id: param.param_id,
                    first: existing.frontend_name.clone(),
                    second: variable.frontend_name.clone(),
                });
            }
            by_id.insert(
                param.param_id,
                ParameterTableEntry {
                    param_id: param.param_id,
                    short_name: param.short_name.clone(),
                    name: param.name.clone(),
                    units: param.units.clone(),
                    frontend_name: variable.frontend_name.clone(),
                    signatures: variable.binary_signatures.clone(),
                },
            );
        }

        debug!(entries = by_id.len(), "Synthesized parameter table");
        Ok(ParameterTable::from_sorted(by_id.into_values().collect()))
    }
}

fn int_key(header: &FieldHeader, key: &str) -> Result<i64> {
    match header.get(key) {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| malformed(key, format!("expected integer, found {}", value.value_type()))),
        None => Err(malformed(key, "missing")),
    }
}

fn malformed(key: &str, message: impl Into<String>) -> DefinitionError {
    DefinitionError::MalformedHeader {
        key: key.to_string(),
        message: message.into(),
    }
}

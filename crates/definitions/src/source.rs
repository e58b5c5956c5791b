//! Schema of the declarative definitions document.
//!
//! ```yaml
//! variable:
//!   - frontend_api_name: ozone
//!     backend_api_name: O3_USI
//!     standard_name: mass_concentration_of_ozone_in_air
//!     hidden: false
//!     form_label: Ozone
//!     var_table_units: µg/m3
//!     grib_representations:
//!       - {parameterNumber: 0, constituentType: 0, productDefinitionTemplateNumber: 40}
//!     netcdf: {varname: o3_conc, species: Ozone, shortname: O3, units: µg/m3, scale: 1000000000.0}
//! model:
//!   - backend_api_name: ENS
//!     frontend_api_name: ensemble
//!     form_label: Ensemble median
//!     grib_representations:
//!       - {centre: 85, subCentre: 2}
//!     netcdf: {institution: Meteo France, name: ENSEMBLE, name2: ENSEMBLE}
//! ```

use serde::{Deserialize, Serialize};

use crate::signature::GribSignature;

/// Root of the definitions document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionsDocument {
    #[serde(default)]
    pub variable: Vec<VariableEntry>,
    #[serde(default)]
    pub model: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEntry {
    pub frontend_api_name: String,
    pub backend_api_name: String,
    #[serde(default)]
    pub standard_name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    pub form_label: String,
    #[serde(default)]
    pub var_table_units: String,
    /// Historical encodings, most relevant first. Emptiness is reported as a
    /// load error rather than a parse error.
    #[serde(default)]
    pub grib_representations: Vec<GribSignature>,
    #[serde(default)]
    pub eccodes_definition: Option<EccodesDefinition>,
    pub netcdf: NetcdfVariable,
}

/// Parameter definition to synthesize for encodings the decoder lacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EccodesDefinition {
    #[serde(rename = "shortName")]
    pub short_name: String,
    pub name: String,
    #[serde(rename = "paramId")]
    pub param_id: u32,
    pub units: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetcdfVariable {
    pub varname: String,
    pub species: String,
    pub shortname: String,
    pub units: String,
    pub scale: f64,
    #[serde(default)]
    pub standard_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub backend_api_name: String,
    pub frontend_api_name: String,
    pub form_label: String,
    #[serde(default)]
    pub grib_representations: Vec<GribSignature>,
    pub netcdf: NetcdfModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetcdfModel {
    pub institution: String,
    pub name: String,
    pub name2: String,
}

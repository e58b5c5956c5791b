//! Common test fixtures for adaptor tests.
//!
//! Definition documents mirror the layout of the shipped
//! `config/regional_fc_definitions.yaml`.

/// Definition documents.
pub mod definitions {
    /// The shipped regional forecast definitions.
    pub const SHIPPED: &str = include_str!("../../../config/regional_fc_definitions.yaml");

    /// One variable, one model.
    pub const MINIMAL: &str = r#"
variable:
  - frontend_api_name: ozone
    backend_api_name: O3_USI
    standard_name: mass_concentration_of_ozone_in_air
    hidden: false
    form_label: Ozone
    var_table_units: µg/m3
    grib_representations:
      - {parameterNumber: 0, constituentType: 0, productDefinitionTemplateNumber: 40}
    netcdf: {varname: o3_conc, species: Ozone, shortname: O3, units: µg/m3, scale: 1000000000.0}
model:
  - backend_api_name: ENS
    frontend_api_name: ensemble
    form_label: Ensemble median
    grib_representations:
      - {centre: 85, subCentre: 2}
    netcdf: {institution: Meteo France, name: ENSEMBLE, name2: ENSEMBLE}
"#;

    /// Two variables claiming the same encoding.
    pub const DUPLICATE_SIGNATURE: &str = r#"
variable:
  - frontend_api_name: ozone
    backend_api_name: O3_USI
    form_label: Ozone
    grib_representations:
      - {parameterNumber: 0, constituentType: 0}
    netcdf: {varname: o3_conc, species: Ozone, shortname: O3, units: µg/m3, scale: 1000000000.0}
  - frontend_api_name: ozone_legacy
    backend_api_name: O3
    form_label: Ozone (legacy)
    grib_representations:
      - {parameterNumber: 1, constituentType: 0}
      - {parameterNumber: 0, constituentType: 0}
    netcdf: {varname: o3, species: Ozone, shortname: O3, units: µg/m3, scale: 1000000000.0}
"#;

    /// A later encoding containing an earlier variable's encoding.
    pub const SHADOWED_SIGNATURE: &str = r#"
variable:
  - frontend_api_name: alpha
    backend_api_name: ALPHA
    form_label: Alpha
    grib_representations:
      - {parameterNumber: 0}
    netcdf: {varname: alpha, species: Alpha, shortname: A, units: x, scale: 1.0}
  - frontend_api_name: beta
    backend_api_name: BETA
    form_label: Beta
    grib_representations:
      - {parameterNumber: 0, constituentType: 5}
    netcdf: {varname: beta, species: Beta, shortname: B, units: x, scale: 1.0}
"#;

    /// The specific encoding is declared before the general one.
    pub const OVERLAPPING_SIGNATURE: &str = r#"
variable:
  - frontend_api_name: beta
    backend_api_name: BETA
    form_label: Beta
    grib_representations:
      - {parameterNumber: 0, constituentType: 5}
    netcdf: {varname: beta, species: Beta, shortname: B, units: x, scale: 1.0}
  - frontend_api_name: alpha
    backend_api_name: ALPHA
    form_label: Alpha
    grib_representations:
      - {parameterNumber: 0}
    netcdf: {varname: alpha, species: Alpha, shortname: A, units: x, scale: 1.0}
"#;

    /// Two synthesized parameters sharing paramId 999025.
    pub const DUPLICATE_PARAM_ID: &str = r#"
variable:
  - frontend_api_name: glyoxal
    backend_api_name: C2H2O2_USI
    form_label: Glyoxal
    grib_representations:
      - {parameterNumber: 0, constituentType: 10038}
    eccodes_definition: {shortName: glyox, name: Glyoxal, paramId: 999025, units: kg m**-3}
    netcdf: {varname: glyox_conc, species: Glyoxal, shortname: C2H2O2, units: µg/m3, scale: 1000000000.0}
  - frontend_api_name: pm2.5_total_organic_matter
    backend_api_name: PM25_TOM_USI
    form_label: PM2.5 total organic matter
    grib_representations:
      - {parameterNumber: 0, constituentType: 62010}
    eccodes_definition: {shortName: pm2p5_tom, name: PM2.5 total organic matter, paramId: 999025, units: kg m**-3}
    netcdf: {varname: pm2p5_total_om_conc, species: PM2.5 Total Organic Matter, shortname: PM25_TOM, units: µg/m3, scale: 1000000000.0}
"#;
}

/// Request documents as a caller would submit them.
pub mod requests {
    /// A complete regional forecast request.
    pub const OZONE_FORECAST: &str = r#"{
        "variable": ["ozone", "nitrogen_dioxide"],
        "model": ["ensemble"],
        "level": ["0"],
        "date": ["2024-03-01/2024-03-02"],
        "type": ["forecast"],
        "time": ["00:00"],
        "step": ["0", "1"],
        "data_format": "grib"
    }"#;

    /// Same request asking for netCDF inside a zip.
    pub const OZONE_FORECAST_NETCDF_ZIP: &str = r#"{
        "variable": "ozone",
        "model": "ensemble",
        "level": "0",
        "date": "2024-03-01",
        "type": "forecast",
        "time": "00:00",
        "step": "0",
        "format": "netcdf_zip"
    }"#;

    /// References a variable the registry does not declare.
    pub const UNKNOWN_VARIABLE: &str = r#"{
        "variable": ["ozone", "unobtainium"],
        "model": "ensemble"
    }"#;

    /// Daily mean post-processing directive.
    pub const DAILY_MEAN: &str = r#"{
        "variable": "ozone",
        "model": "ensemble",
        "post_process": "daily_mean"
    }"#;
}

/// Shared GRIB key values.
pub mod grib {
    /// Product definition template for atmospheric chemical constituents.
    pub const CHEMICAL_TEMPLATE: i64 = 40;

    /// Ensemble median model: Meteo France, sub-centre 2.
    pub const ENSEMBLE: (i64, i64) = (85, 2);

    /// CHIMERE model: Meteo France, sub-centre 200.
    pub const CHIMERE: (i64, i64) = (85, 200);

    /// Constituent type of ozone.
    pub const OZONE: i64 = 0;

    /// Constituent type of nitrogen dioxide.
    pub const NITROGEN_DIOXIDE: i64 = 5;
}

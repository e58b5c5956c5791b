//! netCDF export layout.
//!
//! Describes the file a [`Reformatter`](crate::Reformatter) should write for
//! a set of retrieved fields: one variable per species with its export
//! metadata, the level/time axes and the global attributes.
//!
//! A netCDF file holds one model and one product type with a single time
//! axis, so fields are first split into [`NetcdfGroup`]s.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use definitions::{DefinitionKind, FieldRequest, ProductType, Registry};

use crate::error::{AdaptorError, Result};

/// Fill value of every exported data variable.
pub const FILL_VALUE: f64 = -999.0;

const PROJECT: &str = "MACC-RAQ (http://macc-raq.gmes-atmosphere.eu)";

/// One exported data variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetcdfVariableLayout {
    pub backend_name: String,
    pub varname: String,
    pub species: String,
    pub shortname: String,
    pub units: String,
    pub standard_name: String,
    /// Multiplier applied to GRIB values on export.
    pub scale: f64,
    pub fill_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetcdfLayout {
    pub product_type: ProductType,
    pub model: String,
    pub variables: Vec<NetcdfVariableLayout>,
    pub levels: Vec<f64>,
    /// Long name of the time axis.
    pub time_long_name: String,
    /// Valid times in hours since the first date at 00:00.
    pub times: Vec<f64>,
    pub global_attributes: BTreeMap<String, String>,
}

/// Values of each request key across a set of fields, sorted.
#[derive(Debug, Default)]
struct Envelope {
    variables: BTreeSet<String>,
    models: BTreeSet<String>,
    types: BTreeSet<ProductType>,
    levels: BTreeSet<String>,
    dates: BTreeSet<NaiveDate>,
    times: BTreeSet<String>,
    steps: BTreeSet<i64>,
    valid_times: BTreeSet<chrono::NaiveDateTime>,
}

impl Envelope {
    fn of(fields: &[FieldRequest]) -> Result<Self> {
        let mut envelope = Envelope::default();
        for field in fields {
            let (data_time, valid_time) = field_times(field)?;
            let step = (valid_time - data_time).num_hours();

            envelope.variables.insert(field.variable.clone());
            envelope.models.insert(field.model.clone());
            envelope.types.insert(field.product_type);
            envelope.levels.insert(field.level.clone());
            envelope.dates.insert(data_time.date());
            envelope.times.insert(field.time.clone());
            envelope.steps.insert(step);
            envelope.valid_times.insert(valid_time);
        }
        Ok(envelope)
    }
}

impl NetcdfLayout {
    /// Lay out the export of `fields`.
    ///
    /// A netCDF file holds a single model and a single product type.
    pub fn build(registry: &Registry, fields: &[FieldRequest]) -> Result<Self> {
        let envelope = Envelope::of(fields)?;

        let model_code = single(&envelope.models, "model")?;
        let product_type = *single(&envelope.types, "type")?;
        let model = registry
            .lookup_by_backend_name(DefinitionKind::Model, model_code)?
            .as_model()
            .ok_or_else(|| reformat(format!("'{}' is not a model", model_code)))?;

        let mut variables = Vec::with_capacity(envelope.variables.len());
        for code in &envelope.variables {
            let definition = registry
                .lookup_by_backend_name(DefinitionKind::Variable, code)?
                .as_variable()
                .ok_or_else(|| reformat(format!("'{}' is not a variable", code)))?;
            variables.push(NetcdfVariableLayout {
                backend_name: code.clone(),
                varname: definition.export.varname.clone(),
                species: definition.export.species.clone(),
                shortname: definition.export.shortname.clone(),
                units: definition.export.units.clone(),
                standard_name: definition.export_standard_name().to_string(),
                scale: definition.export.scale,
                fill_value: FILL_VALUE,
            });
        }

        let mut levels = Vec::with_capacity(envelope.levels.len());
        for level in &envelope.levels {
            levels.push(
                level
                    .parse::<f64>()
                    .map_err(|_| reformat(format!("bad field level '{}'", level)))?,
            );
        }
        levels.sort_by(f64::total_cmp);

        let first_date = envelope
            .dates
            .first()
            .copied()
            .ok_or_else(|| reformat("no fields to export"))?;
        let base = first_date.and_time(NaiveTime::default());
        let times = envelope
            .valid_times
            .iter()
            .map(|t| (*t - base).num_seconds() as f64 / 3600.0)
            .collect();

        let type_name = product_type.as_str();
        let level_text = if envelope.levels.len() == 1 && envelope.levels.contains("0") {
            "the Surface".to_string()
        } else {
            format!("{} levels", envelope.levels.len())
        };
        let date_text = match (envelope.dates.first(), envelope.dates.last()) {
            (Some(first), Some(last)) if first != last => {
                format!("{}-{}", first.format("%Y%m%d"), last.format("%Y%m%d"))
            }
            _ => first_date.format("%Y%m%d").to_string(),
        };
        let hours: Vec<i64> = match product_type {
            ProductType::Analysis => envelope
                .times
                .iter()
                .filter_map(|t| t.get(0..2).and_then(|h| h.parse().ok()))
                .collect(),
            ProductType::Forecast => envelope.steps.iter().copied().collect(),
        };
        let period = format!(
            "{}+[{}H_{}H]",
            date_text,
            hours.iter().min().copied().unwrap_or(0),
            hours.iter().max().copied().unwrap_or(0)
        );
        let shortnames = variables
            .iter()
            .map(|v| v.shortname.as_str())
            .collect::<Vec<_>>()
            .join("/");

        let global_attributes = BTreeMap::from([
            (
                "title".to_string(),
                format!("{} Air Pollutant {} at {}", shortnames, type_name, level_text),
            ),
            (
                "institution".to_string(),
                format!("Data produced by {}", model.export.institution),
            ),
            ("source".to_string(), format!("Data from {} model", model.export.name)),
            (
                "history".to_string(),
                format!("Model {} {}", model.export.name2, type_name),
            ),
            (type_name.to_string(), format!("Europe, {}", period)),
            (
                "summary".to_string(),
                format!(
                    "{} model hourly {} of {} concentration at {} from {} on Europe",
                    model.export.name2, type_name, shortnames, level_text, period
                ),
            ),
            ("project".to_string(), PROJECT.to_string()),
        ]);

        Ok(NetcdfLayout {
            product_type,
            model: model_code.clone(),
            variables,
            levels,
            time_long_name: format!("{} time from {}", type_name, first_date.format("%Y%m%d")),
            times,
            global_attributes,
        })
    }

    pub fn variable(&self, backend_name: &str) -> Option<&NetcdfVariableLayout> {
        self.variables.iter().find(|v| v.backend_name == backend_name)
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Fields written to one netCDF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetcdfGroup {
    pub model: String,
    pub product_type: ProductType,
    /// Set when the group was split by date.
    pub date: Option<String>,
    /// Positions of the group's fields in the input slice.
    pub members: Vec<usize>,
}

impl NetcdfGroup {
    /// File name suffix identifying the group.
    pub fn label(&self) -> String {
        let mut label = format!("{}_{}", self.model, self.product_type.as_str());
        if let Some(date) = &self.date {
            label.push('_');
            label.push_str(&date.replace('-', ""));
        }
        label
    }
}

/// Split `fields` into groups that each fit one netCDF file.
///
/// Fields are grouped by model and product type. A group whose data times
/// have overlapping validity times cannot share one time axis and is split
/// further by date.
pub fn netcdf_groups(fields: &[FieldRequest]) -> Result<Vec<NetcdfGroup>> {
    let mut by_product: BTreeMap<(String, ProductType), Vec<usize>> = BTreeMap::new();
    for (i, field) in fields.iter().enumerate() {
        by_product
            .entry((field.model.clone(), field.product_type))
            .or_default()
            .push(i);
    }

    let mut groups = Vec::new();
    for ((model, product_type), members) in by_product {
        let subset: Vec<FieldRequest> = members.iter().map(|&i| fields[i].clone()).collect();
        if !overlapping_valid_times(&subset)? {
            groups.push(NetcdfGroup {
                model,
                product_type,
                date: None,
                members,
            });
            continue;
        }

        let mut by_date: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for i in members {
            by_date.entry(fields[i].date.clone()).or_default().push(i);
        }
        groups.extend(by_date.into_iter().map(|(date, members)| NetcdfGroup {
            model: model.clone(),
            product_type,
            date: Some(date),
            members,
        }));
    }
    Ok(groups)
}

/// True when the last valid time of one data time reaches the first valid
/// time of the next.
fn overlapping_valid_times(fields: &[FieldRequest]) -> Result<bool> {
    let mut valid: BTreeMap<chrono::NaiveDateTime, BTreeSet<chrono::NaiveDateTime>> = BTreeMap::new();
    for field in fields {
        let (data_time, valid_time) = field_times(field)?;
        valid.entry(data_time).or_default().insert(valid_time);
    }

    let spans: Vec<_> = valid
        .values()
        .filter_map(|times| Some((*times.first()?, *times.last()?)))
        .collect();
    Ok(spans.windows(2).any(|pair| pair[0].1 >= pair[1].0))
}

/// Data time and valid time of one field.
fn field_times(field: &FieldRequest) -> Result<(chrono::NaiveDateTime, chrono::NaiveDateTime)> {
    let date = NaiveDate::parse_from_str(&field.date, "%Y-%m-%d")
        .map_err(|_| reformat(format!("bad field date '{}'", field.date)))?;
    let time = NaiveTime::parse_from_str(&field.time, "%H%M")
        .map_err(|_| reformat(format!("bad field time '{}'", field.time)))?;
    let step: i64 = field
        .step
        .parse()
        .map_err(|_| reformat(format!("bad field step '{}'", field.step)))?;
    let data_time = date.and_time(time);
    let valid_time = Duration::try_hours(step)
        .and_then(|offset| data_time.checked_add_signed(offset))
        .ok_or_else(|| reformat(format!("field step '{}' out of range", field.step)))?;
    Ok((data_time, valid_time))
}

fn single<'a, T>(values: &'a BTreeSet<T>, key: &str) -> Result<&'a T> {
    let mut iter = values.iter();
    match (iter.next(), iter.next()) {
        (Some(value), None) => Ok(value),
        (None, _) => Err(reformat("no fields to export")),
        (Some(_), Some(_)) => Err(reformat(format!(
            "netCDF output holds a single {}; split the request",
            key
        ))),
    }
}

fn reformat(message: impl Into<String>) -> AdaptorError {
    AdaptorError::Reformat(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::definitions as docs;

    fn field(variable: &str, product_type: ProductType, date: &str, time: &str, step: &str, level: &str) -> FieldRequest {
        FieldRequest {
            variable: variable.to_string(),
            model: "ENS".to_string(),
            product_type,
            date: date.to_string(),
            time: time.to_string(),
            step: step.to_string(),
            level: level.to_string(),
        }
    }

    fn registry() -> Registry {
        Registry::load(docs::SHIPPED).unwrap()
    }

    #[test]
    fn test_surface_forecast_attributes() {
        let fields: Vec<FieldRequest> = (0..4)
            .map(|s| field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", &s.to_string(), "0"))
            .collect();
        let layout = NetcdfLayout::build(&registry(), &fields).unwrap();
        let attrs = &layout.global_attributes;

        assert_eq!(attrs["title"], "O3 Air Pollutant FORECAST at the Surface");
        assert_eq!(attrs["institution"], "Data produced by Meteo France");
        assert_eq!(attrs["source"], "Data from ENSEMBLE model");
        assert_eq!(attrs["history"], "Model ENSEMBLE FORECAST");
        assert_eq!(attrs["FORECAST"], "Europe, 20240301+[0H_3H]");
        assert_eq!(
            attrs["summary"],
            "ENSEMBLE model hourly FORECAST of O3 concentration at the Surface from 20240301+[0H_3H] on Europe"
        );
        assert_eq!(attrs["project"], PROJECT);
        assert_eq!(layout.times, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(layout.time_long_name, "FORECAST time from 20240301");

        let ozone = layout.variable("O3_USI").unwrap();
        assert_eq!(ozone.varname, "o3_conc");
        assert_eq!(ozone.scale, 1e9);
        assert_eq!(ozone.fill_value, FILL_VALUE);
        assert_eq!(ozone.standard_name, "mass_concentration_of_ozone_in_air");
    }

    #[test]
    fn test_multi_level_analysis_period() {
        let fields = vec![
            field("NO2_USI", ProductType::Analysis, "2024-03-01", "0000", "0", "50"),
            field("NO2_USI", ProductType::Analysis, "2024-03-02", "1200", "0", "500"),
            field("O3_USI", ProductType::Analysis, "2024-03-02", "1200", "0", "50"),
        ];
        let layout = NetcdfLayout::build(&registry(), &fields).unwrap();
        let attrs = &layout.global_attributes;

        assert_eq!(layout.levels, vec![50.0, 500.0]);
        assert_eq!(attrs["title"], "NO2/O3 Air Pollutant ANALYSIS at 2 levels");
        assert_eq!(attrs["ANALYSIS"], "Europe, 20240301-20240302+[0H_12H]");
        assert!(!attrs.contains_key("FORECAST"));
        assert_eq!(layout.times, vec![0.0, 36.0]);
    }

    #[test]
    fn test_mixed_types_rejected() {
        let fields = vec![
            field("O3_USI", ProductType::Analysis, "2024-03-01", "0000", "0", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "1", "0"),
        ];
        assert!(matches!(
            NetcdfLayout::build(&registry(), &fields),
            Err(AdaptorError::Reformat(_))
        ));
        assert!(NetcdfLayout::build(&registry(), &[]).is_err());
    }

    #[test]
    fn test_groups_split_model_and_type() {
        let mut chimere = field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "0", "0");
        chimere.model = "CHIMERE".to_string();
        let fields = vec![
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "0", "0"),
            chimere,
            field("O3_USI", ProductType::Analysis, "2024-03-01", "0000", "0", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "1", "0"),
        ];

        let groups = netcdf_groups(&fields).unwrap();
        let labels: Vec<String> = groups.iter().map(NetcdfGroup::label).collect();
        assert_eq!(labels, vec!["CHIMERE_FORECAST", "ENS_FORECAST", "ENS_ANALYSIS"]);
        assert_eq!(groups[1].members, vec![0, 3]);

        for group in &groups {
            let members: Vec<FieldRequest> = group.members.iter().map(|&i| fields[i].clone()).collect();
            let layout = NetcdfLayout::build(&registry(), &members).unwrap();
            assert_eq!(layout.model, group.model);
        }
    }

    #[test]
    fn test_overlapping_forecasts_split_by_date() {
        // 48 hour forecasts on consecutive days share valid times.
        let fields = vec![
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "0", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "48", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-02", "0000", "0", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-02", "0000", "48", "0"),
        ];
        let labels: Vec<String> = netcdf_groups(&fields)
            .unwrap()
            .iter()
            .map(NetcdfGroup::label)
            .collect();
        assert_eq!(labels, vec!["ENS_FORECAST_20240301", "ENS_FORECAST_20240302"]);

        // Day-ahead hours 0..23 do not overlap: one group.
        let fields = vec![
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "0", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-01", "0000", "23", "0"),
            field("O3_USI", ProductType::Forecast, "2024-03-02", "0000", "0", "0"),
        ];
        let groups = netcdf_groups(&fields).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date, None);
    }
}

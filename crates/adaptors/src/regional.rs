//! Regional air-quality forecast adaptor.
//!
//! Retrieval runs four steps over a [`RegionalContext`]:
//!
//! 1. `parse_inputs`: expand dates and enumerate every requested field
//! 2. `fetch`: ask the field source, decode each message header and keep the
//!    requested ones
//! 3. `reduce`: optional post-processing
//! 4. `reformat`: GRIB concatenation, or one netCDF file per model, product
//!    type and (when forecasts overlap) date

use async_trait::async_trait;
use bytes::BytesMut;
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use adaptor_common::{expand_dates, Request, DOWNLOAD_FORMAT_KEY, FORMAT_KEYS, POST_PROCESS_KEY};
use definitions::{EncodingResolver, FieldRequest, ProductType, Registry};

use crate::adaptor::{
    Adaptor, AdaptorCore, Backends, OutputFile, Retrieval, RetrievalOutput, ValidatedRequest,
};
use crate::backend::{FieldSource, PostProcessor, Reformatter, RetrievedField};
use crate::error::{AdaptorError, Result};
use crate::export::{netcdf_groups, NetcdfLayout};
use crate::normalize::normalize;
use crate::options::{AdaptorOptions, DataFormat, DownloadFormat};
use crate::pipeline::{PipelineExecutor, Step, StepStatus};

/// Fields every request must select.
const MANDATORY_KEYS: [&str; 7] = ["variable", "model", "level", "date", "type", "time", "step"];

/// Optional fields forwarded to the source.
const OPTIONAL_KEYS: [&str; 2] = ["area", "no_cache"];

/// Base name of result files.
const RESULT_STEM: &str = "download";

/// Most fields one request may enumerate.
pub const MAX_REQUESTED_FIELDS: u64 = 1_000_000;

pub struct RegionalForecastAdaptor {
    core: AdaptorCore,
    pipeline: PipelineExecutor<RegionalContext>,
    can_reduce: bool,
    can_write_netcdf: bool,
}

impl RegionalForecastAdaptor {
    pub fn new(core: AdaptorCore, backends: Backends) -> Result<Self> {
        let source = backends.source.ok_or_else(|| {
            AdaptorError::InvalidConfig("regional_forecast adaptor requires a field source".to_string())
        })?;
        let resolver = EncodingResolver::new(Arc::clone(&core.registry));
        let can_reduce = backends.post_processor.is_some();
        let can_write_netcdf = backends.reformatter.is_some();

        let pipeline = PipelineExecutor::new()
            .with_step(ParseInputs)
            .with_step(Fetch { source, resolver: resolver.clone() })
            .with_step(Reduce {
                post_processor: backends.post_processor,
                resolver,
            })
            .with_step(Reformat {
                reformatter: backends.reformatter,
                registry: Arc::clone(&core.registry),
            });

        Ok(Self {
            core,
            pipeline,
            can_reduce,
            can_write_netcdf,
        })
    }
}

#[async_trait]
impl Adaptor for RegionalForecastAdaptor {
    fn core(&self) -> &AdaptorCore {
        &self.core
    }

    fn validate(&self, request: &Request) -> Result<ValidatedRequest> {
        let unrecognised: Vec<&str> = request
            .keys()
            .filter(|k| {
                !MANDATORY_KEYS.contains(k)
                    && !OPTIONAL_KEYS.contains(k)
                    && !FORMAT_KEYS.contains(k)
                    && *k != DOWNLOAD_FORMAT_KEY
                    && *k != POST_PROCESS_KEY
            })
            .collect();
        if !unrecognised.is_empty() {
            return Err(AdaptorError::Validation(format!(
                "unrecognised field(s): {}",
                unrecognised.join(", ")
            )));
        }

        let normalized = normalize(request, &self.core.registry)?;
        match &normalized.options.data_format {
            DataFormat::Grib => {}
            DataFormat::Netcdf if self.can_write_netcdf => {}
            DataFormat::Netcdf => {
                return Err(AdaptorError::InvalidConfig(
                    "netCDF output requested but no netCDF writer is configured".to_string(),
                ))
            }
            DataFormat::Other(other) => {
                return Err(AdaptorError::Validation(format!(
                    "unsupported data_format '{}', expected grib or netcdf",
                    other
                )))
            }
        }
        if let Some(reduce) = &normalized.options.reduce {
            if !self.can_reduce {
                return Err(AdaptorError::InvalidConfig(format!(
                    "post_process '{}' requested but no post-processor is configured",
                    reduce.method
                )));
            }
        }

        // Catch malformed dates, times, steps and types before any I/O.
        let grid = FieldGrid::parse(&normalized.backend)?;
        match grid.len() {
            Some(count) if count <= MAX_REQUESTED_FIELDS => {}
            _ => {
                return Err(AdaptorError::Validation(format!(
                    "request addresses more than {} fields",
                    MAX_REQUESTED_FIELDS
                )))
            }
        }

        Ok(ValidatedRequest::new(request.clone(), normalized))
    }

    #[instrument(skip_all, fields(adaptor = "regional_forecast", collection_id = %self.core.config.collection_id))]
    async fn retrieve(&self, validated: &ValidatedRequest, cancel: &CancellationToken) -> Retrieval {
        let mut ctx = RegionalContext::new(
            validated.normalized.backend.clone(),
            validated.normalized.options.clone(),
        );
        let run = self.pipeline.execute(&mut ctx, cancel).await;

        let result = run.result.and_then(|()| {
            ctx.output
                .take()
                .ok_or_else(|| AdaptorError::NoData("no output was produced".to_string()))
        });
        if let Ok(output) = &result {
            info!(
                files = output.files.len(),
                size = output.size(),
                "Regional retrieval finished"
            );
        }
        Retrieval::new(result, run.metrics)
    }
}

// ============================================================================
// Context
// ============================================================================

/// State threaded through the retrieval steps.
struct RegionalContext {
    /// Backend-shaped request.
    request: Request,
    options: AdaptorOptions,
    /// Every field the request addresses.
    requested: BTreeSet<FieldRequest>,
    /// Retrieved fields, in source order.
    fields: Vec<RetrievedField>,
    /// Decoded request of each entry in `fields`.
    matched: Vec<FieldRequest>,
    output: Option<RetrievalOutput>,
}

impl RegionalContext {
    fn new(request: Request, options: AdaptorOptions) -> Self {
        Self {
            request,
            options,
            requested: BTreeSet::new(),
            fields: Vec::new(),
            matched: Vec::new(),
            output: None,
        }
    }
}

// ============================================================================
// Steps
// ============================================================================

struct ParseInputs;

#[async_trait]
impl Step<RegionalContext> for ParseInputs {
    fn name(&self) -> &'static str {
        "parse_inputs"
    }

    async fn run(&self, ctx: &mut RegionalContext) -> Result<StepStatus> {
        ctx.requested = FieldGrid::parse(&ctx.request)?.fields();
        debug!(fields = ctx.requested.len(), "Enumerated requested fields");
        Ok(StepStatus::Done)
    }
}

struct Fetch {
    source: Arc<dyn FieldSource>,
    resolver: EncodingResolver,
}

#[async_trait]
impl Step<RegionalContext> for Fetch {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn run(&self, ctx: &mut RegionalContext) -> Result<StepStatus> {
        let retrieved = self
            .source
            .fetch(&ctx.request)
            .await
            .map_err(AdaptorError::backend)?;

        let mut seen = BTreeSet::new();
        let mut dropped = 0u64;
        for field in retrieved {
            let field = field
                .gunzipped()
                .map_err(|e| AdaptorError::Backend(format!("corrupt gzip payload: {}", e)))?;
            let decoded = self.resolver.field_to_request(&field.header).map_err(|e| {
                AdaptorError::Backend(format!("undecodable field {}: {}", field.header, e))
            })?;

            if !ctx.requested.contains(&decoded) {
                debug!(field = ?decoded, "Dropping unrequested field");
                dropped += 1;
                continue;
            }
            if !seen.insert(decoded.clone()) {
                debug!(field = ?decoded, "Dropping duplicate field");
                dropped += 1;
                continue;
            }
            ctx.fields.push(field);
            ctx.matched.push(decoded);
        }

        let missing = ctx.requested.len() - seen.len();
        counter!("adaptor_fields_total", "status" => "matched").increment(seen.len() as u64);
        counter!("adaptor_fields_total", "status" => "dropped").increment(dropped);
        counter!("adaptor_fields_total", "status" => "missing").increment(missing as u64);

        if missing > 0 {
            warn!(
                missing,
                requested = ctx.requested.len(),
                "Some requested fields were not returned"
            );
            for field in ctx.requested.difference(&seen) {
                debug!(field = ?field, "Missing field");
            }
        }

        if ctx.fields.is_empty() {
            return Err(AdaptorError::NoData(
                "no data found for this request".to_string(),
            ));
        }
        info!(fields = ctx.fields.len(), dropped, missing, "Fetched fields");
        Ok(StepStatus::Done)
    }
}

struct Reduce {
    post_processor: Option<Arc<dyn PostProcessor>>,
    resolver: EncodingResolver,
}

#[async_trait]
impl Step<RegionalContext> for Reduce {
    fn name(&self) -> &'static str {
        "reduce"
    }

    async fn run(&self, ctx: &mut RegionalContext) -> Result<StepStatus> {
        let Some(spec) = ctx.options.reduce.clone() else {
            return Ok(StepStatus::NoOp);
        };
        let post_processor = self.post_processor.as_ref().ok_or_else(|| {
            AdaptorError::Reduce(format!("no post-processor configured for '{}'", spec.method))
        })?;

        let fields = std::mem::take(&mut ctx.fields);
        let reduced = post_processor
            .reduce(&spec, fields)
            .await
            .map_err(|e| AdaptorError::Reduce(format!("{:#}", e)))?;
        if reduced.is_empty() {
            return Err(AdaptorError::Reduce(format!(
                "'{}' produced no fields",
                spec.method
            )));
        }

        ctx.matched = reduced
            .iter()
            .map(|f| self.resolver.field_to_request(&f.header))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AdaptorError::Reduce(format!("reduced field is undecodable: {}", e)))?;
        ctx.fields = reduced;
        debug!(method = %spec.method, fields = ctx.fields.len(), "Reduced fields");
        Ok(StepStatus::Done)
    }
}

struct Reformat {
    reformatter: Option<Arc<dyn Reformatter>>,
    registry: Arc<Registry>,
}

#[async_trait]
impl Step<RegionalContext> for Reformat {
    fn name(&self) -> &'static str {
        "reformat"
    }

    async fn run(&self, ctx: &mut RegionalContext) -> Result<StepStatus> {
        let data_format = ctx.options.data_format.clone();
        let mut download_format = ctx.options.download_format;
        let files = match &data_format {
            DataFormat::Grib => {
                let total = ctx.fields.iter().map(|f| f.payload.len()).sum();
                let mut buffer = BytesMut::with_capacity(total);
                for field in &ctx.fields {
                    buffer.extend_from_slice(&field.payload);
                }
                vec![OutputFile::new(format!("{}.grib", RESULT_STEM), buffer.freeze())]
            }
            DataFormat::Netcdf => {
                let reformatter = self.reformatter.as_ref().ok_or_else(|| {
                    AdaptorError::Reformat("no netCDF writer configured".to_string())
                })?;
                let groups = netcdf_groups(&ctx.matched)?;
                let mut files = Vec::with_capacity(groups.len());
                for group in &groups {
                    let matched: Vec<FieldRequest> =
                        group.members.iter().map(|&i| ctx.matched[i].clone()).collect();
                    let fields: Vec<RetrievedField> =
                        group.members.iter().map(|&i| ctx.fields[i].clone()).collect();
                    let layout = NetcdfLayout::build(&self.registry, &matched)?;
                    let bytes = reformatter
                        .to_netcdf(&layout, &fields)
                        .await
                        .map_err(|e| AdaptorError::Reformat(format!("{}: {:#}", group.label(), e)))?;
                    let name = if groups.len() == 1 {
                        format!("{}.nc", RESULT_STEM)
                    } else {
                        format!("{}_{}.nc", RESULT_STEM, group.label())
                    };
                    files.push(OutputFile::new(name, bytes));
                }
                if files.len() > 1 && download_format == DownloadFormat::AsSource {
                    download_format = DownloadFormat::Zip;
                }
                debug!(files = files.len(), "Wrote netCDF groups");
                files
            }
            DataFormat::Other(other) => {
                return Err(AdaptorError::Reformat(format!(
                    "unsupported data_format '{}'",
                    other
                )))
            }
        };

        ctx.output = Some(RetrievalOutput {
            files,
            data_format,
            download_format,
        });
        Ok(StepStatus::Done)
    }
}

// ============================================================================
// Field enumeration
// ============================================================================

/// Selections of a backend request, parsed and deduplicated.
///
/// Analysis fields have no lead time, so their step is always `0`.
#[derive(Debug)]
struct FieldGrid {
    variables: BTreeSet<String>,
    models: BTreeSet<String>,
    levels: BTreeSet<String>,
    dates: Vec<String>,
    types: BTreeSet<ProductType>,
    times: BTreeSet<String>,
    steps: BTreeSet<String>,
}

impl FieldGrid {
    fn parse(request: &Request) -> Result<Self> {
        let types = request
            .required_values("type")?
            .iter()
            .map(|t| {
                ProductType::from_request_value(t)
                    .ok_or_else(|| AdaptorError::Validation(format!("unknown type '{}'", t)))
            })
            .collect::<Result<BTreeSet<_>>>()?;
        let times = request
            .required_values("time")?
            .iter()
            .map(|t| normalize_time(t))
            .collect::<Result<BTreeSet<_>>>()?;
        let steps = request
            .required_values("step")?
            .iter()
            .map(|s| {
                s.trim()
                    .parse::<u32>()
                    .map(|n| n.to_string())
                    .map_err(|_| AdaptorError::Validation(format!("invalid step '{}'", s)))
            })
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Self {
            variables: request.required_values("variable")?.into_iter().collect(),
            models: request.required_values("model")?.into_iter().collect(),
            levels: request.required_values("level")?.into_iter().collect(),
            dates: expand_dates(&request.required_values("date")?)?
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect(),
            types,
            times,
            steps,
        })
    }

    /// Number of fields, `None` on overflow.
    fn len(&self) -> Option<u64> {
        let steps = self.types.iter().try_fold(0u64, |total, t| match t {
            ProductType::Analysis => total.checked_add(1),
            ProductType::Forecast => total.checked_add(self.steps.len() as u64),
        })?;
        [
            self.variables.len(),
            self.models.len(),
            self.levels.len(),
            self.dates.len(),
            self.times.len(),
        ]
        .iter()
        .try_fold(steps, |total, &n| total.checked_mul(n as u64))
    }

    fn fields(&self) -> BTreeSet<FieldRequest> {
        let mut fields = BTreeSet::new();
        for variable in &self.variables {
            for model in &self.models {
                for product_type in &self.types {
                    let steps: Vec<&str> = match product_type {
                        ProductType::Analysis => vec!["0"],
                        ProductType::Forecast => self.steps.iter().map(String::as_str).collect(),
                    };
                    for date in &self.dates {
                        for time in &self.times {
                            for level in &self.levels {
                                for step in &steps {
                                    fields.insert(FieldRequest {
                                        variable: variable.clone(),
                                        model: model.clone(),
                                        product_type: *product_type,
                                        date: date.clone(),
                                        time: time.clone(),
                                        step: step.to_string(),
                                        level: level.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        fields
    }
}

/// `HH:MM`, `HHMM` or a bare hour → `HHMM`.
fn normalize_time(value: &str) -> Result<String> {
    let invalid = || AdaptorError::Validation(format!("invalid time '{}'", value));
    let digits: String = value.trim().chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<u32>().map_err(|_| invalid())?, 0)
    } else if digits.len() == 4 {
        (
            digits[..2].parse::<u32>().map_err(|_| invalid())?,
            digits[2..].parse::<u32>().map_err(|_| invalid())?,
        )
    } else {
        return Err(invalid());
    };
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(format!("{:02}{:02}", hours, minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend_request() -> Request {
        Request::new()
            .with("variable", json!(["O3_USI"]))
            .with("model", json!(["ENS"]))
            .with("level", json!(["0"]))
            .with("date", json!(["2024-03-01/2024-03-02"]))
            .with("type", json!(["forecast", "analysis"]))
            .with("time", json!(["00:00"]))
            .with("step", json!(["0", "01"]))
    }

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time("00:00").unwrap(), "0000");
        assert_eq!(normalize_time("12").unwrap(), "1200");
        assert_eq!(normalize_time("6").unwrap(), "0600");
        assert_eq!(normalize_time("1230").unwrap(), "1230");
        assert!(normalize_time("25:00").is_err());
        assert!(normalize_time("noon").is_err());
        assert!(normalize_time("123").is_err());
    }

    fn enumerate_fields(request: &Request) -> Result<BTreeSet<FieldRequest>> {
        FieldGrid::parse(request).map(|grid| grid.fields())
    }

    #[test]
    fn test_enumerate_forces_analysis_step() {
        let grid = FieldGrid::parse(&backend_request()).unwrap();
        assert_eq!(grid.len(), Some(6));
        let fields = grid.fields();
        // 2 dates × (2 forecast steps + 1 analysis)
        assert_eq!(fields.len(), 6);

        let analysis: Vec<_> = fields
            .iter()
            .filter(|f| f.product_type == ProductType::Analysis)
            .collect();
        assert_eq!(analysis.len(), 2);
        assert!(analysis.iter().all(|f| f.step == "0"));
        assert!(fields.iter().any(|f| f.step == "1" && f.date == "2024-03-02"));
        assert!(fields.iter().all(|f| f.time == "0000"));
    }

    #[test]
    fn test_enumerate_rejects_bad_type() {
        let request = backend_request().with("type", "reanalysis");
        assert!(matches!(
            enumerate_fields(&request),
            Err(AdaptorError::Validation(_))
        ));
    }

    #[test]
    fn test_grid_counts_without_enumerating() {
        let request = backend_request()
            .with("variable", json!(["O3_USI", "NO2_USI"]))
            .with("date", "1900-01-01/2099-12-31")
            .with("step", json!((0..97).map(|s| s.to_string()).collect::<Vec<_>>()));
        let grid = FieldGrid::parse(&request).unwrap();
        assert!(grid.len().unwrap() > MAX_REQUESTED_FIELDS);
    }

    #[test]
    fn test_date_range_at_calendar_end() {
        let last = chrono::NaiveDate::MAX.format("%Y-%m-%d").to_string();
        let request = backend_request().with("date", format!("{}/{}", last, last));
        let grid = FieldGrid::parse(&request).unwrap();
        assert_eq!(grid.dates.len(), 1);
    }

    #[test]
    fn test_enumerate_requires_every_dimension() {
        let mut request = backend_request();
        request.remove("step");
        assert!(matches!(enumerate_fields(&request), Err(AdaptorError::Request(_))));
    }
}

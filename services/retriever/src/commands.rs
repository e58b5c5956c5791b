//! Subcommand implementations. Each returns a JSON report for stdout.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use adaptor_common::Request;
use adaptors::{
    create_adaptor, normalize, AdaptorConfig, AdaptorSession, Backends, RetrievalOutput,
};
use definitions::{EncodingResolver, FieldHeader, Registry};

pub fn read_request(path: &Path) -> Result<Request> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read request {:?}", path))?;
    Request::from_json_str(&content).with_context(|| format!("Invalid request in {:?}", path))
}

/// Validate, constrain, cost and license a request without retrieving it.
pub fn check(config: &AdaptorConfig, registry: Arc<Registry>, request: &Request) -> Result<Value> {
    let adaptor = create_adaptor(config.clone(), registry, Backends::new().with_source(Arc::new(NoSource)))?;
    let mut session = AdaptorSession::new(adaptor);

    session.validate(request)?;
    let constrained = session.apply_constraints()?.normalized.backend.clone();
    let estimate = session.estimate_costs()?;
    let licences = session.get_licences()?;

    Ok(json!({
        "request": constrained,
        "estimate": estimate,
        "licences": licences,
    }))
}

/// Translate a frontend request into its backend form.
pub fn normalize_request(registry: &Registry, request: &Request) -> Result<Value> {
    let normalized = normalize(request, registry)?;
    Ok(json!({
        "request": normalized.backend,
        "options": normalized.options,
    }))
}

/// Reconstruct the backend request for one decoded header.
pub fn decode_header(registry: Arc<Registry>, header: &Path) -> Result<Value> {
    let content =
        fs::read(header).with_context(|| format!("Failed to read header {:?}", header))?;
    let header: FieldHeader = serde_json::from_slice(&content).context("Invalid header JSON")?;
    let field = EncodingResolver::new(registry).field_to_request(&header)?;
    Ok(serde_json::to_value(field)?)
}

/// Write decoder definition files for the synthesized parameters.
pub fn write_param_table(registry: Arc<Registry>, out_dir: &Path) -> Result<Value> {
    let table = EncodingResolver::new(registry).synthesize_parameter_table()?;
    let written = table
        .write_definition_files(out_dir)
        .with_context(|| format!("Failed to write definition files into {:?}", out_dir))?;
    info!(entries = table.len(), files = written.len(), "Wrote parameter table");
    Ok(json!({ "entries": table.len(), "files": written }))
}

/// Run a full retrieval and write its files into `output_dir`.
#[instrument(skip_all, fields(collection_id = %config.collection_id))]
pub async fn retrieve(
    config: &AdaptorConfig,
    registry: Arc<Registry>,
    backends: Backends,
    request: &Request,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Value> {
    let mut session = AdaptorSession::new(create_adaptor(config.clone(), registry, backends)?);
    session.validate(request)?;
    session.apply_constraints()?;
    let estimate = session.estimate_costs()?;
    info!(fields = estimate.fields, size = estimate.size, "Estimated retrieval");

    let retrieval = session.retrieve(cancel).await;
    let metrics = serde_json::to_value(&retrieval.metrics)?;
    let output = match retrieval.result {
        Ok(output) => output,
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("Retrieval failed; steps: {}", metrics)));
        }
    };

    let written = write_output(&output, output_dir)?;
    Ok(json!({
        "files": written,
        "metrics": metrics,
        "receipt": retrieval.receipt,
    }))
}

fn write_output(output: &RetrievalOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    output
        .files
        .iter()
        .map(|file| {
            let path = dir.join(&file.name);
            fs::write(&path, &file.bytes).with_context(|| format!("Failed to write {:?}", path))?;
            Ok(path)
        })
        .collect()
}

/// Placeholder transport for commands that never reach the backend.
struct NoSource;

#[async_trait::async_trait]
impl adaptors::FieldSource for NoSource {
    async fn fetch(&self, _request: &Request) -> Result<Vec<adaptors::RetrievedField>> {
        anyhow::bail!("no field source configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_source::LocalDirectorySource;
    use adaptors::AdaptorKind;
    use test_utils::{generators, temp_test_dir};

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::load_path(test_utils::shipped_definitions_path()).unwrap())
    }

    fn regional() -> AdaptorConfig {
        AdaptorConfig::new(AdaptorKind::RegionalForecast, "cams-europe-air-quality-forecasts")
    }

    fn ozone_request() -> Request {
        Request::new()
            .with("variable", "ozone")
            .with("model", "ensemble")
            .with("level", "0")
            .with("date", "2024-03-01")
            .with("type", "forecast")
            .with("time", "00:00")
            .with("step", json!(["0", "1"]))
            .with("format", "grib")
    }

    #[test]
    fn test_check_reports_estimate() {
        let report = check(&regional(), registry(), &ozone_request()).unwrap();
        assert_eq!(report["estimate"]["fields"], 2);
        assert_eq!(report["request"]["variable"], json!(["O3_USI"]));
    }

    #[test]
    fn test_decode_header() {
        let dir = temp_test_dir();
        let path = dir.path().join("header.json");
        fs::write(
            &path,
            serde_json::to_vec(&generators::ozone_forecast_header(20240301, 3)).unwrap(),
        )
        .unwrap();

        let field = decode_header(registry(), &path).unwrap();
        assert_eq!(field["variable"], "O3_USI");
        assert_eq!(field["model"], "ENS");
        assert_eq!(field["step"], "3");
    }

    #[test]
    fn test_param_table_files_written() {
        let dir = temp_test_dir();
        let report = write_param_table(registry(), &dir.path().join("grib2")).unwrap();
        assert!(report["entries"].as_u64().unwrap() > 0);
        assert!(dir.path().join("grib2").join("paramId.def").exists());
    }

    #[test]
    fn test_normalize_request_reports_options() {
        let request = ozone_request().with("post_process", "daily_mean");
        let report = normalize_request(&registry(), &request).unwrap();
        assert_eq!(report["request"]["model"], json!(["ENS"]));
        assert_eq!(report["options"]["reduce"]["method"], "temporal_reduction");
    }

    #[tokio::test]
    async fn test_retrieve_writes_files() {
        let fields = temp_test_dir();
        for step in 0..2 {
            generators::write_field(
                fields.path(),
                &format!("o3_{:03}", step),
                &generators::ozone_forecast_header(20240301, step),
                &generators::fake_grib_message(step as u8, 16),
            );
        }
        let out = temp_test_dir();
        let backends = Backends::new().with_source(Arc::new(LocalDirectorySource::new(fields.path())));

        let report = retrieve(
            &regional(),
            registry(),
            backends,
            &ozone_request(),
            out.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let written = fs::read(out.path().join("download.grib")).unwrap();
        assert_eq!(written.len(), 32);
        assert_eq!(report["metrics"].as_array().unwrap().len(), 4);
        assert_eq!(report["receipt"]["download-size"], 32);
    }

    #[tokio::test]
    async fn test_retrieve_failure_reports_steps() {
        let empty = temp_test_dir();
        let out = temp_test_dir();
        let backends = Backends::new().with_source(Arc::new(LocalDirectorySource::new(empty.path())));

        let err = retrieve(
            &regional(),
            registry(),
            backends,
            &ozone_request(),
            out.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Retrieval failed"));
    }
}

//! Diagnostic adaptor: waits for a requested time and returns a payload of
//! the requested size. Exercises the broker without touching a backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use adaptor_common::Request;

use crate::adaptor::{Adaptor, AdaptorCore, OutputFile, Retrieval, RetrievalOutput, ValidatedRequest};
use crate::costing::CostEstimate;
use crate::error::{AdaptorError, Result};
use crate::licence::Licence;
use crate::normalize::NormalizedRequest;
use crate::options::{extract_format, AdaptorOptions};
use crate::pipeline::{PipelineExecutor, Step, StepStatus};

/// Largest payload the dummy adaptor will generate, in bytes.
pub const MAX_DUMMY_SIZE: u64 = 1 << 30;

pub struct DummyAdaptor {
    core: AdaptorCore,
}

impl DummyAdaptor {
    pub fn new(core: AdaptorCore) -> Self {
        Self { core }
    }

    fn pipeline() -> PipelineExecutor<DummyContext> {
        PipelineExecutor::new()
            .with_step(ParseInputs)
            .with_step(Wait)
            .with_step(Generate)
    }
}

#[async_trait]
impl Adaptor for DummyAdaptor {
    fn core(&self) -> &AdaptorCore {
        &self.core
    }

    /// Any request is accepted as long as the payload size is bounded; only
    /// the format directive is interpreted.
    fn validate(&self, request: &Request) -> Result<ValidatedRequest> {
        let mut backend = request.clone();
        let (data_format, download_format) = extract_format(&mut backend)?;
        let size = integer_field(&backend, "size").map_err(AdaptorError::Validation)?;
        if size > MAX_DUMMY_SIZE {
            return Err(AdaptorError::Validation(format!(
                "size {} exceeds the limit of {} bytes",
                size, MAX_DUMMY_SIZE
            )));
        }
        let normalized = NormalizedRequest {
            backend,
            options: AdaptorOptions {
                data_format,
                download_format,
                reduce: None,
            },
        };
        Ok(ValidatedRequest::new(request.clone(), normalized))
    }

    fn apply_constraints(&self, validated: &ValidatedRequest) -> Result<ValidatedRequest> {
        Ok(validated.clone())
    }

    fn estimate_costs(&self, validated: &ValidatedRequest) -> Result<CostEstimate> {
        let request = &validated.normalized.backend;
        Ok(CostEstimate {
            fields: 1,
            size: integer_field(request, "size").map_err(estimation)?,
            time: integer_field(request, "time").map_err(estimation)?,
        })
    }

    fn get_licences(&self, _validated: &ValidatedRequest) -> Vec<Licence> {
        Vec::new()
    }

    #[instrument(skip_all, fields(adaptor = "dummy"))]
    async fn retrieve(&self, validated: &ValidatedRequest, cancel: &CancellationToken) -> Retrieval {
        let mut ctx = DummyContext::new(validated);
        let run = Self::pipeline().execute(&mut ctx, cancel).await;

        let result = run.result.and_then(|()| {
            ctx.output
                .take()
                .ok_or_else(|| AdaptorError::NoData("nothing was generated".to_string()))
        });
        Retrieval::new(result, run.metrics)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

struct DummyContext {
    request: Request,
    options: AdaptorOptions,
    size: u64,
    elapsed: Duration,
    output: Option<RetrievalOutput>,
}

impl DummyContext {
    fn new(validated: &ValidatedRequest) -> Self {
        Self {
            request: validated.normalized.backend.clone(),
            options: validated.normalized.options.clone(),
            size: 0,
            elapsed: Duration::ZERO,
            output: None,
        }
    }
}

struct ParseInputs;

#[async_trait]
impl Step<DummyContext> for ParseInputs {
    fn name(&self) -> &'static str {
        "parse_inputs"
    }

    async fn run(&self, ctx: &mut DummyContext) -> Result<StepStatus> {
        ctx.size = integer_field(&ctx.request, "size").map_err(AdaptorError::Validation)?;
        ctx.elapsed = match ctx.request.values("elapsed")?.and_then(|v| v.into_iter().next()) {
            None => Duration::ZERO,
            Some(text) => parse_elapsed(&text).unwrap_or_else(|| {
                warn!(elapsed = %text, "Unparseable elapsed time, not waiting");
                Duration::ZERO
            }),
        };
        debug!(size = ctx.size, elapsed_ms = ctx.elapsed.as_millis() as u64, "Parsed dummy inputs");
        Ok(StepStatus::Done)
    }
}

struct Wait;

#[async_trait]
impl Step<DummyContext> for Wait {
    fn name(&self) -> &'static str {
        "wait"
    }

    async fn run(&self, ctx: &mut DummyContext) -> Result<StepStatus> {
        if ctx.elapsed.is_zero() {
            return Ok(StepStatus::NoOp);
        }
        tokio::time::sleep(ctx.elapsed).await;
        Ok(StepStatus::Done)
    }
}

struct Generate;

#[async_trait]
impl Step<DummyContext> for Generate {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn run(&self, ctx: &mut DummyContext) -> Result<StepStatus> {
        let size = usize::try_from(ctx.size)
            .map_err(|_| AdaptorError::Validation(format!("size {} is too large", ctx.size)))?;
        ctx.output = Some(RetrievalOutput {
            files: vec![OutputFile::new(
                format!("dummy.{}", ctx.options.data_format.extension()),
                Bytes::from(vec![0u8; size]),
            )],
            data_format: ctx.options.data_format.clone(),
            download_format: ctx.options.download_format,
        });
        Ok(StepStatus::Done)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A non-negative integer field, zero when absent.
fn integer_field(request: &Request, key: &str) -> std::result::Result<u64, String> {
    let Some(values) = request.values(key).map_err(|e| e.to_string())? else {
        return Ok(0);
    };
    match values.as_slice() {
        [] => Ok(0),
        [value] => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && *v < u64::MAX as f64)
            .map(|v| v as u64)
            .ok_or_else(|| format!("{} must be a non-negative number, got '{}'", key, value)),
        _ => Err(format!("{} takes a single value", key)),
    }
}

fn estimation(message: String) -> AdaptorError {
    AdaptorError::Estimation(message)
}

/// Parse `H:MM:SS[.fff]`.
fn parse_elapsed(text: &str) -> Option<Duration> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::{AdaptorConfig, AdaptorKind};
    use crate::pipeline::StepOutcome;
    use definitions::Registry;
    use serde_json::json;
    use std::sync::Arc;

    fn adaptor() -> DummyAdaptor {
        let registry = Arc::new(Registry::load(test_utils::definitions::MINIMAL).unwrap());
        DummyAdaptor::new(AdaptorCore::new(
            AdaptorConfig::new(AdaptorKind::Dummy, "dummy"),
            registry,
        ))
    }

    #[test]
    fn test_parse_elapsed() {
        assert_eq!(parse_elapsed("0:00:01"), Some(Duration::from_secs(1)));
        assert_eq!(parse_elapsed("1:02:03.500"), Some(Duration::from_millis(3_723_500)));
        assert_eq!(parse_elapsed("0:61:00"), None);
        assert_eq!(parse_elapsed("soon"), None);
        assert_eq!(parse_elapsed("18446744073709551615:00:00"), None);
        assert_eq!(parse_elapsed("5124095576030432:00:00"), None);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let adaptor = adaptor();
        for size in [json!(MAX_DUMMY_SIZE + 1), json!("1e30"), json!(1e300)] {
            let err = adaptor.validate(&Request::new().with("size", size)).unwrap_err();
            assert!(matches!(err, AdaptorError::Validation(_)), "{}", err);
        }
        assert!(adaptor.validate(&Request::new().with("size", MAX_DUMMY_SIZE)).is_ok());
    }

    #[test]
    fn test_accepts_anything() {
        let adaptor = adaptor();
        let validated = adaptor
            .validate(&Request::new().with("foo", json!([0, 1])).with("size", "10").with("time", 3))
            .unwrap();
        let cost = adaptor.estimate_costs(&validated).unwrap();
        assert_eq!(cost.size, 10);
        assert_eq!(cost.time, 3);
        assert!(adaptor.get_licences(&validated).is_empty());
    }

    #[tokio::test]
    async fn test_netcdf_payload() {
        let adaptor = adaptor();
        let validated = adaptor
            .validate(&Request::new().with("size", 3).with("format", "netcdf"))
            .unwrap();
        let retrieval = adaptor.retrieve(&validated, &CancellationToken::new()).await;

        let output = retrieval.result.unwrap();
        assert_eq!(output.filenames(), vec!["dummy.nc"]);
        assert_eq!(output.size(), 3);
        let outcomes: Vec<_> = retrieval.metrics.iter().map(|m| m.outcome).collect();
        assert_eq!(
            outcomes,
            vec![StepOutcome::Succeeded, StepOutcome::NoOp, StepOutcome::Succeeded]
        );
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let adaptor = adaptor();
        let validated = adaptor
            .validate(&Request::new().with("size", 1).with("elapsed", "1:00:00"))
            .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let retrieval = adaptor.retrieve(&validated, &cancel).await;
        assert!(matches!(
            retrieval.result,
            Err(AdaptorError::Cancelled { ref step }) if step == "wait"
        ));
        assert_eq!(retrieval.metrics.len(), 2);
    }
}

//! Sequential step pipeline with per-step metrics.
//!
//! A retrieval runs as an ordered list of named steps over a shared context.
//! Every step that starts produces exactly one [`StepMetric`], whatever its
//! outcome. The first failure or a cancellation stops the pipeline; the
//! metrics collected so far are returned alongside the error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{AdaptorError, Result};

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// The step ran and had nothing to do.
    NoOp,
    Failed,
    Cancelled,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::NoOp => "no_op",
            StepOutcome::Failed => "failed",
            StepOutcome::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded | StepOutcome::NoOp)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    NoOp,
}

/// Timing and outcome of one step. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetric {
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub outcome: StepOutcome,
}

/// A named unit of work over the pipeline context.
#[async_trait]
pub trait Step<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut C) -> Result<StepStatus>;
}

/// Result of a pipeline execution.
#[derive(Debug)]
pub struct PipelineRun {
    pub result: Result<()>,
    /// One entry per started step, in execution order.
    pub metrics: Vec<StepMetric>,
}

impl PipelineRun {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Records one step's metric when dropped, so that every exit path
/// (including unwinding) leaves a record. Defaults to `Failed`.
struct StepRecorder<'a> {
    metrics: &'a mut Vec<StepMetric>,
    step: &'static str,
    started_at: DateTime<Utc>,
    start: Instant,
    outcome: StepOutcome,
}

impl<'a> StepRecorder<'a> {
    fn start(metrics: &'a mut Vec<StepMetric>, step: &'static str) -> Self {
        Self {
            metrics,
            step,
            started_at: Utc::now(),
            start: Instant::now(),
            outcome: StepOutcome::Failed,
        }
    }

    fn finish(mut self, outcome: StepOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for StepRecorder<'_> {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_micros() as f64 / 1000.0;
        let outcome = self.outcome.as_str();

        histogram!("adaptor_step_duration_ms", "step" => self.step, "outcome" => outcome)
            .record(duration_ms);
        counter!("adaptor_steps_total", "step" => self.step, "outcome" => outcome).increment(1);

        self.metrics.push(StepMetric {
            step: self.step.to_string(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms,
            outcome: self.outcome,
        });
    }
}

/// Runs steps strictly one after another.
pub struct PipelineExecutor<C: Send> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: Send> Default for PipelineExecutor<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C: Send> PipelineExecutor<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn with_step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step over `ctx` until one fails or `cancel` fires.
    ///
    /// Cancellation drops the running step's future, which cancels whatever
    /// it was awaiting.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub async fn execute(&self, ctx: &mut C, cancel: &CancellationToken) -> PipelineRun {
        let mut metrics = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let name = step.name();
            let recorder = StepRecorder::start(&mut metrics, name);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = step.run(ctx) => Some(result),
            };

            match result {
                Some(Ok(status)) => {
                    let outcome = match status {
                        StepStatus::Done => StepOutcome::Succeeded,
                        StepStatus::NoOp => StepOutcome::NoOp,
                    };
                    recorder.finish(outcome);
                    debug!(step = name, outcome = %outcome, "Step finished");
                }
                Some(Err(e)) => {
                    recorder.finish(StepOutcome::Failed);
                    warn!(step = name, error = %e, "Step failed");
                    return PipelineRun {
                        result: Err(AdaptorError::Step {
                            step: name.to_string(),
                            source: Box::new(e),
                        }),
                        metrics,
                    };
                }
                None => {
                    recorder.finish(StepOutcome::Cancelled);
                    warn!(step = name, "Retrieval cancelled");
                    return PipelineRun {
                        result: Err(AdaptorError::Cancelled {
                            step: name.to_string(),
                        }),
                        metrics,
                    };
                }
            }
        }

        PipelineRun {
            result: Ok(()),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Appends its name to the context, or fails, or idles.
    struct Scripted {
        name: &'static str,
        behaviour: Behaviour,
    }

    enum Behaviour {
        Succeed,
        NoOp,
        Fail,
        Hang(Arc<AtomicBool>),
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Step<Vec<&'static str>> for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &mut Vec<&'static str>) -> Result<StepStatus> {
            ctx.push(self.name);
            match &self.behaviour {
                Behaviour::Succeed => Ok(StepStatus::Done),
                Behaviour::NoOp => Ok(StepStatus::NoOp),
                Behaviour::Fail => Err(AdaptorError::Backend("connection refused".to_string())),
                Behaviour::Hang(dropped) => {
                    let _guard = SetOnDrop(Arc::clone(dropped));
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(StepStatus::Done)
                }
            }
        }
    }

    fn step(name: &'static str, behaviour: Behaviour) -> Scripted {
        Scripted { name, behaviour }
    }

    fn outcomes(run: &PipelineRun) -> Vec<(&str, StepOutcome)> {
        run.metrics
            .iter()
            .map(|m| (m.step.as_str(), m.outcome))
            .collect()
    }

    #[tokio::test]
    async fn test_all_steps_recorded_including_no_op() {
        let pipeline = PipelineExecutor::new()
            .with_step(step("parse_inputs", Behaviour::Succeed))
            .with_step(step("fetch", Behaviour::Succeed))
            .with_step(step("reduce", Behaviour::NoOp))
            .with_step(step("reformat", Behaviour::Succeed));

        let mut ctx = Vec::new();
        let run = pipeline.execute(&mut ctx, &CancellationToken::new()).await;

        assert!(run.is_success());
        assert_eq!(ctx, vec!["parse_inputs", "fetch", "reduce", "reformat"]);
        assert_eq!(
            outcomes(&run),
            vec![
                ("parse_inputs", StepOutcome::Succeeded),
                ("fetch", StepOutcome::Succeeded),
                ("reduce", StepOutcome::NoOp),
                ("reformat", StepOutcome::Succeeded),
            ]
        );
        for metric in &run.metrics {
            assert!(metric.finished_at >= metric.started_at);
            assert!(metric.duration_ms >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_stops_pipeline() {
        let pipeline = PipelineExecutor::new()
            .with_step(step("parse_inputs", Behaviour::Succeed))
            .with_step(step("fetch", Behaviour::Fail))
            .with_step(step("reduce", Behaviour::Succeed))
            .with_step(step("reformat", Behaviour::Succeed));

        let mut ctx = Vec::new();
        let run = pipeline.execute(&mut ctx, &CancellationToken::new()).await;

        assert_eq!(
            outcomes(&run),
            vec![
                ("parse_inputs", StepOutcome::Succeeded),
                ("fetch", StepOutcome::Failed),
            ]
        );
        assert_eq!(ctx, vec!["parse_inputs", "fetch"]);

        let err = run.result.unwrap_err();
        assert_eq!(err.failed_step(), Some("fetch"));
        assert_eq!(err.root(), &AdaptorError::Backend("connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_drops_running_step() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pipeline = PipelineExecutor::new()
            .with_step(step("parse_inputs", Behaviour::Succeed))
            .with_step(step("fetch", Behaviour::Hang(Arc::clone(&dropped))))
            .with_step(step("reformat", Behaviour::Succeed));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut ctx = Vec::new();
        let run = pipeline.execute(&mut ctx, &cancel).await;

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(
            outcomes(&run),
            vec![
                ("parse_inputs", StepOutcome::Succeeded),
                ("fetch", StepOutcome::Cancelled),
            ]
        );
        assert!(matches!(
            run.result,
            Err(AdaptorError::Cancelled { ref step }) if step == "fetch"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_records_first_step() {
        let pipeline = PipelineExecutor::new().with_step(step("parse_inputs", Behaviour::Succeed));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut ctx = Vec::new();
        let run = pipeline.execute(&mut ctx, &cancel).await;

        assert!(ctx.is_empty());
        assert_eq!(outcomes(&run), vec![("parse_inputs", StepOutcome::Cancelled)]);
    }

    #[test]
    fn test_step_names() {
        let pipeline: PipelineExecutor<Vec<&'static str>> = PipelineExecutor::new()
            .with_step(step("a", Behaviour::Succeed))
            .with_step(step("b", Behaviour::NoOp));
        assert_eq!(pipeline.step_names(), vec!["a", "b"]);
    }
}

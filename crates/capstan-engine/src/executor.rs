//! Sequential step execution within one job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use capstan_domain::{
    EventContext, JobSpec, PublishTarget, ReportBundle, Step, StepAction, StepOutcome, StepStatus,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::aggregator::ReportAggregator;
use crate::publisher::{IdempotentPublisher, PublishedRef};
use crate::runner::ActionRunner;

/// Result of one job's complete step sequence.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// Job id from matrix expansion.
    pub job_id: String,

    /// Whether every required step that ran succeeded.
    pub success: bool,

    /// Whether the job was cancelled before all steps could run. A
    /// cancelled job is neither passed nor failed.
    pub cancelled: bool,

    /// Outcomes of all steps, in step order.
    pub outcomes: Vec<StepOutcome>,

    /// Auxiliary failures (non-required publish/submit steps) surfaced
    /// separately from pass/fail.
    pub warnings: Vec<String>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl JobResult {
    /// Outcome of the named step, if it was reached.
    pub fn outcome(&self, step_name: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step_name == step_name)
    }
}

/// Executes one job's steps strictly in order with failure isolation.
///
/// Each step's condition is evaluated against the event context, the job
/// spec, and all prior outcomes in the same job; a false condition records
/// `Skipped` without invoking the external action. External actions run
/// exactly once per step per attempt; there is no retry at this layer.
#[derive(Clone)]
pub struct JobExecutor {
    runner: Arc<dyn ActionRunner>,
    publisher: Arc<IdempotentPublisher>,
    aggregator: Arc<ReportAggregator>,
}

impl JobExecutor {
    pub fn new(
        runner: Arc<dyn ActionRunner>,
        publisher: Arc<IdempotentPublisher>,
        aggregator: Arc<ReportAggregator>,
    ) -> Self {
        Self {
            runner,
            publisher,
            aggregator,
        }
    }

    /// Run all steps of one job. The cancellation flag is honored only by
    /// jobs that do not continue on sibling failure, and is checked only
    /// between steps, never mid-action, so an in-flight publish always
    /// runs to completion.
    pub async fn run_job(
        &self,
        event: &EventContext,
        job: &JobSpec,
        steps: &[Step],
        cancelled: &AtomicBool,
    ) -> JobResult {
        let start = Instant::now();
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(steps.len());
        let mut warnings = Vec::new();
        let mut success = true;
        let mut was_cancelled = false;

        for step in steps {
            if cancelled.load(Ordering::SeqCst) && !job.continue_on_sibling_failure {
                was_cancelled = true;
                outcomes.push(StepOutcome::skipped(&step.name, "run cancelled"));
                continue;
            }

            if !step.condition.evaluate(event, job, &outcomes) {
                info!(job = %job.id, step = %step.name, "skipping step, condition not met");
                outcomes.push(StepOutcome::skipped(&step.name, "condition not met"));
                continue;
            }

            info!(job = %job.id, step = %step.name, "executing step");
            let outcome = match &step.action {
                StepAction::Command(argv) => self.run_command(job, step, argv).await,
                StepAction::Publish {
                    space,
                    name,
                    mode,
                    content,
                } => {
                    let target = match mode {
                        capstan_domain::PublishMode::UpsertComment => {
                            PublishTarget::pr_comment(event)
                        }
                        _ => Some(PublishTarget::keyed(space, name, event, mode.clone())),
                    };
                    match target {
                        Some(target) => self.run_publish(job, step, &target, content).await,
                        None => {
                            StepOutcome::skipped(&step.name, "no pull request to comment on")
                        }
                    }
                }
                StepAction::SubmitReport { flag } => {
                    self.run_submit(job, step, flag, &outcomes).await
                }
            };

            if outcome.status == StepStatus::Failure {
                if step.required {
                    success = false;
                } else {
                    warnings.push(format!(
                        "job '{}' step '{}': {}",
                        job.id,
                        step.name,
                        outcome.detail.as_deref().unwrap_or("failed")
                    ));
                }
                warn!(job = %job.id, step = %step.name, required = step.required, "step failed");
            }
            outcomes.push(outcome);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(job = %job.id, success, duration_ms, "job finished");

        JobResult {
            job_id: job.id.clone(),
            success,
            cancelled: was_cancelled,
            outcomes,
            warnings,
            duration_ms,
        }
    }

    async fn run_command(&self, job: &JobSpec, step: &Step, argv: &[String]) -> StepOutcome {
        let mut env: HashMap<String, String> = step.env.clone();
        env.extend(job.matrix_env());
        env.insert("CAPSTAN_JOB_ID".to_string(), job.id.clone());

        match self
            .runner
            .invoke(job, &step.name, argv, &env, step.timeout_secs)
            .await
        {
            Ok(result) if result.success => {
                StepOutcome::success(&step.name, Some(result.exit_code), result.duration_ms)
            }
            Ok(result) => StepOutcome::failure(
                &step.name,
                Some(result.exit_code),
                result.duration_ms,
                &format!("exited with code {}", result.exit_code),
            ),
            // Spawn error or timeout.
            Err(e) => StepOutcome::failure(&step.name, Some(-1), 0, &e.to_string()),
        }
    }

    async fn run_publish(
        &self,
        _job: &JobSpec,
        step: &Step,
        target: &PublishTarget,
        content: &capstan_domain::PublishContent,
    ) -> StepOutcome {
        let start = Instant::now();
        match self.publisher.publish(target, content).await {
            Ok(PublishedRef::Skipped) => {
                StepOutcome::skipped(&step.name, "publish resolved to no-op")
            }
            Ok(_) => StepOutcome::success(&step.name, None, start.elapsed().as_millis() as u64),
            Err(e) => StepOutcome::failure(
                &step.name,
                None,
                start.elapsed().as_millis() as u64,
                &e.to_string(),
            ),
        }
    }

    async fn run_submit(
        &self,
        job: &JobSpec,
        step: &Step,
        flag: &str,
        prior: &[StepOutcome],
    ) -> StepOutcome {
        let start = Instant::now();
        let steps_value = serde_json::to_value(prior).unwrap_or(Value::Null);
        let payload = json!({
            "job": &job.id,
            "axes": &job.axis_values,
            "steps": steps_value,
        });
        let bundle = ReportBundle::new(flag, &job.id, payload);

        match self.aggregator.submit(&bundle).await {
            Ok(()) => StepOutcome::success(&step.name, None, start.elapsed().as_millis() as u64),
            Err(e) => StepOutcome::failure(
                &step.name,
                None,
                start.elapsed().as_millis() as u64,
                &e.to_string(),
            ),
        }
    }
}

//! Pipeline orchestration: gate, fan out, reduce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use capstan_domain::{EventContext, MatrixAxis, Step, TriggerRule};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::aggregator::ReportAggregator;
use crate::executor::{JobExecutor, JobResult};
use crate::matrix;
use crate::publisher::IdempotentPublisher;
use crate::runner::ActionRunner;
use crate::trigger;

/// Cross-job scheduling policy.
#[derive(Debug, Clone, Default)]
pub struct RunPolicy {
    /// When true, a failing job cancels steps of sibling jobs that have
    /// not started yet. Off by default: one matrix instance's failure
    /// must not block the others.
    pub fail_fast: bool,
}

/// Static definition of a pipeline: gate rules, matrix, and step sequence.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub rules: Vec<TriggerRule>,
    pub axes: Vec<MatrixAxis>,
    pub steps: Vec<Step>,
    pub policy: RunPolicy,
}

impl PipelinePlan {
    pub fn new(rules: Vec<TriggerRule>, axes: Vec<MatrixAxis>, steps: Vec<Step>) -> Self {
        Self {
            rules,
            axes,
            steps,
            policy: RunPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deterministic digest of the plan shape (ordered axes and step
    /// names), used to link reruns of the same plan.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for axis in &self.axes {
            hasher.update(axis.name.as_bytes());
            hasher.update(b"\0");
            for value in &axis.values {
                hasher.update(value.as_bytes());
                hasher.update(b"\0");
            }
        }
        for step in &self.steps {
            hasher.update(step.name.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run attempt.
    pub run_id: String,

    /// Digest of the plan that produced the run.
    pub plan_digest: String,

    /// Whether the trigger gate admitted the event. A skipped run is an
    /// intentional no-run, not an error, and reports success.
    pub triggered: bool,

    /// Logical AND over all jobs' required outcomes.
    pub success: bool,

    /// Per-job results, in matrix expansion order.
    pub jobs: Vec<JobResult>,

    /// Auxiliary publish/submit failures across all jobs, surfaced
    /// separately from pass/fail.
    pub warnings: Vec<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// Number of jobs that ran to completion and passed.
    pub fn passed_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.success && !j.cancelled).count()
    }

    /// Number of jobs that failed.
    pub fn failed_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| !j.success).count()
    }

    /// Number of jobs cancelled before completion.
    pub fn cancelled_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.cancelled).count()
    }
}

/// The orchestration core: evaluates the trigger gate once, expands the
/// matrix, runs every job as an independent parallel task, and reduces
/// the overall status after all tasks settle.
pub struct Pipeline {
    executor: JobExecutor,
}

impl Pipeline {
    pub fn new(
        runner: Arc<dyn ActionRunner>,
        publisher: Arc<IdempotentPublisher>,
        aggregator: Arc<ReportAggregator>,
    ) -> Self {
        Self {
            executor: JobExecutor::new(runner, publisher, aggregator),
        }
    }

    /// Run the plan for one event.
    pub async fn run(&self, event: &EventContext, plan: &PipelinePlan) -> RunReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let plan_digest = plan.digest();

        if !trigger::should_run(event, &plan.rules) {
            info!(run_id = %run_id, kind = ?event.kind, branch = %event.branch, "trigger gate skipped run");
            return RunReport {
                run_id,
                plan_digest,
                triggered: false,
                success: true,
                jobs: Vec::new(),
                warnings: Vec::new(),
                started_at,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        let jobs = matrix::expand(&plan.axes);
        info!(run_id = %run_id, jobs = jobs.len(), "starting pipeline run");

        let cancelled = Arc::new(AtomicBool::new(false));
        let fail_fast = plan.policy.fail_fast;

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|mut job| {
                job.continue_on_sibling_failure = !fail_fast;
                let job_id = job.id.clone();
                let executor = self.executor.clone();
                let event = event.clone();
                let steps = plan.steps.clone();
                let cancelled = cancelled.clone();
                let handle = tokio::spawn(async move {
                    let result = executor.run_job(&event, &job, &steps, &cancelled).await;
                    if fail_fast && !result.success {
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    result
                });
                (job_id, handle)
            })
            .collect();

        let settled = join_all(
            handles
                .into_iter()
                .map(|(job_id, handle)| async move { (job_id, handle.await) }),
        )
        .await;

        let mut results = Vec::with_capacity(settled.len());
        for (job_id, joined) in settled {
            match joined {
                Ok(result) => results.push(result),
                // A panicked job task counts as a failed job without a
                // step trace; siblings are unaffected.
                Err(e) => results.push(JobResult {
                    job_id: job_id.clone(),
                    success: false,
                    cancelled: false,
                    outcomes: Vec::new(),
                    warnings: vec![format!("job '{}' task panicked: {}", job_id, e)],
                    duration_ms: 0,
                }),
            }
        }

        let success = results.iter().all(|j| j.success);
        let warnings: Vec<String> = results
            .iter()
            .flat_map(|j| j.warnings.iter().cloned())
            .collect();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            run_id = %run_id,
            success,
            passed = results.iter().filter(|j| j.success).count(),
            failed = results.iter().filter(|j| !j.success).count(),
            warnings = warnings.len(),
            duration_ms,
            "pipeline run finished"
        );

        RunReport {
            run_id,
            plan_digest,
            triggered: true,
            success,
            jobs: results,
            warnings,
            started_at,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemoryCommentHost, MemoryCoverageSink, MemoryDocHost, ScriptedRunner};
    use capstan_domain::EventKind;

    fn pipeline_with(runner: Arc<ScriptedRunner>, event: &EventContext) -> Pipeline {
        let publisher = Arc::new(IdempotentPublisher::new(
            event.clone(),
            Arc::new(MemoryDocHost::new()),
            Arc::new(MemoryCommentHost::new()),
            "capstan-bot",
            "<!-- capstan-report -->",
        ));
        let aggregator = Arc::new(ReportAggregator::new(Arc::new(MemoryCoverageSink::new())));
        Pipeline::new(runner, publisher, aggregator)
    }

    #[test]
    fn test_plan_digest_deterministic() {
        let plan = PipelinePlan::new(
            vec![],
            vec![MatrixAxis::new("v", &["1", "2"])],
            vec![Step::command("build", &["true"], 60)],
        );
        assert_eq!(plan.digest(), plan.digest());
    }

    #[test]
    fn test_plan_digest_order_sensitive() {
        let a = PipelinePlan::new(
            vec![],
            vec![],
            vec![
                Step::command("build", &["true"], 60),
                Step::command("test", &["true"], 60),
            ],
        );
        let b = PipelinePlan::new(
            vec![],
            vec![],
            vec![
                Step::command("test", &["true"], 60),
                Step::command("build", &["true"], 60),
            ],
        );
        assert_ne!(a.digest(), b.digest());
    }

    #[tokio::test]
    async fn test_untriggered_run_is_a_clean_skip() {
        let event = EventContext::push("acme/widget", "feature/x", None, "alice");
        let runner = Arc::new(ScriptedRunner::new());
        let pipeline = pipeline_with(runner.clone(), &event);
        let plan = PipelinePlan::new(
            vec![TriggerRule::for_kinds(&[EventKind::Push]).allow_branches(&["main"])],
            vec![],
            vec![Step::command("build", &["true"], 60)],
        );

        let report = pipeline.run(&event, &plan).await;
        assert!(!report.triggered);
        assert!(report.success);
        assert!(report.jobs.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_report_counts_distinguish_cancelled_jobs() {
        let job = |id: &str, success: bool, cancelled: bool| JobResult {
            job_id: id.to_string(),
            success,
            cancelled,
            outcomes: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 1,
        };
        let report = RunReport {
            run_id: "run123".to_string(),
            plan_digest: "abc".to_string(),
            triggered: true,
            success: false,
            jobs: vec![
                job("3.8", true, false),
                job("3.9", false, false),
                job("3.10", true, true),
            ],
            warnings: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 3,
        };
        assert_eq!(report.passed_jobs(), 1);
        assert_eq!(report.failed_jobs(), 1);
        assert_eq!(report.cancelled_jobs(), 1);
    }

    #[tokio::test]
    async fn test_panicked_job_keeps_its_id() {
        use crate::runner::{ActionResult, ActionRunner};
        use async_trait::async_trait;
        use capstan_domain::JobSpec;
        use std::collections::HashMap;

        struct PanickingRunner;

        #[async_trait]
        impl ActionRunner for PanickingRunner {
            async fn invoke(
                &self,
                _job: &JobSpec,
                _step_name: &str,
                _argv: &[String],
                _env: &HashMap<String, String>,
                _timeout_secs: u64,
            ) -> anyhow::Result<ActionResult> {
                panic!("runner blew up");
            }
        }

        let event = EventContext::push("acme/widget", "main", None, "alice");
        let publisher = Arc::new(IdempotentPublisher::new(
            event.clone(),
            Arc::new(MemoryDocHost::new()),
            Arc::new(MemoryCommentHost::new()),
            "capstan-bot",
            "<!-- capstan-report -->",
        ));
        let aggregator = Arc::new(ReportAggregator::new(Arc::new(MemoryCoverageSink::new())));
        let pipeline = Pipeline::new(Arc::new(PanickingRunner), publisher, aggregator);

        let plan = PipelinePlan::new(
            vec![TriggerRule::for_kinds(&[EventKind::Push])],
            vec![MatrixAxis::new("version", &["3.11"])],
            vec![Step::command("test", &["true"], 60)],
        );

        let report = pipeline.run(&event, &plan).await;
        assert!(!report.success);
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].job_id, "3.11");
        assert!(report.warnings[0].contains("3.11"));
    }

    #[tokio::test]
    async fn test_sibling_jobs_isolated_from_failure() {
        let event = EventContext::push("acme/widget", "main", None, "alice");
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_step("3.9", "test");
        let pipeline = pipeline_with(runner.clone(), &event);
        let plan = PipelinePlan::new(
            vec![TriggerRule::for_kinds(&[EventKind::Push])],
            vec![MatrixAxis::new("version", &["3.8", "3.9", "3.10"])],
            vec![Step::command("test", &["true"], 60)],
        );

        let report = pipeline.run(&event, &plan).await;
        assert!(!report.success);
        assert_eq!(report.passed_jobs(), 2);
        assert_eq!(report.failed_jobs(), 1);

        // Every sibling still ran its step.
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
    }
}

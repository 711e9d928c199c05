//! Steps, run conditions, and outcomes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::{EventContext, EventKind};
use crate::job::JobSpec;
use crate::publish::{PublishContent, PublishMode};
use crate::trigger::pattern_matches;

/// Predicate deciding whether a step runs, evaluated purely over the event
/// context, the job spec, and the outcomes of all prior steps in the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Run only if no prior step in this job failed. The default.
    PriorSucceeded,

    /// Run regardless of prior failures (reporting/cleanup steps).
    Always,

    /// Run only if some prior step failed.
    PriorFailed,

    /// Run only if the named prior step succeeded.
    StepSucceeded(String),

    /// Run only for events of the given kind.
    EventKindIs(EventKind),

    /// Run only when the event branch matches the pattern.
    BranchMatches(String),

    /// Run only when the change does not originate from a fork.
    SameRepo,

    /// All sub-conditions must hold.
    AllOf(Vec<RunCondition>),

    /// At least one sub-condition must hold.
    AnyOf(Vec<RunCondition>),

    /// Negation.
    Not(Box<RunCondition>),
}

impl Default for RunCondition {
    fn default() -> Self {
        RunCondition::PriorSucceeded
    }
}

impl RunCondition {
    /// Evaluate the predicate. Pure and total.
    pub fn evaluate(&self, event: &EventContext, job: &JobSpec, prior: &[StepOutcome]) -> bool {
        let prior_failed = prior.iter().any(|o| o.status == StepStatus::Failure);
        match self {
            RunCondition::PriorSucceeded => !prior_failed,
            RunCondition::Always => true,
            RunCondition::PriorFailed => prior_failed,
            RunCondition::StepSucceeded(name) => prior
                .iter()
                .any(|o| &o.step_name == name && o.status == StepStatus::Success),
            RunCondition::EventKindIs(kind) => event.kind == *kind,
            RunCondition::BranchMatches(pattern) => pattern_matches(pattern, &event.branch),
            RunCondition::SameRepo => !event.is_fork(),
            RunCondition::AllOf(conds) => conds.iter().all(|c| c.evaluate(event, job, prior)),
            RunCondition::AnyOf(conds) => conds.iter().any(|c| c.evaluate(event, job, prior)),
            RunCondition::Not(cond) => !cond.evaluate(event, job, prior),
        }
    }
}

/// The external effect a step performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Run an opaque command (first element is the executable). Exit
    /// status is consumed as success/failure.
    Command(Vec<String>),

    /// Publish content to a keyed external destination.
    Publish {
        /// Destination space (e.g. a docs site or artifact store name).
        space: String,

        /// Resource name within the space.
        name: String,

        /// Reconciliation mode.
        mode: PublishMode,

        /// What to publish.
        content: PublishContent,
    },

    /// Submit this job's structured report to the coverage sink under the
    /// given flag. The payload is built from the job's outcomes so far.
    SubmitReport { flag: String },
}

/// One step of a job: a named, conditional external action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    /// Human-readable step name, unique within the job.
    pub name: String,

    /// When this step runs.
    pub condition: RunCondition,

    /// What this step does.
    pub action: StepAction,

    /// Extra environment for command actions.
    pub env: HashMap<String, String>,

    /// Timeout in seconds; 0 means no timeout. Applies to command actions
    /// only — publish and report-submission actions ignore it.
    pub timeout_secs: u64,

    /// Whether a failure of this step fails the job. Auxiliary steps
    /// (publication, report submission) are typically not required, so
    /// their failures surface as warnings instead of flipping the job.
    pub required: bool,
}

impl Step {
    /// A required command step with the default run condition.
    pub fn command(name: &str, argv: &[&str], timeout_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            condition: RunCondition::default(),
            action: StepAction::Command(argv.iter().map(|a| a.to_string()).collect()),
            env: HashMap::new(),
            timeout_secs,
            required: true,
        }
    }

    /// A non-required publish step gated on same-repo authority and on no
    /// prior step having failed.
    pub fn publish(
        name: &str,
        space: &str,
        resource: &str,
        mode: PublishMode,
        content: PublishContent,
    ) -> Self {
        Self {
            name: name.to_string(),
            condition: RunCondition::AllOf(vec![
                RunCondition::SameRepo,
                RunCondition::PriorSucceeded,
            ]),
            action: StepAction::Publish {
                space: space.to_string(),
                name: resource.to_string(),
                mode,
                content,
            },
            env: HashMap::new(),
            timeout_secs: 0,
            required: false,
        }
    }

    /// A non-required, always-run report submission step.
    pub fn submit_report(name: &str, flag: &str) -> Self {
        Self {
            name: name.to_string(),
            condition: RunCondition::Always,
            action: StepAction::SubmitReport {
                flag: flag.to_string(),
            },
            env: HashMap::new(),
            timeout_secs: 0,
            required: false,
        }
    }

    /// Replace the run condition.
    pub fn when(mut self, condition: RunCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Add an environment variable for the command.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Mark the step as required (its failure fails the job).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Final status of one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

/// Recorded outcome of one step execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    /// Name of the step this outcome belongs to.
    pub step_name: String,

    /// Final status.
    pub status: StepStatus,

    /// Exit code for command actions (None for skipped or non-command).
    pub exit_code: Option<i32>,

    /// Wall-clock duration in milliseconds (0 for skipped).
    pub duration_ms: u64,

    /// Human-readable detail (skip reason, error text).
    pub detail: Option<String>,
}

impl StepOutcome {
    pub fn success(step_name: &str, exit_code: Option<i32>, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.to_string(),
            status: StepStatus::Success,
            exit_code,
            duration_ms,
            detail: None,
        }
    }

    pub fn failure(
        step_name: &str,
        exit_code: Option<i32>,
        duration_ms: u64,
        detail: &str,
    ) -> Self {
        Self {
            step_name: step_name.to_string(),
            status: StepStatus::Failure,
            exit_code,
            duration_ms,
            detail: Some(detail.to_string()),
        }
    }

    pub fn skipped(step_name: &str, reason: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            detail: Some(reason.to_string()),
        }
    }
}

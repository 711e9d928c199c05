//! Triggering event description.

use serde::{Deserialize, Serialize};

/// Kind of event that started a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A branch or tag push.
    Push,

    /// A pull request opened or updated.
    PullRequest,

    /// A manually dispatched run.
    ManualDispatch,
}

/// Immutable description of the event that triggered a run.
///
/// Created once per run and read by every downstream component; all
/// trigger, condition, and authorization decisions are pure functions of
/// this context plus static configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventContext {
    /// What kind of event this is.
    pub kind: EventKind,

    /// Branch ref the event targets (for pull requests, the target branch).
    pub branch: String,

    /// Tag ref carried by a push event, if any.
    pub tag: Option<String>,

    /// Pull request number, for `PullRequest` events.
    pub pr_number: Option<u64>,

    /// Full name (`owner/repo`) of the repository the change comes from.
    pub source_repo: String,

    /// Full name (`owner/repo`) of the repository the pipeline runs in.
    pub target_repo: String,

    /// Login of the user who caused the event.
    pub actor: String,
}

impl EventContext {
    /// A push event to a branch, optionally carrying a tag ref.
    pub fn push(repo: &str, branch: &str, tag: Option<&str>, actor: &str) -> Self {
        Self {
            kind: EventKind::Push,
            branch: branch.to_string(),
            tag: tag.map(str::to_string),
            pr_number: None,
            source_repo: repo.to_string(),
            target_repo: repo.to_string(),
            actor: actor.to_string(),
        }
    }

    /// A pull request event. `source_repo` differs from `target_repo` for
    /// fork-originated contributions.
    pub fn pull_request(
        source_repo: &str,
        target_repo: &str,
        target_branch: &str,
        pr_number: u64,
        actor: &str,
    ) -> Self {
        Self {
            kind: EventKind::PullRequest,
            branch: target_branch.to_string(),
            tag: None,
            pr_number: Some(pr_number),
            source_repo: source_repo.to_string(),
            target_repo: target_repo.to_string(),
            actor: actor.to_string(),
        }
    }

    /// A manually dispatched run against a branch.
    pub fn manual(repo: &str, branch: &str, actor: &str) -> Self {
        Self {
            kind: EventKind::ManualDispatch,
            branch: branch.to_string(),
            tag: None,
            pr_number: None,
            source_repo: repo.to_string(),
            target_repo: repo.to_string(),
            actor: actor.to_string(),
        }
    }

    /// Whether the change originates from a fork of the target repository.
    ///
    /// Fork-originated contexts carry no write authority on the target, so
    /// external publication resolves to a no-op for them.
    pub fn is_fork(&self) -> bool {
        self.source_repo != self.target_repo
    }

    /// The ref used to key versioned publish targets: PR number scope for
    /// pull requests, otherwise the tag (if any), otherwise the branch.
    pub fn publish_ref(&self) -> String {
        if let Some(n) = self.pr_number {
            format!("pr-{}", n)
        } else if let Some(tag) = &self.tag {
            tag.clone()
        } else {
            self.branch.clone()
        }
    }
}

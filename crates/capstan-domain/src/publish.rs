//! Publish targets and content for idempotent external writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::EventContext;

/// How a publish operation reconciles with prior state at the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Create the resource if absent, otherwise replace its content in
    /// place. With `clean`, entries no longer present in the published set
    /// are removed, fully superseding the prior upload.
    CreateOrReplace { clean: bool },

    /// Find the single owned comment on the target and edit it, else
    /// create it. At most one owned comment exists per logical target no
    /// matter how often the pipeline reruns.
    UpsertComment,

    /// Add entries to the keyed collection without touching prior ones.
    AppendArtifact,
}

/// A keyed external destination.
///
/// The identity key is derived deterministically from the event context
/// and static configuration, so reruns of the same logical event resolve
/// to the same external resource instead of creating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishTarget {
    /// Stable identity, e.g. `docs/widget/pr-17` or `acme/widget#17`.
    pub identity_key: String,

    /// Reconciliation mode.
    pub mode: PublishMode,
}

impl PublishTarget {
    /// Target for a versioned doc/artifact space. The version segment is
    /// the event's publish ref (PR scope, tag, or branch).
    pub fn keyed(space: &str, name: &str, event: &EventContext, mode: PublishMode) -> Self {
        Self {
            identity_key: format!("{}/{}/{}", space, name, event.publish_ref()),
            mode,
        }
    }

    /// Target for the owned comment thread of the event's pull request.
    /// Returns None for events that have no pull request.
    pub fn pr_comment(event: &EventContext) -> Option<Self> {
        event.pr_number.map(|n| Self {
            identity_key: format!("{}#{}", event.target_repo, n),
            mode: PublishMode::UpsertComment,
        })
    }
}

/// What gets published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishContent {
    /// Named file entries for doc uploads and artifact collections.
    Files(BTreeMap<String, Vec<u8>>),

    /// Markdown body for a comment.
    Markdown(String),
}

impl PublishContent {
    /// Build a file set from `(name, bytes)` pairs.
    pub fn files(entries: &[(&str, &[u8])]) -> Self {
        PublishContent::Files(
            entries
                .iter()
                .map(|(n, d)| (n.to_string(), d.to_vec()))
                .collect(),
        )
    }

    pub fn markdown(body: &str) -> Self {
        PublishContent::Markdown(body.to_string())
    }
}

//! Idempotent external publication.
//!
//! All writes are keyed by a stable identity, so repeated execution for
//! the same logical event converges on one external resource instead of
//! creating duplicates. Concurrent writers to the same key are serialized
//! through a per-key async lock, since two parallel jobs racing to upsert
//! the same PR comment could otherwise interleave find/create calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use capstan_domain::{
    EventContext, PublishContent, PublishError, PublishMode, PublishTarget,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A comment as seen on the external thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRef {
    pub id: u64,
    pub author: String,
    pub body: String,
}

/// Documentation/artifact hosting endpoint, addressed by identity key.
///
/// `upload` creates or overwrites the named entry under the key; `list`
/// returns the entry names currently present (empty if the key has never
/// been written).
#[async_trait]
pub trait DocHost: Send + Sync {
    async fn list(&self, key: &str) -> Result<Vec<String>, PublishError>;

    async fn upload(&self, key: &str, name: &str, data: &[u8]) -> Result<(), PublishError>;

    async fn delete(&self, key: &str, name: &str) -> Result<(), PublishError>;
}

/// Comment thread endpoint, addressed by issue/PR number.
#[async_trait]
pub trait CommentHost: Send + Sync {
    async fn list(&self, issue: u64) -> Result<Vec<CommentRef>, PublishError>;

    async fn create(&self, issue: u64, body: &str) -> Result<u64, PublishError>;

    async fn edit(&self, comment_id: u64, body: &str) -> Result<(), PublishError>;
}

/// What a publish call resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedRef {
    /// A new resource was created at the key.
    Created { key: String },

    /// An existing resource's content was replaced.
    Replaced { key: String },

    /// An existing owned comment was edited in place.
    Updated { key: String, comment_id: u64 },

    /// Entries were appended to the keyed collection.
    Appended { key: String },

    /// No external call was made (unauthorized context or no target).
    Skipped,
}

/// Performs external side effects exactly once per logical event.
///
/// Constructed per run with the event context: a fork-originated change
/// carries no write authority on the target repository, so publication
/// resolves to a skipped no-op before any external call is attempted.
pub struct IdempotentPublisher {
    event: EventContext,
    docs: Arc<dyn DocHost>,
    comments: Arc<dyn CommentHost>,

    /// Acting identity for owned comments.
    author: String,

    /// Fixed substring identifying comments this system owns.
    marker: String,

    /// Per-identity-key write serialization.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdempotentPublisher {
    pub fn new(
        event: EventContext,
        docs: Arc<dyn DocHost>,
        comments: Arc<dyn CommentHost>,
        author: &str,
        marker: &str,
    ) -> Self {
        Self {
            event,
            docs,
            comments,
            author: author.to_string(),
            marker: marker.to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the acting context has write authority on the target.
    pub fn authorized(&self) -> bool {
        !self.event.is_fork()
    }

    /// Publish content to the target, converging with any prior state at
    /// the same identity key. Once a write is in flight it always runs to
    /// completion; cancellation only prevents writes that have not started.
    pub async fn publish(
        &self,
        target: &PublishTarget,
        content: &PublishContent,
    ) -> Result<PublishedRef, PublishError> {
        if !self.authorized() {
            debug!(
                key = %target.identity_key,
                source = %self.event.source_repo,
                "skipping publish: fork-origin context has no write authority"
            );
            return Ok(PublishedRef::Skipped);
        }

        let lock = self.key_lock(&target.identity_key).await;
        let _guard = lock.lock().await;

        let result = match &target.mode {
            PublishMode::CreateOrReplace { clean } => {
                self.create_or_replace(target, content, *clean).await
            }
            PublishMode::UpsertComment => self.upsert_comment(target, content).await,
            PublishMode::AppendArtifact => self.append_artifact(target, content).await,
        };

        if let Ok(published) = &result {
            info!(key = %target.identity_key, result = ?published, "publish reconciled");
        }
        result
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn create_or_replace(
        &self,
        target: &PublishTarget,
        content: &PublishContent,
        clean: bool,
    ) -> Result<PublishedRef, PublishError> {
        let files = file_entries(target, content)?;
        let key = &target.identity_key;

        let existing = self.docs.list(key).await?;
        for (name, data) in files {
            self.docs.upload(key, name, data).await?;
        }
        if clean {
            for stale in existing.iter().filter(|n| !files.contains_key(*n)) {
                self.docs.delete(key, stale).await?;
            }
        }

        if existing.is_empty() {
            Ok(PublishedRef::Created { key: key.clone() })
        } else {
            Ok(PublishedRef::Replaced { key: key.clone() })
        }
    }

    async fn upsert_comment(
        &self,
        target: &PublishTarget,
        content: &PublishContent,
    ) -> Result<PublishedRef, PublishError> {
        let body = match content {
            PublishContent::Markdown(body) => body,
            _ => {
                return Err(PublishError::ContentMismatch {
                    key: target.identity_key.clone(),
                })
            }
        };
        let issue = match self.event.pr_number {
            Some(n) => n,
            // Nothing to comment on; converge to a no-op.
            None => return Ok(PublishedRef::Skipped),
        };

        // The marker makes the comment findable on rerun.
        let stamped = if body.contains(&self.marker) {
            body.clone()
        } else {
            format!("{}\n\n{}", body, self.marker)
        };

        let existing = self.comments.list(issue).await?;
        let owned = existing
            .iter()
            .find(|c| c.author == self.author && c.body.contains(&self.marker));

        match owned {
            Some(comment) => {
                self.comments.edit(comment.id, &stamped).await?;
                Ok(PublishedRef::Updated {
                    key: target.identity_key.clone(),
                    comment_id: comment.id,
                })
            }
            None => {
                self.comments.create(issue, &stamped).await?;
                Ok(PublishedRef::Created {
                    key: target.identity_key.clone(),
                })
            }
        }
    }

    async fn append_artifact(
        &self,
        target: &PublishTarget,
        content: &PublishContent,
    ) -> Result<PublishedRef, PublishError> {
        let files = file_entries(target, content)?;
        let key = &target.identity_key;
        for (name, data) in files {
            self.docs.upload(key, name, data).await?;
        }
        Ok(PublishedRef::Appended { key: key.clone() })
    }
}

fn file_entries<'a>(
    target: &PublishTarget,
    content: &'a PublishContent,
) -> Result<&'a BTreeMap<String, Vec<u8>>, PublishError> {
    match content {
        PublishContent::Files(files) => Ok(files),
        _ => Err(PublishError::ContentMismatch {
            key: target.identity_key.clone(),
        }),
    }
}

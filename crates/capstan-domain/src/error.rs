//! Error types for external publication and report submission.

use thiserror::Error;

/// Errors reported by the idempotent publisher.
///
/// Only `TransientUnavailable` is retryable; the publisher itself never
/// retries, it only classifies. Unauthorized contexts (fork-origin events)
/// do not produce an error at all — they resolve to a skipped no-op before
/// any external call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The acting context lacks write authority on the target.
    #[error("not authorized to write to '{key}'")]
    Unauthorized { key: String },

    /// A referenced resource does not exist. For create-or-replace targets
    /// this is the create path, not an error; it surfaces only when an
    /// operation requires a pre-existing resource (e.g. editing a comment
    /// that was deleted out from under us).
    #[error("resource not found: '{key}'")]
    NotFound { key: String },

    /// The endpoint is temporarily unreachable. Retryable by the caller.
    #[error("endpoint temporarily unavailable: {reason}")]
    TransientUnavailable { reason: String },

    /// The content shape does not match the target's publish mode.
    #[error("content does not match publish mode for '{key}'")]
    ContentMismatch { key: String },
}

impl PublishError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::TransientUnavailable { .. })
    }
}

/// Errors reported by the coverage/report sink.
///
/// Submission failure is non-fatal to a job: it is surfaced as a warning
/// and never flips an already-recorded step or job outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The sink rejected the bundle.
    #[error("report sink rejected flag '{flag}': {reason}")]
    Rejected { flag: String, reason: String },

    /// The sink is unreachable.
    #[error("report sink unavailable: {reason}")]
    Unavailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(PublishError::TransientUnavailable {
            reason: "503".to_string()
        }
        .is_retryable());
        assert!(!PublishError::Unauthorized {
            key: "docs/site/main".to_string()
        }
        .is_retryable());
        assert!(!PublishError::NotFound {
            key: "comment:42".to_string()
        }
        .is_retryable());
    }
}

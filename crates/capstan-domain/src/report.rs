//! Flag-tagged report bundles for the coverage sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One job's structured report, routed to the external sink under `flag`.
///
/// Jobs sharing a flag contribute to the same logical coverage channel;
/// distinct flags stay isolated so one suite family's data never dilutes
/// another's. Reruns of the same `(flag, source_job_id)` pair overwrite
/// rather than append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportBundle {
    /// Channel name, e.g. one per test-suite family.
    pub flag: String,

    /// Opaque report payload.
    pub payload: Value,

    /// Id of the job that produced the payload.
    pub source_job_id: String,
}

impl ReportBundle {
    pub fn new(flag: &str, source_job_id: &str, payload: Value) -> Self {
        Self {
            flag: flag.to_string(),
            payload,
            source_job_id: source_job_id.to_string(),
        }
    }
}

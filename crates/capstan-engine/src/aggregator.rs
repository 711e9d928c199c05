//! Flag-tagged report aggregation.

use std::sync::Arc;

use async_trait::async_trait;
use capstan_domain::{ReportBundle, SubmitError};
use serde_json::Value;
use tracing::{debug, warn};

/// External coverage/report sink.
///
/// Submissions are keyed by `(flag, source_job)`: reruns of the same pair
/// overwrite, distinct flags stay isolated. The sink merges same-flag data
/// across jobs; the aggregator does not.
#[async_trait]
pub trait CoverageSink: Send + Sync {
    async fn submit(
        &self,
        flag: &str,
        source_job: &str,
        payload: &Value,
    ) -> Result<(), SubmitError>;
}

/// Routes per-job report bundles to the external sink.
///
/// Submission failure is non-fatal to the job's own pass/fail status; the
/// caller surfaces it as a warning and never flips a recorded outcome.
pub struct ReportAggregator {
    sink: Arc<dyn CoverageSink>,
}

impl ReportAggregator {
    pub fn new(sink: Arc<dyn CoverageSink>) -> Self {
        Self { sink }
    }

    pub async fn submit(&self, bundle: &ReportBundle) -> Result<(), SubmitError> {
        match self
            .sink
            .submit(&bundle.flag, &bundle.source_job_id, &bundle.payload)
            .await
        {
            Ok(()) => {
                debug!(flag = %bundle.flag, job = %bundle.source_job_id, "report submitted");
                Ok(())
            }
            Err(e) => {
                warn!(flag = %bundle.flag, job = %bundle.source_job_id, error = %e, "report submission failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryCoverageSink;
    use serde_json::json;

    #[tokio::test]
    async fn test_flags_stay_isolated() {
        let sink = Arc::new(MemoryCoverageSink::new());
        let aggregator = ReportAggregator::new(sink.clone());

        aggregator
            .submit(&ReportBundle::new("unit", "3.8", json!({"lines": 90})))
            .await
            .expect("submit");
        aggregator
            .submit(&ReportBundle::new("lint", "3.8", json!({"score": 9.5})))
            .await
            .expect("submit");

        assert_eq!(sink.flag_jobs("unit").await, vec!["3.8"]);
        assert_eq!(sink.flag_jobs("lint").await, vec!["3.8"]);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_same_flag_and_job() {
        let sink = Arc::new(MemoryCoverageSink::new());
        let aggregator = ReportAggregator::new(sink.clone());

        aggregator
            .submit(&ReportBundle::new("unit", "3.8", json!({"lines": 90})))
            .await
            .expect("submit");
        aggregator
            .submit(&ReportBundle::new("unit", "3.8", json!({"lines": 93})))
            .await
            .expect("submit");

        assert_eq!(sink.flag_jobs("unit").await, vec!["3.8"]);
        assert_eq!(
            sink.report("unit", "3.8").await,
            Some(json!({"lines": 93}))
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_swallowed() {
        let sink = Arc::new(MemoryCoverageSink::new());
        sink.fail_flag("unit").await;
        let aggregator = ReportAggregator::new(sink.clone());

        let result = aggregator
            .submit(&ReportBundle::new("unit", "3.8", json!({})))
            .await;
        assert!(matches!(result, Err(SubmitError::Unavailable { .. })));
    }
}

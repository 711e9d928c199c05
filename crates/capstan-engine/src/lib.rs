//! Capstan Engine - CI pipeline orchestration
//!
//! Provides the decision/execution core of a CI pipeline:
//! - Gates runs on declarative trigger rules (`trigger`)
//! - Expands a parameter matrix into independent jobs (`matrix`)
//! - Executes ordered conditional steps with failure isolation (`executor`)
//! - Reconciles external writes idempotently by stable key (`publisher`)
//! - Routes per-job reports to flag-tagged channels (`aggregator`)
//!
//! External endpoints (command execution, doc hosting, comment threads,
//! the coverage sink) are async traits; in-memory fakes live in `fakes`.

pub mod aggregator;
pub mod executor;
pub mod fakes;
pub mod matrix;
pub mod pipeline;
pub mod publisher;
pub mod runner;
pub mod trigger;

// Re-export key types
pub use aggregator::ReportAggregator;
pub use executor::{JobExecutor, JobResult};
pub use matrix::expand;
pub use pipeline::{Pipeline, PipelinePlan, RunPolicy, RunReport};
pub use publisher::{CommentHost, CommentRef, DocHost, IdempotentPublisher, PublishedRef};
pub use runner::{ActionResult, ActionRunner, CommandRunner};
pub use trigger::should_run;

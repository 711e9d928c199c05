//! Capstan Domain Model
//!
//! Defines the pure data objects of the CI orchestration core:
//! - `EventContext`: immutable snapshot of the triggering event
//! - `TriggerRule`: declarative run/no-run gating rules
//! - `MatrixAxis` / `JobSpec`: Cartesian fan-out into independent jobs
//! - `Step` / `StepOutcome`: ordered conditional work within one job
//! - `PublishTarget` / `PublishContent`: keyed, idempotent external writes
//! - `ReportBundle`: flag-tagged coverage/report submission
//!
//! Everything here is plain data plus pure predicate evaluation. All I/O
//! lives in `capstan-engine` behind async traits.

pub mod error;
pub mod event;
pub mod job;
pub mod publish;
pub mod report;
pub mod step;
pub mod trigger;

pub use error::{PublishError, SubmitError};
pub use event::{EventContext, EventKind};
pub use job::{JobSpec, MatrixAxis};
pub use publish::{PublishContent, PublishMode, PublishTarget};
pub use report::ReportBundle;
pub use step::{RunCondition, Step, StepAction, StepOutcome, StepStatus};
pub use trigger::{pattern_matches, TriggerRule};

/// Capstan domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

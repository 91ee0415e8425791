//! Stage orchestration for portalflow
//!
//! A workflow is an ordered list of stages run against one browser session. Each stage performs
//! an action, races its readiness probes, and gets at most one corrective fallback. The runner
//! stops at the first failing stage, records artifacts at checkpoints, and always tears the
//! session down.

pub mod errors;
pub mod executor;
mod lease;
pub mod sink;
mod stage;
pub mod types;

pub use errors::{ArtifactError, FlowError};
pub use executor::WorkflowRunner;
pub use sink::{ArtifactSink, MemoryArtifactSink, NullArtifactSink};
pub use types::{
    FailureReason, StageDefinition, StageOutcome, StageState, WorkflowResult,
};

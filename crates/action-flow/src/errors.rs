//! Flow error types

use action_gate::ProbeError;
use thiserror::Error;

/// Configuration errors. Raised before any session is opened; runtime failures never use this.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The workflow has no stages
    #[error("Workflow has no stages")]
    EmptyWorkflow,

    /// A stage definition is malformed
    #[error("Stage '{stage}' is invalid: {reason}")]
    InvalidStage { stage: String, reason: String },

    /// Two stages share a name
    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),
}

impl FlowError {
    pub fn invalid(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::InvalidStage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_probe(stage: &str, err: ProbeError) -> Self {
        FlowError::invalid(stage, err.to_string())
    }
}

/// Failure to persist an artifact. Always logged and ignored by the runner.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact rejected: {0}")]
    Rejected(String),
}

//! Error types for probes

use thiserror::Error;

/// Probe error enumeration
///
/// "Not matched yet" is never an error. Only a destroyed session or a malformed probe is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The session went away while probing
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Probe definition cannot be evaluated
    #[error("Invalid probe '{id}': {reason}")]
    InvalidProbe { id: String, reason: String },
}

impl ProbeError {
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::InvalidProbe {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, ProbeError::SessionLost(_))
    }
}

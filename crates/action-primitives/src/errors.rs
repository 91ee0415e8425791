//! Error types for action execution

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

use crate::types::ActionFailureKind;

/// Failures raised while performing an action
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Navigation timed out waiting for page load
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Settle wait did not complete in time
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Element anchor could not be resolved
    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    /// Element is present but hidden or disabled
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// Dropdown option was not found
    #[error("Option not found in dropdown: {0}")]
    OptionNotFound(String),

    /// Workflow input missing, blank or unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// The browser session is gone
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, ActionError::SessionLost(_))
    }

    /// Failure class reported on the action report.
    pub fn failure_kind(&self) -> ActionFailureKind {
        match self {
            ActionError::AnchorNotFound(_) | ActionError::OptionNotFound(_) => {
                ActionFailureKind::TargetNotFound
            }
            ActionError::NotInteractable(_) => ActionFailureKind::NotInteractable,
            ActionError::InvalidInput(_) => ActionFailureKind::InvalidInput,
            ActionError::NavTimeout(_)
            | ActionError::WaitTimeout(_)
            | ActionError::CdpIo(_)
            | ActionError::SessionLost(_)
            | ActionError::Internal(_) => ActionFailureKind::Transport,
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let detail = err.hint.clone().unwrap_or_else(|| err.kind.to_string());
        match err.kind {
            AdapterErrorKind::TargetNotFound => ActionError::AnchorNotFound(detail),
            AdapterErrorKind::NotInteractable => ActionError::NotInteractable(detail),
            AdapterErrorKind::OptionNotFound => ActionError::OptionNotFound(detail),
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(detail),
            AdapterErrorKind::SessionClosed => ActionError::SessionLost(detail),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(detail),
            AdapterErrorKind::Internal => ActionError::Internal(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_map_to_failure_classes() {
        let missing: ActionError = AdapterError::new(AdapterErrorKind::TargetNotFound).into();
        assert_eq!(missing.failure_kind(), ActionFailureKind::TargetNotFound);

        let hidden: ActionError = AdapterError::new(AdapterErrorKind::NotInteractable).into();
        assert_eq!(hidden.failure_kind(), ActionFailureKind::NotInteractable);

        let slow: ActionError = AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint("https://iampe.adm.gov.it")
            .into();
        assert_eq!(slow.failure_kind(), ActionFailureKind::Transport);
        assert!(slow.to_string().contains("iampe.adm.gov.it"));
    }

    #[test]
    fn closed_session_is_session_lost() {
        let err: ActionError = AdapterError::new(AdapterErrorKind::SessionClosed).into();
        assert!(err.is_session_lost());
    }
}

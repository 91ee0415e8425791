//! Probe definitions and verdicts

use crate::conditions::{ProbeKind, UrlPredicate, VisibilityState};
use crate::errors::ProbeError;
use cdp_adapter::AnchorDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// What a match means for the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeRole {
    /// Evidence that the action took effect
    Ready,
    /// Evidence of a known failure state (e.g. a login error banner)
    Reject,
}

/// A single bounded check for one completion signal.
///
/// Probes are immutable configuration; all runtime state lives in the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub id: String,
    #[serde(flatten)]
    pub kind: ProbeKind,
    pub role: ProbeRole,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Probe {
    pub fn new(id: impl Into<String>, kind: ProbeKind, timeout_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            role: ProbeRole::Ready,
            timeout_ms,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn visible(id: impl Into<String>, anchor: AnchorDescriptor, timeout_ms: u64) -> Self {
        Self::new(
            id,
            ProbeKind::Visibility {
                anchor,
                state: VisibilityState::Visible,
            },
            timeout_ms,
        )
    }

    pub fn hidden(id: impl Into<String>, anchor: AnchorDescriptor, timeout_ms: u64) -> Self {
        Self::new(
            id,
            ProbeKind::Visibility {
                anchor,
                state: VisibilityState::Hidden,
            },
            timeout_ms,
        )
    }

    pub fn url(id: impl Into<String>, predicate: UrlPredicate, timeout_ms: u64) -> Self {
        Self::new(id, ProbeKind::UrlPattern { predicate }, timeout_ms)
    }

    pub fn network_quiet(id: impl Into<String>, quiet_ms: u64, timeout_ms: u64) -> Self {
        let kind = ProbeKind::NetworkQuiescence {
            quiet_ms,
            require_activity: false,
        };
        Self::new(id, kind, timeout_ms)
    }

    /// Quiescence that only counts once the action has put a request in flight.
    pub fn network_settled(id: impl Into<String>, quiet_ms: u64, timeout_ms: u64) -> Self {
        let kind = ProbeKind::NetworkQuiescence {
            quiet_ms,
            require_activity: true,
        };
        Self::new(id, kind, timeout_ms)
    }

    pub fn value_change(id: impl Into<String>, anchor: AnchorDescriptor, timeout_ms: u64) -> Self {
        Self::new(id, ProbeKind::ValueChange { anchor }, timeout_ms)
    }

    pub fn element_count(id: impl Into<String>, anchor: AnchorDescriptor, timeout_ms: u64) -> Self {
        Self::new(id, ProbeKind::ElementCount { anchor }, timeout_ms)
    }

    /// Turn this probe into a veto: a match fails the stage.
    pub fn reject(mut self) -> Self {
        self.role = ProbeRole::Reject;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn is_reject(&self) -> bool {
        self.role == ProbeRole::Reject
    }

    /// Reject definitions that could never be evaluated.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.id.trim().is_empty() {
            return Err(ProbeError::invalid("<unnamed>", "probe id is empty"));
        }
        if self.timeout_ms == 0 {
            return Err(ProbeError::invalid(&self.id, "timeout must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ProbeError::invalid(&self.id, "poll interval must be greater than zero"));
        }
        if let Some(anchor) = self.kind.anchor() {
            if !anchor.is_well_formed() {
                return Err(ProbeError::invalid(&self.id, format!("blank anchor {}", anchor)));
            }
        }
        if let ProbeKind::UrlPattern { predicate } = &self.kind {
            match predicate {
                UrlPredicate::Contains(fragment) | UrlPredicate::NotContains(fragment)
                    if fragment.is_empty() =>
                {
                    return Err(ProbeError::invalid(&self.id, "empty url fragment"));
                }
                _ => {
                    predicate
                        .compile()
                        .map_err(|err| ProbeError::invalid(&self.id, err.to_string()))?;
                }
            }
        }
        Ok(())
    }
}

/// Result of evaluating one probe to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeVerdict {
    pub probe_id: String,
    pub role: ProbeRole,
    pub matched: bool,
    /// What the probe observed when it matched
    pub evidence: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeVerdict {
    pub fn matched(probe: &Probe, evidence: String, elapsed: Duration) -> Self {
        Self {
            probe_id: probe.id.clone(),
            role: probe.role,
            matched: true,
            evidence: Some(evidence),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn timed_out(probe: &Probe, elapsed: Duration) -> Self {
        Self {
            probe_id: probe.id.clone(),
            role: probe.role,
            matched: false,
            evidence: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

//! Core types for stage orchestration

use action_gate::{Probe, ProbeRole};
use action_primitives::ActionSpec;
use portalflow_core_types::{CheckpointName, RunId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::errors::FlowError;

/// Stage definition - one action plus the probes that define "done"
///
/// Definitions are static configuration: built once, validated, reused read-only across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,

    /// Mutating action performed on entry
    pub action: ActionSpec,

    /// Race members; at least one must have the `Ready` role
    pub probes: Vec<Probe>,

    /// Corrective action tried once when the race times out
    pub fallback: Option<ActionSpec>,

    /// Evaluated first; when it does not match the stage is skipped
    pub precondition: Option<Probe>,

    /// Cap for each race of this stage, on top of per-probe timeouts
    pub stage_timeout_ms: Option<u64>,

    /// Snapshot taken once the stage reaches a terminal state
    pub checkpoint: Option<CheckpointName>,

    /// Snapshot taken right before the action
    pub pre_checkpoint: Option<CheckpointName>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>, action: ActionSpec) -> Self {
        Self {
            name: name.into(),
            action,
            probes: Vec::new(),
            fallback: None,
            precondition: None,
            stage_timeout_ms: None,
            checkpoint: None,
            pre_checkpoint: None,
        }
    }

    pub fn probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn fallback(mut self, action: ActionSpec) -> Self {
        self.fallback = Some(action);
        self
    }

    pub fn precondition(mut self, probe: Probe) -> Self {
        self.precondition = Some(probe);
        self
    }

    pub fn stage_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.stage_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn checkpoint(mut self, name: impl Into<String>) -> Self {
        self.checkpoint = Some(CheckpointName::new(name));
        self
    }

    pub fn pre_checkpoint(mut self, name: impl Into<String>) -> Self {
        self.pre_checkpoint = Some(CheckpointName::new(name));
        self
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    /// Reject definitions that can never run correctly.
    pub fn validate(&self) -> Result<(), FlowError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FlowError::invalid("<unnamed>", "stage name is empty"));
        }
        if let Some(reason) = self.action.structural_error() {
            return Err(FlowError::invalid(name, reason));
        }
        if let Some(reason) = self.fallback.as_ref().and_then(ActionSpec::structural_error) {
            return Err(FlowError::invalid(name, format!("fallback: {}", reason)));
        }
        if self.probes.is_empty() {
            return Err(FlowError::invalid(name, "stage has no probes"));
        }
        if !self.probes.iter().any(|probe| probe.role == ProbeRole::Ready) {
            return Err(FlowError::invalid(name, "stage has no ready probe"));
        }
        if self.stage_timeout_ms == Some(0) {
            return Err(FlowError::invalid(name, "stage timeout must be greater than zero"));
        }

        let mut ids = HashSet::new();
        for probe in &self.probes {
            probe
                .validate()
                .map_err(|err| FlowError::from_probe(name, err))?;
            if !ids.insert(probe.id.as_str()) {
                return Err(FlowError::invalid(
                    name,
                    format!("duplicate probe id '{}'", probe.id),
                ));
            }
        }
        if let Some(precondition) = &self.precondition {
            precondition
                .validate()
                .map_err(|err| FlowError::from_probe(name, err))?;
        }
        Ok(())
    }
}

/// Stage state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Acting,
    Racing,
    FallbackActing,
    FallbackRacing,
    Success,
    Failed,
    /// Precondition did not hold; nothing was done
    Skipped,
}

/// Why a stage failed. Stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The action itself could not be performed (missing / hidden target, transport failure)
    ActionNotPerformed,
    /// Every probe timed out and no fallback is defined
    NoReadinessSignal,
    /// Fallback was attempted and the re-race still did not match
    FallbackExhausted,
    /// A reject probe observed a known failure state
    RejectedBySignal,
    /// The browser session died or panicked
    SessionLost,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ActionNotPerformed => "action-not-performed",
            FailureReason::NoReadinessSignal => "no-readiness-signal",
            FailureReason::FallbackExhausted => "fallback-exhausted",
            FailureReason::RejectedBySignal => "rejected-by-signal",
            FailureReason::SessionLost => "session-lost",
        }
    }
}

/// Outcome of one stage execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub name: String,
    pub succeeded: bool,
    pub skipped: bool,
    pub matched_probe: Option<String>,
    pub failure_reason: Option<FailureReason>,
    /// Matched probe evidence, or what went wrong
    pub detail: Option<String>,
    /// Note reported by the stage's action (selected option, settle warning)
    pub action_detail: Option<String>,
    pub fallback_attempted: bool,
    pub elapsed_ms: u64,
    /// States visited, in order
    pub trace: Vec<StageState>,
}

impl StageOutcome {
    pub fn success(
        name: impl Into<String>,
        matched_probe: impl Into<String>,
        elapsed: Duration,
        trace: Vec<StageState>,
    ) -> Self {
        Self {
            name: name.into(),
            succeeded: true,
            skipped: false,
            matched_probe: Some(matched_probe.into()),
            failure_reason: None,
            detail: None,
            action_detail: None,
            fallback_attempted: false,
            elapsed_ms: elapsed.as_millis() as u64,
            trace,
        }
    }

    pub fn skipped(name: impl Into<String>, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            succeeded: true,
            skipped: true,
            matched_probe: None,
            failure_reason: None,
            detail: Some(detail.into()),
            action_detail: None,
            fallback_attempted: false,
            elapsed_ms: elapsed.as_millis() as u64,
            trace: vec![StageState::Pending, StageState::Skipped],
        }
    }

    pub fn failure(
        name: impl Into<String>,
        reason: FailureReason,
        detail: Option<String>,
        elapsed: Duration,
        trace: Vec<StageState>,
    ) -> Self {
        Self {
            name: name.into(),
            succeeded: false,
            skipped: false,
            matched_probe: None,
            failure_reason: Some(reason),
            detail,
            action_detail: None,
            fallback_attempted: false,
            elapsed_ms: elapsed.as_millis() as u64,
            trace,
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_action_detail(mut self, detail: Option<String>) -> Self {
        self.action_detail = detail;
        self
    }

    pub fn with_fallback_attempted(mut self, attempted: bool) -> Self {
        self.fallback_attempted = attempted;
        self
    }
}

/// Structured result of a whole workflow run
///
/// `halted_at_stage` is set iff `succeeded` is false, and is the index of the last (first
/// failing) entry of `stages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub run_id: RunId,
    pub succeeded: bool,
    pub halted_at_stage: Option<usize>,
    pub stages: Vec<StageOutcome>,
    /// Checkpoint name to artifact reference
    pub artifacts: BTreeMap<String, String>,
    /// Page URL when the run ended, read before the session was released
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub elapsed_ms: u64,
}

impl WorkflowResult {
    pub fn from_outcomes(
        run_id: RunId,
        stages: Vec<StageOutcome>,
        artifacts: BTreeMap<String, String>,
        elapsed: Duration,
    ) -> Self {
        let halted_at_stage = stages.iter().position(|outcome| !outcome.succeeded);
        Self {
            run_id,
            succeeded: halted_at_stage.is_none() && !stages.is_empty(),
            halted_at_stage,
            stages,
            artifacts,
            final_url: None,
            title: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn with_final_page(mut self, url: Option<String>, title: Option<String>) -> Self {
        self.final_url = url;
        self.title = title;
        self
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.halted_at_stage
            .and_then(|index| self.stages.get(index))
            .and_then(|outcome| outcome.failure_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_gate::UrlPredicate;
    use action_primitives::InputValue;
    use cdp_adapter::AnchorDescriptor;

    fn login_stage() -> StageDefinition {
        StageDefinition::new(
            "login",
            ActionSpec::fill(AnchorDescriptor::css("#userName1"), InputValue::input("username")),
        )
        .probe(Probe::url(
            "left-login",
            UrlPredicate::NotContains("/Login".into()),
            20_000,
        ))
        .checkpoint("after-submit")
    }

    #[test]
    fn valid_stage_passes() {
        assert!(login_stage().validate().is_ok());
    }

    #[test]
    fn stage_validation_errors() {
        let no_probes = StageDefinition::new("x", ActionSpec::navigate("https://a.test"));
        assert!(matches!(no_probes.validate(), Err(FlowError::InvalidStage { .. })));

        let only_reject = StageDefinition::new("x", ActionSpec::navigate("https://a.test"))
            .probe(Probe::visible("banner", AnchorDescriptor::css(".alert"), 1000).reject());
        assert!(only_reject.validate().is_err());

        let duplicate = login_stage().probe(Probe::network_quiet("left-login", 500, 1000));
        let err = duplicate.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate probe id"));

        let bad_regex = login_stage().probe(Probe::url(
            "upload",
            UrlPredicate::Matches("(".into()),
            1000,
        ));
        assert!(bad_regex.validate().is_err());

        let empty_fallback = login_stage().fallback(ActionSpec::first_of(vec![]));
        assert!(empty_fallback.validate().is_err());

        assert!(login_stage().stage_timeout_ms(0).validate().is_err());

        let unnamed = StageDefinition { name: " ".into(), ..login_stage() };
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn result_wire_format() {
        let stages = vec![StageOutcome::failure(
            "login",
            FailureReason::ActionNotPerformed,
            None,
            Duration::from_millis(15_020),
            vec![StageState::Pending, StageState::Acting, StageState::Failed],
        )];
        let result = WorkflowResult::from_outcomes(
            RunId("run-1".into()),
            stages,
            BTreeMap::new(),
            Duration::from_millis(15_100),
        );
        assert!(!result.succeeded);
        assert_eq!(result.halted_at_stage, Some(0));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["haltedAtStage"], 0);
        assert_eq!(json["stages"][0]["failureReason"], "action-not-performed");
        assert_eq!(json["stages"][0]["elapsedMs"], 15_020);
        assert_eq!(json["artifacts"], serde_json::json!({}));
    }

    #[test]
    fn successful_result_has_null_halt() {
        let result = WorkflowResult::from_outcomes(
            RunId::new(),
            vec![StageOutcome::skipped("cookie-dismiss", Duration::ZERO, "banner absent")],
            BTreeMap::new(),
            Duration::ZERO,
        );
        assert!(result.succeeded);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["haltedAtStage"].is_null());
        assert_eq!(
            FailureReason::FallbackExhausted.as_str(),
            serde_json::to_value(FailureReason::FallbackExhausted).unwrap()
        );
    }
}

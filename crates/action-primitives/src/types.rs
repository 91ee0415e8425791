//! Core data types for action execution

use cdp_adapter::AnchorDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ActionError;

/// Built-in settle tiers applied right after an action is performed
///
/// - None: No waiting (fills, synthetic events)
/// - DomReady: Wait for a document body to be present (clicks, selects)
/// - Idle: DomReady plus a quiet network window (navigation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitTier {
    /// No built-in waiting
    None,

    /// Wait for the document to be attached
    DomReady,

    /// Wait for page idle (DOM ready + network quiet)
    Idle,
}

impl Default for WaitTier {
    fn default() -> Self {
        WaitTier::DomReady
    }
}

/// A value handed to an action, either inline or looked up from the run's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
    Literal(String),
    Input { key: String, secret: bool },
}

impl InputValue {
    pub fn literal(value: impl Into<String>) -> Self {
        InputValue::Literal(value.into())
    }

    pub fn input(key: impl Into<String>) -> Self {
        InputValue::Input {
            key: key.into(),
            secret: false,
        }
    }

    /// An input that must never appear in logs or reports.
    pub fn secret(key: impl Into<String>) -> Self {
        InputValue::Input {
            key: key.into(),
            secret: true,
        }
    }

    /// Resolve against the run's inputs. Missing or blank inputs are invalid.
    pub fn resolve(&self, inputs: &WorkflowInputs) -> Result<String, ActionError> {
        match self {
            InputValue::Literal(value) => Ok(value.clone()),
            InputValue::Input { key, .. } => match inputs.get(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
                Some(_) => Err(ActionError::InvalidInput(format!("input '{}' is blank", key))),
                None => Err(ActionError::InvalidInput(format!("input '{}' is missing", key))),
            },
        }
    }
}

/// Log-safe rendering: literals are shown, inputs only by key.
impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Literal(value) => write!(f, "'{}'", value),
            InputValue::Input { key, secret: true } => write!(f, "${{{}}}(redacted)", key),
            InputValue::Input { key, secret: false } => write!(f, "${{{}}}", key),
        }
    }
}

/// Caller-provided values (credentials, provider target) for one run.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WorkflowInputs {
    values: BTreeMap<String, String>,
}

impl WorkflowInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

// Values are never printed; inputs carry credentials.
impl fmt::Debug for WorkflowInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// The mutating action a stage performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Navigate {
        url: String,
    },
    Fill {
        anchor: AnchorDescriptor,
        value: InputValue,
    },
    Click {
        anchor: AnchorDescriptor,
    },
    /// Pick an option with the two-tier matcher against `target`.
    SelectOption {
        anchor: AnchorDescriptor,
        target: InputValue,
    },
    /// Fire synthetic `input` + `change` events.
    DispatchChange {
        anchor: AnchorDescriptor,
    },
    /// Force the element out of the layout.
    Hide {
        anchor: AnchorDescriptor,
    },
    /// Only wait for the page to reach `tier`. Always performs; a timeout becomes a note.
    Settle {
        tier: WaitTier,
    },
    /// Every step must perform; stops at the first one that does not.
    Sequence {
        steps: Vec<ActionSpec>,
    },
    /// The first alternative that performs wins. Alternatives do not wait for their target.
    FirstOf {
        alternatives: Vec<ActionSpec>,
    },
}

impl ActionSpec {
    pub fn navigate(url: impl Into<String>) -> Self {
        ActionSpec::Navigate { url: url.into() }
    }

    pub fn fill(anchor: AnchorDescriptor, value: InputValue) -> Self {
        ActionSpec::Fill { anchor, value }
    }

    pub fn click(anchor: AnchorDescriptor) -> Self {
        ActionSpec::Click { anchor }
    }

    pub fn select_option(anchor: AnchorDescriptor, target: InputValue) -> Self {
        ActionSpec::SelectOption { anchor, target }
    }

    pub fn dispatch_change(anchor: AnchorDescriptor) -> Self {
        ActionSpec::DispatchChange { anchor }
    }

    pub fn hide(anchor: AnchorDescriptor) -> Self {
        ActionSpec::Hide { anchor }
    }

    pub fn settle(tier: WaitTier) -> Self {
        ActionSpec::Settle { tier }
    }

    pub fn sequence(steps: Vec<ActionSpec>) -> Self {
        ActionSpec::Sequence { steps }
    }

    pub fn first_of(alternatives: Vec<ActionSpec>) -> Self {
        ActionSpec::FirstOf { alternatives }
    }

    /// Settle tier applied after this action performs.
    pub fn wait_tier(&self) -> WaitTier {
        match self {
            ActionSpec::Navigate { .. } => WaitTier::Idle,
            ActionSpec::Click { .. } | ActionSpec::SelectOption { .. } => WaitTier::DomReady,
            ActionSpec::Fill { .. }
            | ActionSpec::DispatchChange { .. }
            | ActionSpec::Hide { .. }
            | ActionSpec::Settle { .. }
            | ActionSpec::Sequence { .. }
            | ActionSpec::FirstOf { .. } => WaitTier::None,
        }
    }

    /// Structural problems that make the action unusable, if any.
    pub fn structural_error(&self) -> Option<String> {
        match self {
            ActionSpec::Navigate { url } if url.trim().is_empty() => {
                Some("navigate action has an empty url".to_string())
            }
            ActionSpec::Navigate { .. } | ActionSpec::Settle { .. } => None,
            ActionSpec::Fill { anchor, .. }
            | ActionSpec::Click { anchor }
            | ActionSpec::SelectOption { anchor, .. }
            | ActionSpec::DispatchChange { anchor }
            | ActionSpec::Hide { anchor } => {
                if anchor.is_well_formed() {
                    None
                } else {
                    Some(format!("action targets a blank anchor ({})", anchor))
                }
            }
            ActionSpec::Sequence { steps } if steps.is_empty() => {
                Some("sequence action has no steps".to_string())
            }
            ActionSpec::FirstOf { alternatives } if alternatives.is_empty() => {
                Some("first-of action has no alternatives".to_string())
            }
            ActionSpec::Sequence { steps: children }
            | ActionSpec::FirstOf {
                alternatives: children,
            } => children.iter().find_map(ActionSpec::structural_error),
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSpec::Navigate { url } => write!(f, "navigate({})", url),
            ActionSpec::Fill { anchor, value } => write!(f, "fill({}, {})", anchor, value),
            ActionSpec::Click { anchor } => write!(f, "click({})", anchor),
            ActionSpec::SelectOption { anchor, target } => {
                write!(f, "select({}, {})", anchor, target)
            }
            ActionSpec::DispatchChange { anchor } => write!(f, "dispatch_change({})", anchor),
            ActionSpec::Hide { anchor } => write!(f, "hide({})", anchor),
            ActionSpec::Settle { tier } => write!(f, "settle({:?})", tier),
            ActionSpec::Sequence { steps } => write!(f, "sequence[{}]", steps.len()),
            ActionSpec::FirstOf { alternatives } => write!(f, "first_of[{}]", alternatives.len()),
        }
    }
}

/// Why an action was not performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionFailureKind {
    TargetNotFound,
    NotInteractable,
    Transport,
    InvalidInput,
}

/// Action execution report
///
/// `performed` says whether the action physically happened, not whether the page reacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub performed: bool,

    pub failure: Option<ActionFailureKind>,

    /// Human-readable detail (failure message, selected option, settle warning)
    pub detail: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    pub latency_ms: u64,
}

impl ActionReport {
    pub fn success(started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            performed: true,
            failure: None,
            detail: None,
            started_at,
            latency_ms,
        }
    }

    pub fn failure(started_at: DateTime<Utc>, latency_ms: u64, error: &ActionError) -> Self {
        Self {
            performed: false,
            failure: Some(error.failure_kind()),
            detail: Some(error.to_string()),
            started_at,
            latency_ms,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_inputs_are_redacted() {
        let spec = ActionSpec::fill(
            AnchorDescriptor::css("#userPassword1"),
            InputValue::secret("password"),
        );
        assert_eq!(spec.to_string(), "fill(css:#userPassword1, ${password}(redacted))");

        let inputs = WorkflowInputs::new().with("password", "hunter2");
        assert!(!format!("{:?}", inputs).contains("hunter2"));
        assert_eq!(InputValue::secret("password").resolve(&inputs).unwrap(), "hunter2");
    }

    #[test]
    fn blank_or_missing_inputs_are_invalid() {
        let inputs = WorkflowInputs::new().with("username", "  ");
        let blank = InputValue::input("username").resolve(&inputs).unwrap_err();
        assert!(matches!(blank, ActionError::InvalidInput(_)));
        let missing = InputValue::input("provider").resolve(&inputs).unwrap_err();
        assert_eq!(missing.failure_kind(), ActionFailureKind::InvalidInput);
    }

    #[test]
    fn structural_errors_reach_nested_steps() {
        let ok = ActionSpec::sequence(vec![
            ActionSpec::navigate("https://example.test"),
            ActionSpec::click(AnchorDescriptor::css("button")),
        ]);
        assert!(ok.structural_error().is_none());

        let nested = ActionSpec::sequence(vec![ActionSpec::first_of(vec![])]);
        assert!(nested.structural_error().is_some());
        assert!(ActionSpec::navigate(" ").structural_error().is_some());
    }

    #[test]
    fn wait_tier_defaults() {
        assert_eq!(WaitTier::default(), WaitTier::DomReady);
        assert_eq!(ActionSpec::navigate("https://a.test").wait_tier(), WaitTier::Idle);
        assert_eq!(
            ActionSpec::hide(AnchorDescriptor::css("#cookiebar-adm")).wait_tier(),
            WaitTier::None
        );
        let settle = ActionSpec::settle(WaitTier::DomReady);
        assert_eq!(settle.wait_tier(), WaitTier::None);
        assert!(settle.structural_error().is_none());
        assert_eq!(settle.to_string(), "settle(DomReady)");
    }

    #[test]
    fn failure_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ActionFailureKind::TargetNotFound).unwrap();
        assert_eq!(json, "\"target-not-found\"");
    }
}

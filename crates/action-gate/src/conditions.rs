//! Signals a probe can watch for

use cdp_adapter::AnchorDescriptor;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Probe kinds
///
/// Five signal types, each sampled from the live session:
/// visibility, url-pattern, network-quiescence, value-change, element-count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    /// Element present and rendered, or gone / not rendered
    Visibility {
        anchor: AnchorDescriptor,
        state: VisibilityState,
    },

    /// Current URL satisfies a predicate
    UrlPattern { predicate: UrlPredicate },

    /// No request in flight for a continuous window. With `require_activity` the window
    /// only opens after at least one request was seen in flight, so a page that never
    /// reacted to the action does not pass.
    NetworkQuiescence {
        quiet_ms: u64,
        #[serde(default)]
        require_activity: bool,
    },

    /// Element value differs from the one captured before the action
    ValueChange { anchor: AnchorDescriptor },

    /// More elements match than before the action (zero to nonzero in the usual case)
    ElementCount { anchor: AnchorDescriptor },
}

impl ProbeKind {
    /// Whether evaluation needs a baseline captured before the action.
    pub fn needs_baseline(&self) -> bool {
        matches!(
            self,
            ProbeKind::ValueChange { .. } | ProbeKind::ElementCount { .. }
        )
    }

    pub fn anchor(&self) -> Option<&AnchorDescriptor> {
        match self {
            ProbeKind::Visibility { anchor, .. }
            | ProbeKind::ValueChange { anchor }
            | ProbeKind::ElementCount { anchor } => Some(anchor),
            ProbeKind::UrlPattern { .. } | ProbeKind::NetworkQuiescence { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    Visible,
    /// Detached, or attached but not rendered
    Hidden,
}

/// URL predicate types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPredicate {
    Contains(String),
    NotContains(String),
    /// Regular expression, tested anywhere in the URL
    Matches(String),
}

impl UrlPredicate {
    pub fn compile(&self) -> Result<CompiledUrlPredicate, regex::Error> {
        Ok(match self {
            UrlPredicate::Contains(fragment) => CompiledUrlPredicate::Contains(fragment.clone()),
            UrlPredicate::NotContains(fragment) => {
                CompiledUrlPredicate::NotContains(fragment.clone())
            }
            UrlPredicate::Matches(pattern) => CompiledUrlPredicate::Matches(Regex::new(pattern)?),
        })
    }
}

#[derive(Debug, Clone)]
pub enum CompiledUrlPredicate {
    Contains(String),
    NotContains(String),
    Matches(Regex),
}

impl CompiledUrlPredicate {
    pub fn test(&self, url: &str) -> bool {
        match self {
            CompiledUrlPredicate::Contains(fragment) => url.contains(fragment.as_str()),
            CompiledUrlPredicate::NotContains(fragment) => !url.contains(fragment.as_str()),
            CompiledUrlPredicate::Matches(regex) => regex.is_match(url),
        }
    }
}

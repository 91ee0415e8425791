//! Element targeting descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a probe or action locates its element(s).
///
/// - `Css`: a plain CSS selector (`document.querySelectorAll`).
/// - `Text`: elements matching `scope` whose trimmed text contains `content`
///   (case-insensitive), the CSS-only replacement for `:has-text(...)` locators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorDescriptor {
    Css(String),
    Text { scope: String, content: String },
}

impl AnchorDescriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        AnchorDescriptor::Css(selector.into())
    }

    pub fn text(scope: impl Into<String>, content: impl Into<String>) -> Self {
        AnchorDescriptor::Text {
            scope: scope.into(),
            content: content.into(),
        }
    }

    /// A JS expression evaluating to the array of matched elements.
    pub fn to_js_query(&self) -> String {
        match self {
            AnchorDescriptor::Css(selector) => format!(
                "Array.from(document.querySelectorAll({}))",
                js_literal(selector)
            ),
            AnchorDescriptor::Text { scope, content } => format!(
                "Array.from(document.querySelectorAll({scope})).filter(el => ((el.innerText || el.textContent || '').trim().toLowerCase()).includes({needle}.toLowerCase()))",
                scope = js_literal(scope),
                needle = js_literal(content),
            ),
        }
    }

    /// Whether the descriptor can be turned into a query at all.
    pub fn is_well_formed(&self) -> bool {
        match self {
            AnchorDescriptor::Css(selector) => !selector.trim().is_empty(),
            AnchorDescriptor::Text { scope, content } => {
                !scope.trim().is_empty() && !content.trim().is_empty()
            }
        }
    }
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorDescriptor::Css(selector) => write!(f, "css:{}", selector),
            AnchorDescriptor::Text { scope, content } => {
                write!(f, "text:{}:'{}'", scope, content)
            }
        }
    }
}

pub(crate) fn js_literal(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

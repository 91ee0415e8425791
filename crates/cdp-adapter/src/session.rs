//! The session capability trait consumed by actions and probes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::anchor::AnchorDescriptor;
use crate::error::AdapterError;

/// Snapshot of the first element matched by an anchor, plus the match count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub count: u32,
    /// Present and rendered (non-zero box, not `display:none` / `visibility:hidden`).
    pub visible: bool,
    pub enabled: bool,
    pub value: Option<String>,
    pub text: Option<String>,
}

impl ElementState {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.count > 0
    }
}

/// One `<option>` of a select control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptionEntry {
    pub value: String,
    pub label: String,
}

impl SelectOptionEntry {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// How an option is picked once matching has chosen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionChoice {
    Value(String),
    Label(String),
}

/// A live, stateful browser session owned by exactly one workflow run.
///
/// Implementations must be safe to sample concurrently from several probes on the same task;
/// only one stage mutates the session at any time.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError>;

    async fn current_url(&self) -> Result<String, AdapterError>;

    /// Document title; empty when the page has none.
    async fn title(&self) -> Result<String, AdapterError>;

    async fn inspect(&self, anchor: &AnchorDescriptor) -> Result<ElementState, AdapterError>;

    async fn fill(&self, anchor: &AnchorDescriptor, value: &str) -> Result<(), AdapterError>;

    async fn click(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError>;

    async fn list_options(
        &self,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<SelectOptionEntry>, AdapterError>;

    async fn select_option(
        &self,
        anchor: &AnchorDescriptor,
        choice: &OptionChoice,
    ) -> Result<(), AdapterError>;

    /// Fire synthetic `input` + `change` events on the element.
    async fn dispatch_change(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError>;

    /// Force the element out of the layout (`display: none`).
    async fn hide(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError>;

    /// Number of network requests currently in flight.
    async fn inflight_requests(&self) -> Result<u32, AdapterError>;

    /// PNG snapshot of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError>;

    /// Tear the session down. Called exactly once per workflow run.
    async fn close(&self) -> Result<(), AdapterError>;
}

/// Opens fresh, isolated sessions; one per workflow run.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError>;
}

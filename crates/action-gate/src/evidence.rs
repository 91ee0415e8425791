//! Baseline snapshots taken strictly before a stage's action

use crate::conditions::ProbeKind;
use crate::errors::ProbeError;
use crate::types::Probe;
use cdp_adapter::BrowserSession;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// What change-detection probes compare against, keyed by probe id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    values: HashMap<String, Option<String>>,
    counts: HashMap<String, u32>,
}

impl Baseline {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sample every probe that needs a baseline.
    ///
    /// An element that cannot be inspected yet is recorded as absent; only a lost session fails.
    pub async fn capture(
        session: &dyn BrowserSession,
        probes: &[Probe],
    ) -> Result<Self, ProbeError> {
        let mut baseline = Baseline::default();
        for probe in probes.iter().filter(|probe| probe.kind.needs_baseline()) {
            let state = match probe.kind.anchor() {
                Some(anchor) => match session.inspect(anchor).await {
                    Ok(state) => state,
                    Err(err) if err.is_session_lost() => {
                        return Err(ProbeError::SessionLost(err.to_string()))
                    }
                    Err(err) => {
                        debug!(probe = %probe.id, error = %err, "baseline sample failed");
                        Default::default()
                    }
                },
                None => continue,
            };
            match &probe.kind {
                ProbeKind::ValueChange { .. } => {
                    baseline
                        .values
                        .insert(probe.id.clone(), observed_value(&state));
                }
                ProbeKind::ElementCount { .. } => {
                    baseline.counts.insert(probe.id.clone(), state.count);
                }
                _ => {}
            }
        }
        Ok(baseline)
    }

    pub fn with_value(mut self, probe_id: impl Into<String>, value: Option<String>) -> Self {
        self.values.insert(probe_id.into(), value);
        self
    }

    pub fn with_count(mut self, probe_id: impl Into<String>, count: u32) -> Self {
        self.counts.insert(probe_id.into(), count);
        self
    }

    pub fn value(&self, probe_id: &str) -> Option<&str> {
        self.values.get(probe_id).and_then(|value| value.as_deref())
    }

    /// Missing entries count as zero elements.
    pub fn count(&self, probe_id: &str) -> u32 {
        self.counts.get(probe_id).copied().unwrap_or(0)
    }
}

/// The value a change-detection probe watches: form value, else text content.
pub(crate) fn observed_value(state: &cdp_adapter::ElementState) -> Option<String> {
    if !state.is_present() {
        return None;
    }
    state.value.clone().or_else(|| state.text.clone())
}

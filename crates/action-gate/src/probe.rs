//! Probe evaluation: sample until matched or the probe's own timeout elapses.

use cdp_adapter::{AdapterError, BrowserSession};
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::conditions::{CompiledUrlPredicate, ProbeKind, VisibilityState};
use crate::errors::ProbeError;
use crate::evidence::{observed_value, Baseline};
use crate::types::{Probe, ProbeVerdict};

/// Per-evaluation state carried between samples.
#[derive(Default)]
struct SampleState {
    compiled_url: Option<CompiledUrlPredicate>,
    quiet_since: Option<Instant>,
    seen_activity: bool,
}

impl Probe {
    /// Poll until matched or timed out. Never blocks longer than `timeout_ms`.
    ///
    /// Transient adapter failures count as "not matched yet"; only a lost session is an error.
    pub async fn evaluate(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
    ) -> Result<ProbeVerdict, ProbeError> {
        let start = Instant::now();
        let mut state = self.prepare()?;
        let polling = async {
            loop {
                match self.sample(session, baseline, &mut state).await {
                    Ok(Some(evidence)) => {
                        debug!(probe = %self.id, evidence = %evidence, "probe matched");
                        return Ok(ProbeVerdict::matched(self, evidence, start.elapsed()));
                    }
                    Ok(None) => {}
                    Err(err) if err.is_session_lost() => {
                        return Err(ProbeError::SessionLost(err.to_string()));
                    }
                    Err(err) => debug!(probe = %self.id, error = %err, "probe sample failed"),
                }
                sleep(self.poll_interval()).await;
            }
        };

        match timeout(self.timeout(), polling).await {
            Ok(result) => result,
            Err(_) => {
                debug!(probe = %self.id, timeout_ms = self.timeout_ms, "probe timed out");
                Ok(ProbeVerdict::timed_out(self, start.elapsed()))
            }
        }
    }

    /// Take a single sample right now.
    ///
    /// Network quiescence can only match here when its quiet window is zero and it does not
    /// require prior activity.
    pub async fn sample_once(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
    ) -> Result<Option<String>, ProbeError> {
        let mut state = self.prepare()?;
        match self.sample(session, baseline, &mut state).await {
            Ok(evidence) => Ok(evidence),
            Err(err) if err.is_session_lost() => Err(ProbeError::SessionLost(err.to_string())),
            Err(err) => {
                debug!(probe = %self.id, error = %err, "probe sample failed");
                Ok(None)
            }
        }
    }

    fn prepare(&self) -> Result<SampleState, ProbeError> {
        let mut state = SampleState::default();
        if let ProbeKind::UrlPattern { predicate } = &self.kind {
            let compiled = predicate
                .compile()
                .map_err(|err| ProbeError::invalid(&self.id, err.to_string()))?;
            state.compiled_url = Some(compiled);
        }
        Ok(state)
    }

    async fn sample(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
        state: &mut SampleState,
    ) -> Result<Option<String>, AdapterError> {
        match &self.kind {
            ProbeKind::Visibility {
                anchor,
                state: wanted,
            } => {
                let element = session.inspect(anchor).await?;
                let shown = element.is_present() && element.visible;
                Ok(match wanted {
                    VisibilityState::Visible if shown => Some(match excerpt(&element.text) {
                        Some(text) => format!("{} visible: {}", anchor, text),
                        None => format!("{} visible", anchor),
                    }),
                    VisibilityState::Hidden if !shown => Some(format!("{} hidden", anchor)),
                    _ => None,
                })
            }
            ProbeKind::UrlPattern { .. } => {
                let url = session.current_url().await?;
                let matched = state
                    .compiled_url
                    .as_ref()
                    .map(|predicate| predicate.test(&url))
                    .unwrap_or(false);
                Ok(matched.then(|| format!("url {}", url)))
            }
            ProbeKind::NetworkQuiescence {
                quiet_ms,
                require_activity,
            } => {
                let now = Instant::now();
                if session.inflight_requests().await? > 0 {
                    state.seen_activity = true;
                    state.quiet_since = None;
                    return Ok(None);
                }
                if *require_activity && !state.seen_activity {
                    return Ok(None);
                }
                let since = *state.quiet_since.get_or_insert(now);
                let quiet_for = now.duration_since(since).as_millis() as u64;
                if quiet_for < *quiet_ms {
                    return Ok(None);
                }
                Ok(Some(if *require_activity {
                    format!("network settled for {quiet_for}ms after activity")
                } else {
                    format!("network quiet for {quiet_for}ms")
                }))
            }
            ProbeKind::ValueChange { anchor } => {
                let element = session.inspect(anchor).await?;
                let before = baseline.value(&self.id);
                Ok(match observed_value(&element) {
                    Some(current) if Some(current.as_str()) != before => Some(format!(
                        "{} changed from {:?} to {:?}",
                        anchor, before, current
                    )),
                    _ => None,
                })
            }
            ProbeKind::ElementCount { anchor } => {
                let element = session.inspect(anchor).await?;
                let before = baseline.count(&self.id);
                Ok((element.count > before)
                    .then(|| format!("{} count {} -> {}", anchor, before, element.count)))
            }
        }
    }
}

const EVIDENCE_TEXT_LIMIT: usize = 200;

fn excerpt(text: &Option<String>) -> Option<String> {
    let text = text.as_deref()?.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(EVIDENCE_TEXT_LIMIT).collect())
}

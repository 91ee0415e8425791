//! First-match-wins race over a stage's probes.

use std::time::Duration;

use cdp_adapter::BrowserSession;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::errors::ProbeError;
use crate::evidence::Baseline;
use crate::types::{Probe, ProbeRole, ProbeVerdict};

/// How a race ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RaceOutcome {
    /// A ready probe matched and no reject probe vetoed it.
    Ready { verdict: ProbeVerdict },
    /// A reject probe matched, either by winning or by vetoing a ready winner.
    Rejected {
        verdict: ProbeVerdict,
        /// The ready probe that was vetoed, if any.
        vetoed: Option<String>,
    },
    /// Every probe finished unmatched, or the race cap elapsed.
    Exhausted { verdicts: Vec<ProbeVerdict> },
}

impl RaceOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, RaceOutcome::Ready { .. })
    }
}

/// Runs probes concurrently as independent suspension points on the calling task.
pub struct ProbeRace<'a> {
    probes: &'a [Probe],
    cap: Option<Duration>,
}

impl<'a> ProbeRace<'a> {
    pub fn new(probes: &'a [Probe]) -> Self {
        Self { probes, cap: None }
    }

    /// Overall bound for the race, on top of each probe's own timeout.
    pub fn with_cap(mut self, cap: Option<Duration>) -> Self {
        self.cap = cap;
        self
    }

    /// Resolve on the first match; exhausted only once every probe gave up.
    ///
    /// When a ready probe wins, every reject probe is sampled once immediately and a current
    /// reject match overrides the success.
    pub async fn run(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
    ) -> Result<RaceOutcome, ProbeError> {
        let started = Instant::now();
        let mut verdicts = Vec::with_capacity(self.probes.len());
        let racing = self.race(session, baseline, &mut verdicts);

        let outcome = match self.cap {
            Some(cap) => match timeout(cap, racing).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(cap_ms = cap.as_millis() as u64, "race cap elapsed");
                    None
                }
            },
            None => racing.await?,
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => RaceOutcome::Exhausted { verdicts },
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = outcome_label(&outcome),
            "probe race finished"
        );
        Ok(outcome)
    }

    async fn race(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
        verdicts: &mut Vec<ProbeVerdict>,
    ) -> Result<Option<RaceOutcome>, ProbeError> {
        let mut pending: FuturesUnordered<BoxFuture<'_, Result<ProbeVerdict, ProbeError>>> =
            self.probes
                .iter()
                .map(|probe| probe.evaluate(session, baseline).boxed())
                .collect();

        while let Some(result) = pending.next().await {
            let verdict = result?;
            if !verdict.matched {
                verdicts.push(verdict);
                continue;
            }
            return Ok(Some(match verdict.role {
                ProbeRole::Reject => RaceOutcome::Rejected {
                    verdict,
                    vetoed: None,
                },
                ProbeRole::Ready => match self.veto(session, baseline).await? {
                    Some(reject) => RaceOutcome::Rejected {
                        verdict: reject,
                        vetoed: Some(verdict.probe_id),
                    },
                    None => RaceOutcome::Ready { verdict },
                },
            }));
        }
        Ok(None)
    }

    async fn veto(
        &self,
        session: &dyn BrowserSession,
        baseline: &Baseline,
    ) -> Result<Option<ProbeVerdict>, ProbeError> {
        for probe in self.probes.iter().filter(|probe| probe.is_reject()) {
            let started = Instant::now();
            if let Some(evidence) = probe.sample_once(session, baseline).await? {
                debug!(probe = %probe.id, "reject probe vetoed ready signal");
                return Ok(Some(ProbeVerdict::matched(probe, evidence, started.elapsed())));
            }
        }
        Ok(None)
    }
}

fn outcome_label(outcome: &RaceOutcome) -> &'static str {
    match outcome {
        RaceOutcome::Ready { .. } => "ready",
        RaceOutcome::Rejected { .. } => "rejected",
        RaceOutcome::Exhausted { .. } => "exhausted",
    }
}

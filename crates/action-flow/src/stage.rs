//! The per-stage state machine.
//!
//! Pending -> Acting -> Racing -> (Success | FallbackActing -> FallbackRacing -> (Success | Failed))
//!
//! A stage never retries beyond its single fallback cycle.

use action_gate::{Baseline, ProbeError, ProbeRace, RaceOutcome};
use action_primitives::{ActionExecutor, ActionReport, WorkflowInputs};
use cdp_adapter::BrowserSession;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::types::{FailureReason, StageDefinition, StageOutcome, StageState};

pub(crate) struct StageMachine<'a> {
    definition: &'a StageDefinition,
    session: &'a dyn BrowserSession,
    executor: &'a dyn ActionExecutor,
    inputs: &'a WorkflowInputs,
    started: Instant,
    trace: Vec<StageState>,
    action_detail: Option<String>,
}

impl<'a> StageMachine<'a> {
    pub(crate) fn new(
        definition: &'a StageDefinition,
        session: &'a dyn BrowserSession,
        executor: &'a dyn ActionExecutor,
        inputs: &'a WorkflowInputs,
    ) -> Self {
        Self {
            definition,
            session,
            executor,
            inputs,
            started: Instant::now(),
            trace: vec![StageState::Pending],
            action_detail: None,
        }
    }

    fn enter(&mut self, state: StageState) {
        debug!(stage = %self.definition.name, ?state, "stage transition");
        self.trace.push(state);
    }

    fn fail(mut self, reason: FailureReason, detail: Option<String>) -> StageOutcome {
        self.enter(StageState::Failed);
        StageOutcome::failure(
            self.definition.name.clone(),
            reason,
            detail,
            self.started.elapsed(),
            self.trace,
        )
        .with_action_detail(self.action_detail)
    }

    fn session_lost(self, detail: String) -> StageOutcome {
        self.fail(FailureReason::SessionLost, Some(detail))
    }

    /// Whether the precondition (if any) holds. `Err` carries a session-lost outcome.
    pub(crate) async fn precondition_holds(&self) -> Result<bool, ProbeError> {
        match &self.definition.precondition {
            None => Ok(true),
            Some(probe) => {
                let verdict = probe.evaluate(self.session, &Baseline::empty()).await?;
                Ok(verdict.matched)
            }
        }
    }

    pub(crate) fn skip(self) -> StageOutcome {
        info!(stage = %self.definition.name, "precondition not met, skipping stage");
        StageOutcome::skipped(
            self.definition.name.clone(),
            self.started.elapsed(),
            "precondition not met",
        )
    }

    /// Drive the stage to a terminal state. Never fails; every failure is an outcome.
    pub(crate) async fn run(mut self) -> StageOutcome {
        let definition = self.definition;
        let session = self.session;
        info!(stage = %definition.name, action = %definition.action, "stage started");

        match self.precondition_holds().await {
            Ok(true) => {}
            Ok(false) => return self.skip(),
            Err(err) => return self.session_lost(err.to_string()),
        }

        let baseline = match Baseline::capture(session, &definition.probes).await {
            Ok(baseline) => baseline,
            Err(err) => return self.session_lost(err.to_string()),
        };

        self.enter(StageState::Acting);
        let report = match self.executor.perform(session, &definition.action, self.inputs).await {
            Ok(report) => report,
            Err(err) => return self.session_lost(err.to_string()),
        };
        if !report.performed {
            return self.fail(FailureReason::ActionNotPerformed, report.detail);
        }
        self.action_detail = report.detail;

        self.enter(StageState::Racing);
        let race = ProbeRace::new(&definition.probes).with_cap(definition.stage_timeout());
        let first = match race.run(session, &baseline).await {
            Ok(outcome) => outcome,
            Err(err) => return self.session_lost(err.to_string()),
        };

        match first {
            RaceOutcome::Ready { verdict } => {
                return self.succeed(verdict.probe_id, verdict.evidence, false)
            }
            RaceOutcome::Rejected { verdict, .. } => {
                return self.fail(FailureReason::RejectedBySignal, verdict.evidence)
            }
            RaceOutcome::Exhausted { .. } => {}
        }

        let fallback = match &definition.fallback {
            Some(fallback) => fallback,
            None => {
                warn!(stage = %definition.name, "no readiness signal");
                return self.fail(
                    FailureReason::NoReadinessSignal,
                    Some(format!("{} probes timed out", definition.probes.len())),
                );
            }
        };

        self.enter(StageState::FallbackActing);
        warn!(stage = %definition.name, fallback = %fallback, "race timed out, running fallback");
        match self.executor.perform(session, fallback, self.inputs).await {
            Ok(ActionReport {
                performed: false,
                detail,
                ..
            }) => {
                debug!(stage = %definition.name, ?detail, "fallback not performed, re-racing anyway");
            }
            Ok(_) => {}
            Err(err) => {
                return self
                    .session_lost(err.to_string())
                    .with_fallback_attempted(true)
            }
        }

        self.enter(StageState::FallbackRacing);
        let second = match race.run(session, &baseline).await {
            Ok(outcome) => outcome,
            Err(err) => {
                return self
                    .session_lost(err.to_string())
                    .with_fallback_attempted(true)
            }
        };

        let outcome = match second {
            RaceOutcome::Ready { verdict } => {
                self.succeed(verdict.probe_id, verdict.evidence, true)
            }
            RaceOutcome::Rejected { verdict, .. } => {
                self.fail(FailureReason::RejectedBySignal, verdict.evidence)
            }
            RaceOutcome::Exhausted { .. } => self.fail(
                FailureReason::FallbackExhausted,
                Some("no readiness signal after fallback".to_string()),
            ),
        };
        outcome.with_fallback_attempted(true)
    }

    fn succeed(
        mut self,
        probe_id: String,
        detail: Option<String>,
        fallback_attempted: bool,
    ) -> StageOutcome {
        self.enter(StageState::Success);
        info!(
            stage = %self.definition.name,
            matched_probe = %probe_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "stage succeeded"
        );
        StageOutcome::success(
            self.definition.name.clone(),
            probe_id,
            self.started.elapsed(),
            self.trace,
        )
        .with_detail(detail)
        .with_action_detail(self.action_detail)
        .with_fallback_attempted(fallback_attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_gate::{Probe, UrlPredicate};
    use action_primitives::{ActionSpec, DefaultActionExecutor};
    use action_primitives::InputValue;
    use cdp_adapter::fake::{visible, FakeBrowser, Trigger};
    use cdp_adapter::{AnchorDescriptor, SelectOptionEntry};
    use std::time::Duration;

    const BAR: &str = "#cookiebar-adm";

    fn page() -> FakeBrowser {
        let browser = FakeBrowser::new("https://odv.adm.gov.it/ODV_OHP/");
        browser.set_element(&AnchorDescriptor::css("body"), visible());
        browser
    }

    fn banner_stage(fallback: bool) -> StageDefinition {
        let bar = AnchorDescriptor::css(BAR);
        let stage = StageDefinition::new(
            "cookie-dismiss",
            ActionSpec::click(AnchorDescriptor::css("#cookiebar-adm a")),
        )
        .precondition(Probe::visible("banner-shown", bar.clone(), 3_000))
        .probe(Probe::hidden("banner-gone", bar.clone(), 7_000));
        if fallback {
            stage.fallback(ActionSpec::hide(bar))
        } else {
            stage
        }
    }

    async fn run(definition: &StageDefinition, browser: &FakeBrowser) -> StageOutcome {
        let executor = DefaultActionExecutor::default();
        let session = browser.session();
        let inputs = WorkflowInputs::new();
        StageMachine::new(definition, &session, &executor, &inputs).run().await
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_when_precondition_fails() {
        let browser = page();
        let outcome = run(&banner_stage(true), &browser).await;
        assert!(outcome.succeeded);
        assert!(outcome.skipped);
        assert!(browser.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_banner_without_fallback_has_no_readiness_signal() {
        let browser = page();
        browser.set_element(&AnchorDescriptor::css(BAR), visible());
        browser.set_element(&AnchorDescriptor::css("#cookiebar-adm a"), visible());

        let outcome = run(&banner_stage(false), &browser).await;
        assert_eq!(outcome.failure_reason, Some(FailureReason::NoReadinessSignal));
        assert!(outcome.elapsed_ms >= 7_000);
        assert_eq!(
            outcome.trace,
            vec![
                StageState::Pending,
                StageState::Acting,
                StageState::Racing,
                StageState::Failed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_hides_stuck_banner() {
        let browser = page();
        browser.set_element(&AnchorDescriptor::css(BAR), visible());
        browser.set_element(&AnchorDescriptor::css("#cookiebar-adm a"), visible());

        let outcome = run(&banner_stage(true), &browser).await;
        assert!(outcome.succeeded);
        assert!(outcome.fallback_attempted);
        assert_eq!(outcome.matched_probe.as_deref(), Some("banner-gone"));
        assert_eq!(browser.hidden(), vec![format!("css:{}", BAR)]);
        assert_eq!(outcome.trace.last(), Some(&StageState::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_runs_at_most_once() {
        let browser = page();
        let field = AnchorDescriptor::css("#never-changes");
        browser.set_element(&field, visible());
        let definition = StageDefinition::new("stuck", ActionSpec::click(field.clone()))
            .probe(Probe::value_change("value", field.clone(), 2_000))
            .fallback(ActionSpec::dispatch_change(field));

        let outcome = run(&definition, &browser).await;
        assert_eq!(outcome.failure_reason, Some(FailureReason::FallbackExhausted));
        assert_eq!(browser.dispatches().len(), 1);
        assert_eq!(browser.clicks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_is_action_not_performed() {
        let browser = page();
        let definition = StageDefinition::new(
            "login",
            ActionSpec::click(AnchorDescriptor::css("button.adm-btn-primary")),
        )
        .probe(Probe::url(
            "left-login",
            UrlPredicate::NotContains("/Login".into()),
            20_000,
        ));
        let outcome = run(&definition, &browser).await;
        assert_eq!(outcome.failure_reason, Some(FailureReason::ActionNotPerformed));
        assert!(outcome.detail.unwrap().contains("adm-btn-primary"));
        assert!(!outcome.trace.contains(&StageState::Racing));
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_keeps_action_note_next_to_probe_evidence() {
        let browser = page();
        let select = AnchorDescriptor::css("#formAcqController\\:elencoConc");
        let upload = AnchorDescriptor::css("input[type=file]");
        browser.set_element(&select, visible());
        browser.set_options(
            &select,
            vec![
                SelectOptionEntry::new("IT001", "Acme Energia"),
                SelectOptionEntry::new("IT002", "Beta Gas"),
            ],
        );
        let rendered = upload.clone();
        browser.on(Trigger::select(&select), Duration::from_millis(400), move |page| {
            page.set_element(&rendered, visible())
        });

        let definition = StageDefinition::new(
            "provider-select",
            ActionSpec::select_option(select, InputValue::input("provider")),
        )
        .probe(Probe::visible("upload-control", upload, 5_000));
        let executor = DefaultActionExecutor::default();
        let session = browser.session();
        let inputs = WorkflowInputs::new().with("provider", "beta");
        let outcome = StageMachine::new(&definition, &session, &executor, &inputs)
            .run()
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.matched_probe.as_deref(), Some("upload-control"));
        let action = outcome.action_detail.unwrap();
        assert!(action.contains("Beta Gas") && action.contains("IT002"));
        assert!(!outcome.detail.unwrap().contains("IT002"));
    }

    #[tokio::test(start_paused = true)]
    async fn reject_probe_fails_stage() {
        let browser = FakeBrowser::new("https://iampe.adm.gov.it/sam/UI/Login");
        browser.set_element(&AnchorDescriptor::css("body"), visible());
        let submit = AnchorDescriptor::css("button.adm-btn-primary");
        let banner = AnchorDescriptor::css(".alert-danger");
        browser.set_element(&submit, visible());
        let shown = banner.clone();
        browser.on(Trigger::click(&submit), Duration::from_millis(300), move |page| {
            page.set_element(&shown, visible())
        });

        let definition = StageDefinition::new("login", ActionSpec::click(submit))
            .probe(Probe::url(
                "left-login",
                UrlPredicate::NotContains("/Login".into()),
                20_000,
            ))
            .probe(Probe::visible("error-banner", banner, 20_000).reject())
            .fallback(ActionSpec::navigate("https://example.test"));
        let outcome = run(&definition, &browser).await;
        assert_eq!(outcome.failure_reason, Some(FailureReason::RejectedBySignal));
        assert!(!outcome.fallback_attempted);
        assert!(browser.navigations().is_empty());
    }
}

//! The default action executor.

use async_trait::async_trait;
use cdp_adapter::{AnchorDescriptor, BrowserSession, OptionChoice};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use portalflow_core_types::ActionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    errors::ActionError,
    matching::{match_option, MatchError},
    types::{ActionReport, ActionSpec, WorkflowInputs},
    waiting::{DefaultWaitStrategy, WaitStrategy},
};

/// Performs a stage's action against a live session.
///
/// Every ordinary failure (missing target, hidden element, navigation timeout, bad input) is
/// reported through [`ActionReport::performed`]. The only `Err` is [`ActionError::SessionLost`]:
/// once the session is gone there is nothing meaningful left to report on.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn perform(
        &self,
        session: &dyn BrowserSession,
        spec: &ActionSpec,
        inputs: &WorkflowInputs,
    ) -> Result<ActionReport, ActionError>;
}

/// Timing knobs for [`DefaultActionExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// How long an element-targeting action waits for its target to be attached.
    pub locate_timeout: Duration,
    pub navigation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            locate_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct DefaultActionExecutor {
    settings: ExecutorSettings,
    wait_strategy: Arc<dyn WaitStrategy>,
}

impl Default for DefaultActionExecutor {
    fn default() -> Self {
        Self::new(ExecutorSettings::default(), Arc::new(DefaultWaitStrategy::default()))
    }
}

impl DefaultActionExecutor {
    pub fn new(settings: ExecutorSettings, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        Self {
            settings,
            wait_strategy,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    fn run_step<'a>(
        &'a self,
        session: &'a dyn BrowserSession,
        spec: &'a ActionSpec,
        inputs: &'a WorkflowInputs,
        locate_timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<String>, ActionError>> {
        async move {
            match spec {
                ActionSpec::Sequence { steps } => {
                    let mut notes = Vec::new();
                    for step in steps {
                        if let Some(note) = self.run_step(session, step, inputs, locate_timeout).await? {
                            notes.push(note);
                        }
                    }
                    Ok((!notes.is_empty()).then(|| notes.join("; ")))
                }
                ActionSpec::FirstOf { alternatives } => {
                    let mut last_error = None;
                    for alternative in alternatives {
                        match self.run_step(session, alternative, inputs, Duration::ZERO).await {
                            Ok(note) => {
                                return Ok(Some(match note {
                                    Some(note) => format!("{} ({})", alternative, note),
                                    None => format!("performed {}", alternative),
                                }));
                            }
                            Err(err) if err.is_session_lost() => return Err(err),
                            Err(err) => {
                                debug!(alternative = %alternative, error = %err, "alternative not performed");
                                last_error = Some(err);
                            }
                        }
                    }
                    Err(last_error.unwrap_or_else(|| {
                        ActionError::Internal("first-of action has no alternatives".to_string())
                    }))
                }
                leaf => {
                    let note = self.run_leaf(session, leaf, inputs, locate_timeout).await?;
                    self.settle(session, leaf).await?;
                    Ok(note)
                }
            }
        }
        .boxed()
    }

    async fn run_leaf(
        &self,
        session: &dyn BrowserSession,
        spec: &ActionSpec,
        inputs: &WorkflowInputs,
        locate_timeout: Duration,
    ) -> Result<Option<String>, ActionError> {
        match spec {
            ActionSpec::Navigate { url } => {
                session.navigate(url, self.settings.navigation_timeout).await?;
                Ok(None)
            }
            ActionSpec::Fill { anchor, value } => {
                let resolved = value.resolve(inputs)?;
                self.locate(session, anchor, locate_timeout).await?;
                session.fill(anchor, &resolved).await?;
                Ok(None)
            }
            ActionSpec::Click { anchor } => {
                self.locate(session, anchor, locate_timeout).await?;
                session.click(anchor).await?;
                Ok(None)
            }
            ActionSpec::SelectOption { anchor, target } => {
                let target = target.resolve(inputs)?;
                self.locate(session, anchor, locate_timeout).await?;
                self.select(session, anchor, &target).await.map(Some)
            }
            ActionSpec::DispatchChange { anchor } => {
                self.locate(session, anchor, locate_timeout).await?;
                session.dispatch_change(anchor).await?;
                Ok(None)
            }
            ActionSpec::Hide { anchor } => {
                session.hide(anchor).await?;
                Ok(None)
            }
            ActionSpec::Settle { tier } => match self.wait_strategy.wait(session, *tier).await {
                Ok(()) => Ok(None),
                Err(err) if err.is_session_lost() => Err(err),
                Err(err) => Ok(Some(format!("page not settled: {}", err))),
            },
            ActionSpec::Sequence { .. } | ActionSpec::FirstOf { .. } => Err(ActionError::Internal(
                "composite action reached leaf execution".to_string(),
            )),
        }
    }

    /// Wait for the element to be attached, then require it to be visible and enabled.
    async fn locate(
        &self,
        session: &dyn BrowserSession,
        anchor: &AnchorDescriptor,
        timeout: Duration,
    ) -> Result<(), ActionError> {
        let deadline = Instant::now() + timeout;
        let state = loop {
            let state = session.inspect(anchor).await?;
            if state.is_present() || Instant::now() >= deadline {
                break state;
            }
            sleep(self.settings.poll_interval).await;
        };

        if !state.is_present() {
            return Err(ActionError::AnchorNotFound(format!(
                "{} not attached after {}ms",
                anchor,
                timeout.as_millis()
            )));
        }
        if !state.visible || !state.enabled {
            return Err(ActionError::NotInteractable(format!(
                "{} is {}",
                anchor,
                if state.visible { "disabled" } else { "hidden" }
            )));
        }
        Ok(())
    }

    async fn select(
        &self,
        session: &dyn BrowserSession,
        anchor: &AnchorDescriptor,
        target: &str,
    ) -> Result<String, ActionError> {
        let options = session.list_options(anchor).await?;
        let picked = match_option(&options, target).map_err(|err| match err {
            MatchError::EmptyTarget => ActionError::InvalidInput(err.to_string()),
            MatchError::NoMatch(_) => ActionError::OptionNotFound(format!(
                "{} among {} options of {}",
                err,
                options.len(),
                anchor
            )),
        })?;

        let by_value = session
            .select_option(anchor, &OptionChoice::Value(picked.value.clone()))
            .await;
        match by_value {
            Ok(()) => {}
            Err(err) if err.is_session_lost() => return Err(err.into()),
            Err(err) => {
                debug!(error = %err, "select by value failed, retrying by label");
                session
                    .select_option(anchor, &OptionChoice::Label(picked.label.clone()))
                    .await?;
            }
        }
        Ok(format!("selected '{}' ({})", picked.label, picked.value))
    }

    /// A settle timeout is logged; it never turns a performed action into a failure.
    async fn settle(&self, session: &dyn BrowserSession, spec: &ActionSpec) -> Result<(), ActionError> {
        match self.wait_strategy.wait(session, spec.wait_tier()).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_session_lost() => Err(err),
            Err(err) => {
                warn!(action = %spec, error = %err, "settle wait did not complete");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for DefaultActionExecutor {
    async fn perform(
        &self,
        session: &dyn BrowserSession,
        spec: &ActionSpec,
        inputs: &WorkflowInputs,
    ) -> Result<ActionReport, ActionError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let action_id = ActionId::new();

        info!(action_id = %action_id, action = %spec, "Executing action");

        let outcome = self
            .run_step(session, spec, inputs, self.settings.locate_timeout)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(note) => {
                info!(action_id = %action_id, latency_ms, "Action performed");
                let report = ActionReport::success(started_at, latency_ms);
                Ok(match note {
                    Some(note) => report.with_detail(note),
                    None => report,
                })
            }
            Err(err) if err.is_session_lost() => {
                warn!(action_id = %action_id, error = %err, "Session lost during action");
                Err(err)
            }
            Err(err) => {
                warn!(action_id = %action_id, error = %err, "Action not performed");
                Ok(ActionReport::failure(started_at, latency_ms, &err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionFailureKind, InputValue, WaitTier};
    use cdp_adapter::fake::{hidden, visible, FakeBrowser};
    use cdp_adapter::SelectOptionEntry;

    fn executor() -> DefaultActionExecutor {
        DefaultActionExecutor::default()
    }

    fn login_browser() -> FakeBrowser {
        let browser = FakeBrowser::new("about:blank");
        browser.set_element(&AnchorDescriptor::css("body"), visible());
        browser
    }

    #[tokio::test(start_paused = true)]
    async fn fill_waits_for_target_then_fills() {
        let browser = login_browser();
        let user = AnchorDescriptor::css("#userName1");
        let late = browser.clone();
        let late_user = user.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(800)).await;
            late.set_element(&late_user, visible());
        });

        let inputs = WorkflowInputs::new().with("username", "mario.rossi");
        let report = executor()
            .perform(
                &browser.session(),
                &ActionSpec::fill(user.clone(), InputValue::input("username")),
                &inputs,
            )
            .await
            .unwrap();
        assert!(report.performed);
        assert_eq!(browser.fills(), vec![(user.to_string(), "mario.rossi".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_is_not_performed() {
        let browser = login_browser();
        let started = Instant::now();
        let report = executor()
            .perform(
                &browser.session(),
                &ActionSpec::click(AnchorDescriptor::css("button.adm-btn-primary")),
                &WorkflowInputs::new(),
            )
            .await
            .unwrap();
        assert!(!report.performed);
        assert_eq!(report.failure, Some(ActionFailureKind::TargetNotFound));
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_target_is_not_interactable() {
        let browser = login_browser();
        let button = AnchorDescriptor::css("button.adm-btn-primary");
        browser.set_element(&button, hidden());
        let report = executor()
            .perform(&browser.session(), &ActionSpec::click(button), &WorkflowInputs::new())
            .await
            .unwrap();
        assert_eq!(report.failure, Some(ActionFailureKind::NotInteractable));
        assert!(browser.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_stops_at_first_failure() {
        let browser = login_browser();
        let user = AnchorDescriptor::css("#userName1");
        let button = AnchorDescriptor::css("button.adm-btn-primary");
        browser.set_element(&button, visible());
        let spec = ActionSpec::sequence(vec![
            ActionSpec::fill(user, InputValue::input("username")),
            ActionSpec::click(button),
        ]);
        let report = executor()
            .perform(&browser.session(), &spec, &WorkflowInputs::new())
            .await
            .unwrap();
        assert_eq!(report.failure, Some(ActionFailureKind::InvalidInput));
        assert!(browser.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_of_skips_absent_alternatives_without_waiting() {
        let browser = login_browser();
        let by_text = AnchorDescriptor::text("#cookiebar-adm a", "Close and reject cookies");
        browser.set_element(&by_text, visible());
        let spec = ActionSpec::first_of(vec![
            ActionSpec::click(AnchorDescriptor::css(
                "#cookiebar-adm a[aria-label*=\"Chiudi e rifiuta tutto\"]",
            )),
            ActionSpec::click(by_text.clone()),
        ]);

        let started = Instant::now();
        let report = executor()
            .perform(&browser.session(), &spec, &WorkflowInputs::new())
            .await
            .unwrap();
        assert!(report.performed);
        assert_eq!(browser.clicks(), vec![by_text.to_string()]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn select_uses_two_tier_match() {
        let browser = login_browser();
        let select = AnchorDescriptor::css("#formAcqController\\:elencoConc");
        browser.set_element(&select, visible());
        browser.set_options(
            &select,
            vec![
                SelectOptionEntry::new("", "-- Selezionare --"),
                SelectOptionEntry::new("15215", "SNAITECH S.P.A."),
            ],
        );
        let inputs = WorkflowInputs::new().with("provider", "snaitech");
        let report = executor()
            .perform(
                &browser.session(),
                &ActionSpec::select_option(select, InputValue::input("provider")),
                &inputs,
            )
            .await
            .unwrap();
        assert!(report.performed);
        assert_eq!(browser.selections(), vec!["15215".to_string()]);
        assert!(report.detail.unwrap().contains("SNAITECH"));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_provider_is_target_not_found() {
        let browser = login_browser();
        let select = AnchorDescriptor::css("#formAcqController\\:elencoConc");
        browser.set_element(&select, visible());
        browser.set_options(&select, vec![SelectOptionEntry::new("1", "Lottomatica")]);
        let inputs = WorkflowInputs::new().with("provider", "Sisal");
        let report = executor()
            .perform(
                &browser.session(),
                &ActionSpec::select_option(select, InputValue::input("provider")),
                &inputs,
            )
            .await
            .unwrap();
        assert_eq!(report.failure, Some(ActionFailureKind::TargetNotFound));
        assert!(browser.selections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settle_performs_even_when_the_page_never_renders() {
        let browser = FakeBrowser::new("about:blank");
        let spec = ActionSpec::settle(WaitTier::DomReady);
        let report = executor()
            .perform(&browser.session(), &spec, &WorkflowInputs::new())
            .await
            .unwrap();
        assert!(report.performed);
        assert!(report.detail.unwrap().contains("document not ready"));

        let ready = login_browser();
        let report = executor()
            .perform(&ready.session(), &spec, &WorkflowInputs::new())
            .await
            .unwrap();
        assert!(report.performed);
        assert!(report.detail.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_is_an_error() {
        let browser = login_browser();
        browser.crash();
        let err = executor()
            .perform(
                &browser.session(),
                &ActionSpec::navigate("https://iampe.adm.gov.it/sam/UI/Login"),
                &WorkflowInputs::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_session_lost());
    }
}

//! Workflow runner

use crate::errors::FlowError;
use crate::lease::SessionLease;
use crate::sink::ArtifactSink;
use crate::stage::StageMachine;
use crate::types::*;
use action_primitives::{ActionExecutor, DefaultActionExecutor, WorkflowInputs};
use cdp_adapter::{BrowserSession, SessionFactory};
use futures::FutureExt;
use portalflow_core_types::{CheckpointName, RunId};
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument};

/// Runs an ordered list of stages against one freshly opened session.
///
/// Each `run` opens its own session from the factory, so concurrent runs never share one.
pub struct WorkflowRunner {
    factory: Arc<dyn SessionFactory>,
    executor: Arc<dyn ActionExecutor>,
}

impl WorkflowRunner {
    pub fn new(factory: Arc<dyn SessionFactory>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { factory, executor }
    }

    pub fn with_default_executor(factory: Arc<dyn SessionFactory>) -> Self {
        Self::new(factory, Arc::new(DefaultActionExecutor::default()))
    }

    /// Validate flow structure
    pub fn validate_flow(stages: &[StageDefinition]) -> Result<(), FlowError> {
        if stages.is_empty() {
            return Err(FlowError::EmptyWorkflow);
        }
        let mut names = HashSet::new();
        for stage in stages {
            stage.validate()?;
            if !names.insert(stage.name.trim()) {
                return Err(FlowError::DuplicateStage(stage.name.clone()));
            }
        }
        Ok(())
    }

    /// Execute `stages` in order, stopping at the first failure.
    ///
    /// Only configuration errors are returned as `Err`, before any session is opened. Every
    /// runtime failure, including a panicking session, ends up in the result.
    pub async fn run(
        &self,
        stages: &[StageDefinition],
        inputs: &WorkflowInputs,
        sink: &dyn ArtifactSink,
    ) -> Result<WorkflowResult, FlowError> {
        Self::validate_flow(stages)?;

        let run_id = RunId::new();
        let span = tracing::info_span!("workflow", run_id = %run_id);
        Ok(self.run_validated(run_id, stages, inputs, sink).instrument(span).await)
    }

    async fn run_validated(
        &self,
        run_id: RunId,
        stages: &[StageDefinition],
        inputs: &WorkflowInputs,
        sink: &dyn ArtifactSink,
    ) -> WorkflowResult {
        let started = Instant::now();
        info!(stages = stages.len(), "workflow started");

        let lease = match self.factory.open().await {
            Ok(session) => SessionLease::new(session),
            Err(err) => {
                error!(error = %err, "could not open browser session");
                let first = StageOutcome::failure(
                    stages[0].name.clone(),
                    FailureReason::SessionLost,
                    Some(format!("session could not be opened: {}", err)),
                    Duration::ZERO,
                    vec![StageState::Pending, StageState::Failed],
                );
                return WorkflowResult::from_outcomes(
                    run_id,
                    vec![first],
                    BTreeMap::new(),
                    started.elapsed(),
                );
            }
        };

        let mut outcomes = Vec::with_capacity(stages.len());
        let mut artifacts = BTreeMap::new();
        for (index, definition) in stages.iter().enumerate() {
            let session = lease.session();
            if let Some(name) = &definition.pre_checkpoint {
                capture(session, sink, name, &mut artifacts).await;
            }

            let stage_started = Instant::now();
            let machine = StageMachine::new(definition, session, self.executor.as_ref(), inputs);
            let outcome = match AssertUnwindSafe(machine.run()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(stage = %definition.name, panic = %message, "session panicked during stage");
                    StageOutcome::failure(
                        definition.name.clone(),
                        FailureReason::SessionLost,
                        Some(format!("session panicked: {}", message)),
                        stage_started.elapsed(),
                        vec![StageState::Pending, StageState::Failed],
                    )
                }
            };

            if let Some(name) = &definition.checkpoint {
                capture(session, sink, name, &mut artifacts).await;
            }

            let failed = !outcome.succeeded;
            outcomes.push(outcome);
            if failed {
                warn!(stage = %definition.name, index, "workflow halted");
                break;
            }
        }

        let (final_url, title) = final_page(lease.session()).await;
        lease.release().await;

        let result = WorkflowResult::from_outcomes(run_id, outcomes, artifacts, started.elapsed())
            .with_final_page(final_url, title);
        info!(
            succeeded = result.succeeded,
            halted_at_stage = ?result.halted_at_stage,
            elapsed_ms = result.elapsed_ms,
            "workflow finished"
        );
        result
    }
}

/// Snapshot the session into the sink. Failures are logged and otherwise ignored.
async fn capture(
    session: &dyn BrowserSession,
    sink: &dyn ArtifactSink,
    checkpoint: &CheckpointName,
    artifacts: &mut BTreeMap<String, String>,
) {
    let png = match AssertUnwindSafe(session.screenshot()).catch_unwind().await {
        Ok(Ok(png)) => png,
        Ok(Err(err)) => {
            warn!(checkpoint = %checkpoint, error = %err, "snapshot failed");
            return;
        }
        Err(_) => {
            warn!(checkpoint = %checkpoint, "snapshot panicked");
            return;
        }
    };
    match sink.store(checkpoint, &png).await {
        Ok(reference) => {
            artifacts.insert(checkpoint.to_string(), reference);
        }
        Err(err) => warn!(checkpoint = %checkpoint, error = %err, "artifact store failed"),
    }
}

/// URL and title of the page as the run leaves it. Unreadable values are `None`.
async fn final_page(session: &dyn BrowserSession) -> (Option<String>, Option<String>) {
    let read = async { (session.current_url().await.ok(), session.title().await.ok()) };
    match AssertUnwindSafe(read).catch_unwind().await {
        Ok(page) => page,
        Err(_) => {
            warn!("reading the final page panicked");
            (None, None)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemoryArtifactSink, NullArtifactSink};
    use action_gate::{Probe, UrlPredicate};
    use action_primitives::{ActionSpec, InputValue};
    use cdp_adapter::fake::{visible, FakeBrowser, FakeSessionFactory, Trigger};
    use cdp_adapter::{AdapterError, AdapterErrorKind, AnchorDescriptor};

    fn browser() -> FakeBrowser {
        let browser = FakeBrowser::new("https://portal.test/start");
        browser.set_element(&AnchorDescriptor::css("body"), visible());
        browser
    }

    fn runner(browser: &FakeBrowser) -> WorkflowRunner {
        WorkflowRunner::with_default_executor(Arc::new(browser.factory()))
    }

    /// Navigates to `url` and waits for the URL to contain `marker`.
    fn nav_stage(name: &str, url: &str, marker: &str) -> StageDefinition {
        StageDefinition::new(name, ActionSpec::navigate(url))
            .probe(Probe::url(
                format!("{}-url", name),
                UrlPredicate::Contains(marker.to_string()),
                2_000,
            ))
            .checkpoint(format!("after-{}", name))
    }

    #[tokio::test(start_paused = true)]
    async fn all_stages_succeed() {
        let browser = browser();
        browser.with_page(|page| page.title = "Portal".into());
        let stages = vec![
            nav_stage("a", "https://portal.test/a", "/a"),
            nav_stage("b", "https://portal.test/b", "/b"),
        ];
        let sink = MemoryArtifactSink::new();
        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &sink)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.halted_at_stage, None);
        assert_eq!(result.stages.len(), 2);
        assert_eq!(result.artifacts.len(), 2);
        assert_eq!(result.artifacts["after-b"], "mem://after-b");
        assert_eq!(result.final_url.as_deref(), Some("https://portal.test/b"));
        assert_eq!(result.title.as_deref(), Some("Portal"));
        assert_eq!(browser.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn halts_at_first_failing_stage() {
        let browser = browser();
        let never = AnchorDescriptor::css("#never");
        let third = AnchorDescriptor::css("#third");
        browser.set_element(&third, visible());
        let stages = vec![
            nav_stage("a", "https://portal.test/a", "/a"),
            nav_stage("b", "https://portal.test/b", "/never-there"),
            StageDefinition::new("c", ActionSpec::click(third))
                .probe(Probe::visible("never", never, 1_000)),
        ];
        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &MemoryArtifactSink::new())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.halted_at_stage, Some(1));
        assert_eq!(result.stages.len(), 2);
        assert_eq!(
            result.stages[1].failure_reason,
            Some(FailureReason::NoReadinessSignal)
        );
        assert!(result.stages[1].elapsed_ms >= 2_000);
        assert!(browser.clicks().is_empty());
        assert_eq!(browser.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_session_is_session_lost_and_torn_down() {
        let browser = browser();
        let field = AnchorDescriptor::css("#boom");
        browser.set_element(&field, visible());
        browser.with_page(|page| page.panic_on_inspect = Some(field.to_string()));
        let stages = vec![StageDefinition::new(
            "boom",
            ActionSpec::click(field.clone()),
        )
        .probe(Probe::visible("boom-visible", field, 1_000))
        .checkpoint("after-boom")];

        let sink = MemoryArtifactSink::new();
        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &sink)
            .await
            .unwrap();

        assert_eq!(result.halted_at_stage, Some(0));
        assert_eq!(result.failure_reason(), Some(FailureReason::SessionLost));
        assert!(result.stages[0].detail.as_ref().unwrap().contains("panicked"));
        assert_eq!(browser.close_calls(), 1);
        // Failure diagnostics are still captured.
        assert!(result.artifacts.contains_key("after-boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn panic_outcome_reports_time_spent_in_the_stage() {
        let browser = browser();
        let submit = AnchorDescriptor::css("#submit");
        let status = AnchorDescriptor::css("#status");
        browser.set_element(&submit, visible());
        let poisoned = status.to_string();
        browser.on(Trigger::click(&submit), Duration::from_millis(300), move |page| {
            page.panic_on_inspect = Some(poisoned.clone())
        });
        let stages = vec![StageDefinition::new("submit", ActionSpec::click(submit))
            .probe(Probe::visible("status-shown", status, 5_000))];

        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &MemoryArtifactSink::new())
            .await
            .unwrap();
        assert_eq!(result.failure_reason(), Some(FailureReason::SessionLost));
        assert!(result.stages[0].elapsed_ms >= 300);
        assert!(result.stages[0].elapsed_ms < 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_checkpoint_is_kept_when_the_action_fails() {
        let browser = browser();
        let stages = vec![StageDefinition::new(
            "login",
            ActionSpec::fill(AnchorDescriptor::css("#userName1"), InputValue::input("username")),
        )
        .pre_checkpoint("login-page")
        .probe(Probe::url(
            "left-login",
            UrlPredicate::NotContains("/Login".into()),
            2_000,
        ))];
        let inputs = WorkflowInputs::new().with("username", "mario.rossi");

        let result = runner(&browser)
            .run(&stages, &inputs, &MemoryArtifactSink::new())
            .await
            .unwrap();
        assert_eq!(result.failure_reason(), Some(FailureReason::ActionNotPerformed));
        assert_eq!(
            result.artifacts.keys().collect::<Vec<_>>(),
            vec!["login-page"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_browser_is_session_lost() {
        let browser = browser();
        let submit = AnchorDescriptor::css("#submit");
        browser.set_element(&submit, visible());
        browser.on(Trigger::click(&submit), Duration::from_millis(200), |page| {
            page.closed = true
        });
        let stages = vec![StageDefinition::new("submit", ActionSpec::click(submit))
            .probe(Probe::url("moved", UrlPredicate::Contains("/done".into()), 5_000))];

        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &MemoryArtifactSink::new())
            .await
            .unwrap();
        assert_eq!(result.failure_reason(), Some(FailureReason::SessionLost));
        assert_eq!(browser.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_halts_at_first_stage() {
        let browser = browser();
        let factory = FakeSessionFactory::failing(
            &browser,
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint("chrome not found"),
        );
        let runner = WorkflowRunner::with_default_executor(Arc::new(factory));
        let stages = vec![nav_stage("a", "https://portal.test/a", "/a")];
        let result = runner
            .run(&stages, &WorkflowInputs::new(), &NullArtifactSink)
            .await
            .unwrap();
        assert_eq!(result.halted_at_stage, Some(0));
        assert_eq!(result.failure_reason(), Some(FailureReason::SessionLost));
        assert_eq!(browser.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn artifact_failures_do_not_fail_the_run() {
        let browser = browser();
        browser.with_page(|page| page.fail_screenshots = true);
        let stages = vec![nav_stage("a", "https://portal.test/a", "/a")];
        let result = runner(&browser)
            .run(&stages, &WorkflowInputs::new(), &NullArtifactSink)
            .await
            .unwrap();
        assert!(result.succeeded);
        assert!(result.artifacts.is_empty());
    }

    #[tokio::test]
    async fn configuration_errors_are_raised_before_opening() {
        let browser = browser();
        let runner = runner(&browser);
        let err = runner
            .run(&[], &WorkflowInputs::new(), &NullArtifactSink)
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::EmptyWorkflow);

        let stages = vec![
            nav_stage("a", "https://portal.test/a", "/a"),
            nav_stage("a", "https://portal.test/b", "/b"),
        ];
        let err = runner
            .run(&stages, &WorkflowInputs::new(), &NullArtifactSink)
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::DuplicateStage("a".into()));
        assert_eq!(browser.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_login_field_scenario() {
        let browser = FakeBrowser::new("about:blank");
        browser.set_element(&AnchorDescriptor::css("body"), visible());
        let stages = vec![StageDefinition::new(
            "login",
            ActionSpec::sequence(vec![
                ActionSpec::navigate("https://iampe.adm.gov.it/sam/UI/Login?realm=/adm&locale=en"),
                ActionSpec::fill(AnchorDescriptor::css("#userName1"), InputValue::input("username")),
            ]),
        )
        .probe(Probe::url(
            "left-login",
            UrlPredicate::NotContains("/Login".into()),
            20_000,
        ))];
        let inputs = WorkflowInputs::new().with("username", "mario.rossi");

        let result = runner(&browser)
            .run(&stages, &inputs, &MemoryArtifactSink::new())
            .await
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["succeeded"], false);
        assert_eq!(json["haltedAtStage"], 0);
        assert_eq!(json["stages"].as_array().unwrap().len(), 1);
        assert_eq!(json["stages"][0]["name"], "login");
        assert_eq!(json["stages"][0]["failureReason"], "action-not-performed");
        assert_eq!(json["artifacts"], serde_json::json!({}));
        assert_eq!(
            json["finalUrl"],
            "https://iampe.adm.gov.it/sam/UI/Login?realm=/adm&locale=en"
        );
        assert_eq!(json["stages"][0]["actionDetail"], serde_json::Value::Null);
    }
}

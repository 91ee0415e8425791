//! A scripted ADM portal on top of [`FakeBrowser`], for exercising whole recipes offline.

use std::time::Duration;

use cdp_adapter::fake::{visible, visible_with_value, FakeBrowser, Trigger};
use cdp_adapter::{AnchorDescriptor, ElementState, SelectOptionEntry};

use crate::stages::{
    CARICA_LABEL, COOKIE_BAR, COOKIE_REJECT_LABELLED, ERROR_BANNER, MAIN_CONTENT, MINISTRY_HEADER,
    PASSWORD_FIELD, PROVIDER_SELECT_FIELD, SUBMIT_BUTTON, UPLOAD_CONTROL, UPLOAD_FORM,
    UPLOAD_HEADING, USERNAME_FIELD, VIEW_STATE,
};
use crate::targets::PortalTargets;

pub const LOGGED_IN_URL: &str = "https://iampe.adm.gov.it/sam/UI/Console";
pub const LOGIN_ERROR_TEXT: &str = "Authentication failed. Please check your credentials.";
pub const LOGIN_TITLE: &str = "ADM - Login";
pub const DASHBOARD_TITLE: &str = "Agenzia delle Dogane e dei Monopoli";
pub const UPLOAD_TITLE: &str = "ODV - Acquisizione Certificazione";

/// Portal behaviour knobs.
#[derive(Debug, Clone)]
pub struct PortalScript {
    pub accept_credentials: bool,
    pub show_cookie_bar: bool,
    /// The close links do nothing; only hiding the bar gets rid of it
    pub sticky_cookie_bar: bool,
    /// The landing page after login shows its header and main content
    pub dashboard_renders: bool,
    /// The SSO jump bounces back to the login page
    pub sso_expired: bool,
    pub providers: Vec<SelectOptionEntry>,
    /// The select re-renders the page only on a synthetic change event
    pub select_needs_change_event: bool,
    /// The select does nothing at all, not even after a change event
    pub select_ignored: bool,
    /// Delay between an action and the portal's reaction
    pub latency: Duration,
}

impl Default for PortalScript {
    fn default() -> Self {
        Self {
            accept_credentials: true,
            show_cookie_bar: true,
            sticky_cookie_bar: false,
            dashboard_renders: true,
            sso_expired: false,
            providers: vec![
                SelectOptionEntry::new("", "-- Seleziona --"),
                SelectOptionEntry::new("IT001", "Acme Energia S.p.A."),
                SelectOptionEntry::new("IT002", "Beta Gas S.r.l."),
            ],
            select_needs_change_event: false,
            select_ignored: false,
            latency: Duration::from_millis(400),
        }
    }
}

/// Wire `browser` to behave like the portal reachable through `targets`.
pub fn install(browser: &FakeBrowser, targets: &PortalTargets, script: &PortalScript) {
    browser.set_element(&AnchorDescriptor::css("body"), visible());
    let latency = script.latency;

    browser.on(Trigger::navigate(&targets.login_url), Duration::ZERO, |page| {
        page.title = LOGIN_TITLE.to_string();
        page.set_element(&AnchorDescriptor::css(USERNAME_FIELD), visible_with_value(""));
        page.set_element(&AnchorDescriptor::css(PASSWORD_FIELD), visible_with_value(""));
        page.set_element(&AnchorDescriptor::css(SUBMIT_BUTTON), visible());
    });

    let accept = script.accept_credentials;
    let cookie_bar = script.show_cookie_bar;
    let dashboard = script.dashboard_renders;
    browser.on(
        Trigger::click(&AnchorDescriptor::css(SUBMIT_BUTTON)),
        latency,
        move |page| {
            if !accept {
                page.set_element(
                    &AnchorDescriptor::css(ERROR_BANNER),
                    ElementState {
                        text: Some(LOGIN_ERROR_TEXT.to_string()),
                        ..visible()
                    },
                );
                return;
            }
            page.url = LOGGED_IN_URL.to_string();
            page.title = DASHBOARD_TITLE.to_string();
            for anchor in [USERNAME_FIELD, PASSWORD_FIELD, SUBMIT_BUTTON] {
                page.remove_element(&AnchorDescriptor::css(anchor));
            }
            if dashboard {
                page.set_element(&AnchorDescriptor::text("header", MINISTRY_HEADER), visible());
                page.set_element(&AnchorDescriptor::css(MAIN_CONTENT), visible());
            }
            if cookie_bar {
                page.set_element(&AnchorDescriptor::css(COOKIE_BAR), visible());
                page.set_element(&AnchorDescriptor::css(COOKIE_REJECT_LABELLED), visible());
            }
        },
    );

    if !script.sticky_cookie_bar {
        browser.on(
            Trigger::click(&AnchorDescriptor::css(COOKIE_REJECT_LABELLED)),
            latency,
            |page| {
                page.remove_element(&AnchorDescriptor::css(COOKIE_REJECT_LABELLED));
                page.remove_element(&AnchorDescriptor::css(COOKIE_BAR));
            },
        );
    }

    let landing = if script.sso_expired {
        targets.login_url.clone()
    } else {
        targets.odv_home_url.clone()
    };
    browser.on(Trigger::navigate(&targets.sso_url), Duration::ZERO, move |page| {
        page.url = landing.clone();
    });

    let upload_url = targets.upload_url.clone();
    let providers = script.providers.clone();
    browser.on(Trigger::navigate(&targets.upload_url), Duration::ZERO, move |page| {
        page.url = upload_url.clone();
        page.title = UPLOAD_TITLE.to_string();
        page.set_element(&AnchorDescriptor::css(UPLOAD_FORM), visible());
        page.set_element(&AnchorDescriptor::text("button", CARICA_LABEL), visible());
        page.set_element(&AnchorDescriptor::text("h1", UPLOAD_HEADING), visible());
        page.set_element(&AnchorDescriptor::css(VIEW_STATE), visible_with_value("view-1"));
        let select = AnchorDescriptor::css(PROVIDER_SELECT_FIELD);
        page.set_element(&select, visible_with_value(""));
        page.options.insert(select.to_string(), providers.clone());
    });

    if script.select_ignored {
        return;
    }
    // Picking a provider starts the AJAX call; the re-render completes it.
    let select = AnchorDescriptor::css(PROVIDER_SELECT_FIELD);
    browser.on(Trigger::select(&select), Duration::ZERO, |page| page.inflight = 1);
    let rerender_on = if script.select_needs_change_event {
        Trigger::dispatch_change(&select)
    } else {
        Trigger::select(&select)
    };
    browser.on(rerender_on, latency, |page| {
        page.inflight = 0;
        page.set_value(&AnchorDescriptor::css(VIEW_STATE), "view-2");
        page.set_element(&AnchorDescriptor::css(UPLOAD_CONTROL), visible());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{PASSWORD, PROVIDER, USERNAME};
    use crate::Recipe;
    use action_flow::{FailureReason, MemoryArtifactSink, WorkflowResult, WorkflowRunner};
    use action_primitives::WorkflowInputs;
    use std::sync::Arc;

    fn inputs(provider: &str) -> WorkflowInputs {
        WorkflowInputs::new()
            .with(USERNAME, "mario.rossi")
            .with(PASSWORD, "s3cret")
            .with(PROVIDER, provider)
    }

    async fn run(recipe: Recipe, script: PortalScript, provider: &str) -> (FakeBrowser, WorkflowResult) {
        let targets = PortalTargets::default();
        let browser = FakeBrowser::new("about:blank");
        install(&browser, &targets, &script);
        let runner = WorkflowRunner::with_default_executor(Arc::new(browser.factory()));
        let sink = MemoryArtifactSink::new();
        let result = runner
            .run(&recipe.stages(&targets).unwrap(), &inputs(provider), &sink)
            .await
            .unwrap();
        (browser, result)
    }

    #[tokio::test(start_paused = true)]
    async fn provider_selection_reaches_the_upload_control() {
        let (browser, result) =
            run(Recipe::ProviderSelection, PortalScript::default(), "beta gas").await;
        assert!(result.succeeded, "{:?}", result);
        assert_eq!(result.stages.len(), 7);
        assert!(result.stages.iter().all(|stage| !stage.fallback_attempted));
        assert_eq!(browser.selections(), vec!["IT002".to_string()]);
        assert_eq!(
            result.artifacts.keys().cloned().collect::<Vec<_>>(),
            vec![
                "after-cookies",
                "after-provider-select",
                "after-sso",
                "after-submit",
                "login-page",
                "upload-page"
            ]
        );
        let select = &result.stages[6];
        let picked = select.action_detail.as_deref().unwrap_or_default();
        assert!(picked.contains("Beta Gas") && picked.contains("IT002"), "{}", picked);
        assert_eq!(result.final_url, Some(PortalTargets::default().upload_url));
        assert_eq!(result.title.as_deref(), Some(UPLOAD_TITLE));
        assert_eq!(browser.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_credentials_report_the_banner() {
        let script = PortalScript {
            accept_credentials: false,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::UploadNavigation, script, "").await;
        assert!(!result.succeeded);
        assert_eq!(result.halted_at_stage, Some(1));
        assert_eq!(result.failure_reason(), Some(FailureReason::RejectedBySignal));
        assert!(result.stages[1]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("Authentication failed"));
        assert_eq!(browser.navigations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_cookie_bar_skips_the_stage() {
        let script = PortalScript {
            show_cookie_bar: false,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::UploadNavigation, script, "").await;
        assert!(result.succeeded);
        assert!(result.stages[2].skipped);
        assert_eq!(browser.clicks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sticky_cookie_bar_is_hidden_by_fallback() {
        let script = PortalScript {
            sticky_cookie_bar: true,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::UploadNavigation, script, "").await;
        assert!(result.succeeded);
        assert!(result.stages[2].fallback_attempted);
        assert_eq!(browser.hidden(), vec![format!("css:{}", COOKIE_BAR)]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_sso_session_halts_at_the_hop() {
        let script = PortalScript {
            sso_expired: true,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::ProviderSelection, script, "IT001").await;
        assert_eq!(result.halted_at_stage, Some(4));
        assert_eq!(result.stages[4].name, "sso-hop");
        assert_eq!(result.failure_reason(), Some(FailureReason::RejectedBySignal));
        assert!(!browser
            .navigations()
            .contains(&PortalTargets::default().upload_url));
    }

    #[tokio::test(start_paused = true)]
    async fn change_event_fallback_unsticks_the_select() {
        let script = PortalScript {
            select_needs_change_event: true,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::ProviderSelection, script, "IT001").await;
        assert!(result.succeeded, "{:?}", result);
        let select = &result.stages[6];
        assert!(select.fallback_attempted);
        assert_eq!(browser.dispatches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inert_select_is_not_mistaken_for_a_quiet_network() {
        let script = PortalScript {
            select_ignored: true,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::ProviderSelection, script, "IT001").await;
        assert_eq!(result.halted_at_stage, Some(6));
        assert_eq!(result.failure_reason(), Some(FailureReason::FallbackExhausted));
        assert!(result.stages[6].fallback_attempted);
        assert_eq!(browser.selections(), vec!["IT001".to_string()]);
        assert_eq!(browser.dispatches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_landing_page_halts_at_the_dashboard() {
        let script = PortalScript {
            dashboard_renders: false,
            ..PortalScript::default()
        };
        let (browser, result) = run(Recipe::UploadNavigation, script, "").await;
        assert_eq!(result.halted_at_stage, Some(3));
        assert_eq!(result.stages[3].name, "dashboard");
        assert_eq!(result.failure_reason(), Some(FailureReason::NoReadinessSignal));
        assert_eq!(result.final_url.as_deref(), Some(LOGGED_IN_URL));
        assert_eq!(result.title.as_deref(), Some(DASHBOARD_TITLE));
        assert!(!browser.navigations().contains(&PortalTargets::default().sso_url));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_provider_is_not_selected() {
        let (browser, result) =
            run(Recipe::ProviderSelection, PortalScript::default(), "Gamma Luce").await;
        assert_eq!(result.halted_at_stage, Some(6));
        assert_eq!(result.failure_reason(), Some(FailureReason::ActionNotPerformed));
        assert!(browser.selections().is_empty());
    }
}

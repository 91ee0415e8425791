//! The ADM portal stages, in the order the recipes run them.

use action_flow::StageDefinition;
use action_gate::{Probe, UrlPredicate};
use action_primitives::{ActionSpec, InputValue, WaitTier};
use cdp_adapter::AnchorDescriptor;

use crate::errors::RecipeError;
use crate::inputs::{PASSWORD, PROVIDER, USERNAME};
use crate::targets::PortalTargets;

pub const OPEN_LOGIN: &str = "open-login";
pub const LOGIN: &str = "login";
pub const COOKIE_DISMISS: &str = "cookie-dismiss";
pub const DASHBOARD: &str = "dashboard";
pub const SSO_HOP: &str = "sso-hop";
pub const UPLOAD_PAGE: &str = "upload-page";
pub const PROVIDER_SELECT: &str = "provider-select";

pub const USERNAME_FIELD: &str = "#userName1";
pub const PASSWORD_FIELD: &str = "#userPassword1";
pub const SUBMIT_BUTTON: &str = "button.adm-btn-primary";
pub const ERROR_BANNER: &str = ".alert, .alert-danger, .alert-warning, .feedbackPanelERROR, .text-danger";
pub const LOGIN_PATH: &str = "/Login";

pub const COOKIE_BAR: &str = "#cookiebar-adm";
pub const COOKIE_REJECT_LABELLED: &str = "#cookiebar-adm a[aria-label*=\"Chiudi e rifiuta tutto\"]";
pub const COOKIE_LINKS: &str = "#cookiebar-adm a";
pub const COOKIE_REJECT_TEXT: &str = "Close and reject cookies";
pub const COOKIE_DELETE_LINK: &str = "#cookiebar-adm a[href*=\"deleteCookies\"]";

pub const DASHBOARD_LABELS: &str = "h1, h2, h3, h4, a, span";
pub const ASSET_PUBLISHER: &str = "Asset Publisher";
pub const ONLINE_SERVICES: &str = "Online Services";
pub const MINISTRY_HEADER: &str = "Ministero dell'Economia";
pub const MAIN_CONTENT: &str = "main";

pub const UPLOAD_URL_PATTERN: &str = r"(?i)/ODV_GAD/pages/acquisizioneCertificazione\.xhtml";
pub const UPLOAD_FORM: &str = "form[action*=\"acquisizioneCertificazione\"]";
pub const UPLOAD_HEADING: &str = "Acquisizione Certificazione";
pub const CARICA_LABEL: &str = "Carica";
pub const UPLOAD_LABEL: &str = "Upload";

pub const PROVIDER_SELECT_FIELD: &str = "#formAcqController\\:elencoConc";
pub const VIEW_STATE: &str = "input[name=\"javax.faces.ViewState\"]";
pub const UPLOAD_CONTROL: &str = "input[type=\"file\"]";

/// Load the login form; done once the credential fields render.
pub fn open_login(targets: &PortalTargets) -> StageDefinition {
    StageDefinition::new(OPEN_LOGIN, ActionSpec::navigate(&targets.login_url))
        .probe(Probe::visible(
            "username-field",
            AnchorDescriptor::css(USERNAME_FIELD),
            15_000,
        ))
        .probe(Probe::visible(
            "password-field",
            AnchorDescriptor::css(PASSWORD_FIELD),
            15_000,
        ))
}

/// Submit credentials; done once the browser leaves the login page without an error banner.
pub fn login() -> StageDefinition {
    let action = ActionSpec::sequence(vec![
        ActionSpec::fill(
            AnchorDescriptor::css(USERNAME_FIELD),
            InputValue::input(USERNAME),
        ),
        ActionSpec::fill(
            AnchorDescriptor::css(PASSWORD_FIELD),
            InputValue::secret(PASSWORD),
        ),
        ActionSpec::click(AnchorDescriptor::css(SUBMIT_BUTTON)),
    ]);

    StageDefinition::new(LOGIN, action)
        .probe(Probe::url(
            "left-login-page",
            UrlPredicate::NotContains(LOGIN_PATH.into()),
            20_000,
        ))
        .probe(Probe::visible("login-error-banner", AnchorDescriptor::css(ERROR_BANNER), 20_000).reject())
        .pre_checkpoint("login-page")
        .checkpoint("after-submit")
}

/// Close the cookie bar if it is shown, hiding it by force when no close link works.
pub fn cookie_dismiss() -> StageDefinition {
    let bar = AnchorDescriptor::css(COOKIE_BAR);
    let action = ActionSpec::first_of(vec![
        ActionSpec::click(AnchorDescriptor::css(COOKIE_REJECT_LABELLED)),
        ActionSpec::click(AnchorDescriptor::text(COOKIE_LINKS, COOKIE_REJECT_TEXT)),
        ActionSpec::click(AnchorDescriptor::css(COOKIE_DELETE_LINK)),
    ]);

    StageDefinition::new(COOKIE_DISMISS, action)
        .precondition(Probe::visible("cookie-bar-shown", bar.clone(), 3_000))
        .probe(Probe::hidden("cookie-bar-gone", bar.clone(), 7_000))
        .fallback(ActionSpec::hide(bar))
        .checkpoint("after-cookies")
}

/// Wait for the logged-in landing page to render something recognisable.
pub fn dashboard() -> StageDefinition {
    StageDefinition::new(DASHBOARD, ActionSpec::settle(WaitTier::Idle))
        .probe(Probe::visible(
            "asset-publisher",
            AnchorDescriptor::text(DASHBOARD_LABELS, ASSET_PUBLISHER),
            10_000,
        ))
        .probe(Probe::visible(
            "online-services",
            AnchorDescriptor::text(DASHBOARD_LABELS, ONLINE_SERVICES),
            10_000,
        ))
        .probe(Probe::visible(
            "ministry-header",
            AnchorDescriptor::text("header", MINISTRY_HEADER),
            10_000,
        ))
        .probe(Probe::visible(
            "main-content",
            AnchorDescriptor::css(MAIN_CONTENT),
            10_000,
        ))
}

/// Jump through single sign-on onto the ODV host.
pub fn sso_hop(targets: &PortalTargets) -> Result<StageDefinition, RecipeError> {
    let odv_host = targets.odv_host_pattern()?;
    Ok(StageDefinition::new(SSO_HOP, ActionSpec::navigate(&targets.sso_url))
        .probe(Probe::url("on-odv-host", UrlPredicate::Matches(odv_host), 15_000))
        .probe(
            Probe::url(
                "sso-redirected-to-login",
                UrlPredicate::Contains(LOGIN_PATH.into()),
                15_000,
            )
            .reject(),
        )
        .fallback(ActionSpec::navigate(&targets.odv_home_url))
        .checkpoint("after-sso"))
}

/// Open the certificate acquisition page.
pub fn upload_page(targets: &PortalTargets) -> StageDefinition {
    StageDefinition::new(UPLOAD_PAGE, ActionSpec::navigate(&targets.upload_url))
        .probe(Probe::url(
            "upload-url",
            UrlPredicate::Matches(UPLOAD_URL_PATTERN.into()),
            15_000,
        ))
        .probe(Probe::visible("upload-form", AnchorDescriptor::css(UPLOAD_FORM), 15_000))
        .probe(Probe::visible(
            "upload-heading",
            AnchorDescriptor::text("h1", UPLOAD_HEADING),
            15_000,
        ))
        .probe(Probe::visible(
            "carica-button",
            AnchorDescriptor::text("button", CARICA_LABEL),
            15_000,
        ))
        .probe(Probe::visible(
            "upload-button",
            AnchorDescriptor::text("button", UPLOAD_LABEL),
            15_000,
        ))
        .probe(
            Probe::url(
                "upload-redirected-to-login",
                UrlPredicate::Contains(LOGIN_PATH.into()),
                15_000,
            )
            .reject(),
        )
        .checkpoint("upload-page")
}

/// Pick the provider in the JSF select; the page re-renders over AJAX afterwards.
pub fn provider_select() -> StageDefinition {
    let select = AnchorDescriptor::css(PROVIDER_SELECT_FIELD);
    StageDefinition::new(
        PROVIDER_SELECT,
        ActionSpec::select_option(select.clone(), InputValue::input(PROVIDER)),
    )
    .probe(Probe::network_settled("network-settled", 500, 10_000))
    .probe(Probe::value_change(
        "view-state-changed",
        AnchorDescriptor::css(VIEW_STATE),
        10_000,
    ))
    .probe(Probe::element_count(
        "upload-control-rendered",
        AnchorDescriptor::css(UPLOAD_CONTROL),
        10_000,
    ))
    .fallback(ActionSpec::dispatch_change(select))
    .checkpoint("after-provider-select")
}

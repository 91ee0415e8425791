use std::sync::Arc;

use action_flow::WorkflowRunner;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cdp_adapter::fake::FakeBrowser;
use portalflow_cli::server::{build_router, ServeState};
use portalflow_cli::PortalService;
use portalflow_recipes::simulation::{self, PortalScript};
use portalflow_recipes::PortalTargets;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn app_with(targets: PortalTargets, script: PortalScript) -> (FakeBrowser, Router, TempDir) {
    let browser = FakeBrowser::new("about:blank");
    simulation::install(&browser, &targets, &script);
    let runs = tempfile::tempdir().unwrap();
    let runner = WorkflowRunner::with_default_executor(Arc::new(browser.factory()));
    let service = Arc::new(PortalService::new(targets, runs.path(), runner));
    (browser, build_router(ServeState::new(service, "test")), runs)
}

fn app(script: PortalScript) -> (FakeBrowser, Router, TempDir) {
    app_with(PortalTargets::default(), script)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_env_and_time() {
    let (_browser, router, _runs) = app(PortalScript::default());
    let request = Request::get("/api/health").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["env"], "test");
    assert!(body["time"].as_str().unwrap().contains('T'));
}

#[tokio::test(start_paused = true)]
async fn missing_credentials_are_bad_requests() {
    let (browser, router, _runs) = app(PortalScript::default());
    let request = post("/api/login-probe", json!({ "username": "mario" }));
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "password is required");

    let request = Request::post("/api/nav/upload").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username and password are required");
    assert_eq!(browser.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_login_is_a_structured_200() {
    let script = PortalScript {
        accept_credentials: false,
        ..PortalScript::default()
    };
    let (browser, router, _runs) = app(script);
    let (status, body) = send(
        router,
        post(
            "/api/login-probe",
            json!({ "username": "mario", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], false);
    assert_eq!(body["haltedAtStage"], 1);
    assert_eq!(body["stages"][1]["failureReason"], "rejected-by-signal");
    assert!(body["runDir"].is_string());
    assert_eq!(browser.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn provider_list_uses_its_first_entry() {
    let (browser, router, _runs) = app(PortalScript::default());
    let (status, body) = send(
        router,
        post(
            "/api/upload/select-provider",
            json!({ "username": "mario", "password": "s3cret", "provider": ["acme", "beta"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["succeeded"], true);
    assert_eq!(body["stages"].as_array().unwrap().len(), 7);
    assert!(body["finalUrl"].as_str().unwrap().contains("acquisizioneCertificazione"));
    assert_eq!(browser.selections(), vec!["IT001".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn each_request_opens_its_own_session() {
    let (browser, router, _runs) = app(PortalScript::default());
    for _ in 0..2 {
        let (status, _) = send(
            router.clone(),
            post(
                "/api/login-probe",
                json!({ "username": "mario", "password": "s3cret" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(browser.opens(), 2);
}

#[tokio::test]
async fn broken_targets_are_server_errors() {
    let targets = PortalTargets {
        upload_url: "ftp://odv.adm.gov.it/upload".into(),
        ..PortalTargets::default()
    };
    let (browser, router, _runs) = app_with(targets, PortalScript::default());
    let (status, body) = send(
        router,
        post("/api/nav/upload", json!({ "username": "mario", "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("upload_url"));
    assert_eq!(browser.opens(), 0);
}

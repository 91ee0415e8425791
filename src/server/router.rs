use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use portalflow_recipes::Recipe;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::service::{Credentials, RunReport, ServiceError};

use super::state::ServeState;

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/login-probe", post(login_probe_handler))
        .route("/api/nav/upload", post(upload_navigation_handler))
        .route("/api/upload/select-provider", post(provider_selection_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "env": state.env,
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn login_probe_handler(
    State(state): State<ServeState>,
    body: Option<Json<Credentials>>,
) -> Result<Json<RunReport>, ApiError> {
    run_recipe(&state, Recipe::LoginProbe, body).await
}

async fn upload_navigation_handler(
    State(state): State<ServeState>,
    body: Option<Json<Credentials>>,
) -> Result<Json<RunReport>, ApiError> {
    run_recipe(&state, Recipe::UploadNavigation, body).await
}

async fn provider_selection_handler(
    State(state): State<ServeState>,
    body: Option<Json<Credentials>>,
) -> Result<Json<RunReport>, ApiError> {
    run_recipe(&state, Recipe::ProviderSelection, body).await
}

// A missing or unparsable body is treated as empty so it reports the missing fields.
async fn run_recipe(
    state: &ServeState,
    recipe: Recipe,
    body: Option<Json<Credentials>>,
) -> Result<Json<RunReport>, ApiError> {
    info!(recipe = %recipe, "workflow request");
    let credentials = body.map(|Json(credentials)| credentials).unwrap_or_default();
    let report = state.service.run(recipe, &credentials).await?;
    Ok(Json(report))
}

/// `{error}` body with 400 for caller mistakes and 500 for everything else.
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        if err.is_caller_error() {
            warn!(error = %err, "rejected workflow request");
            Self {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            }
        } else {
            error!(error = %err, "workflow request failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

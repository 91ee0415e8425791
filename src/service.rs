//! Runs named recipes with fresh sessions and per-run artifact directories.
//!
//! Shared by the CLI and the HTTP surface.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_flow::{FlowError, WorkflowResult, WorkflowRunner};
use action_primitives::{DefaultActionExecutor, DefaultWaitStrategy, ExecutorSettings, WorkflowInputs};
use cdp_adapter::{ChromiumSessionFactory, SessionFactory};
use portalflow_recipes::inputs::{self, PASSWORD, PROVIDER, USERNAME};
use portalflow_recipes::{PortalTargets, Recipe, RecipeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::artifacts::{create_run_dir, FsArtifactSink};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller error: required inputs are absent or blank
    #[error("{}", missing_message(.0))]
    MissingInputs(Vec<String>),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Could not create run directory: {0}")]
    RunDir(#[source] io::Error),
}

impl ServiceError {
    pub fn is_caller_error(&self) -> bool {
        matches!(self, ServiceError::MissingInputs(_))
    }
}

fn missing_message(keys: &[String]) -> String {
    match keys {
        [] => "inputs are required".to_string(),
        [only] => format!("{} is required", only),
        [init @ .., last] => format!("{} and {} are required", init.join(", "), last),
    }
}

/// Per-run caller inputs.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accepts a string or a list of strings; only the first entry is used
    #[serde(default, deserialize_with = "first_of_string_or_list")]
    pub provider: Option<String>,
}

fn first_of_string_or_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => Some(value),
        Some(OneOrMany::Many(values)) => values.into_iter().next(),
        None => None,
    })
}

impl Credentials {
    pub fn to_inputs(&self) -> WorkflowInputs {
        let mut inputs = WorkflowInputs::new();
        for (key, value) in [
            (USERNAME, &self.username),
            (PASSWORD, &self.password),
            (PROVIDER, &self.provider),
        ] {
            if let Some(value) = value {
                inputs.insert(key, value.clone());
            }
        }
        inputs
    }
}

// Only says which fields are set.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.is_some())
            .field("password", &self.password.is_some())
            .field("provider", &self.provider)
            .finish()
    }
}

/// A finished run: where its artifacts live and what happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_dir: PathBuf,
    #[serde(flatten)]
    pub result: WorkflowResult,
}

pub struct PortalService {
    targets: PortalTargets,
    artifacts_root: PathBuf,
    runner: WorkflowRunner,
}

impl PortalService {
    pub fn new(
        targets: PortalTargets,
        artifacts_root: impl Into<PathBuf>,
        runner: WorkflowRunner,
    ) -> Self {
        Self {
            targets,
            artifacts_root: artifacts_root.into(),
            runner,
        }
    }

    /// Chromium-backed service; navigation deadlines follow the browser config.
    pub fn from_config(config: &AppConfig) -> Self {
        let factory: Arc<dyn SessionFactory> =
            Arc::new(ChromiumSessionFactory::new(config.browser.clone()));
        let settings = ExecutorSettings {
            navigation_timeout: Duration::from_millis(config.browser.default_deadline_ms),
            ..ExecutorSettings::default()
        };
        let executor = DefaultActionExecutor::new(settings, Arc::new(DefaultWaitStrategy::default()));
        Self::new(
            config.portal.clone(),
            config.artifacts.root.clone(),
            WorkflowRunner::new(factory, Arc::new(executor)),
        )
    }

    /// Check inputs and stages, create the run directory, then run on a fresh session.
    pub async fn run(
        &self,
        recipe: Recipe,
        credentials: &Credentials,
    ) -> Result<RunReport, ServiceError> {
        let inputs = credentials.to_inputs();
        let missing = inputs::missing(&inputs, recipe.required_inputs());
        if !missing.is_empty() {
            return Err(ServiceError::MissingInputs(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        let stages = recipe.stages(&self.targets)?;
        WorkflowRunner::validate_flow(&stages)?;

        let run_dir = create_run_dir(&self.artifacts_root)
            .await
            .map_err(ServiceError::RunDir)?;
        info!(recipe = %recipe, run_dir = %run_dir.display(), "starting run");

        let sink = FsArtifactSink::new(run_dir.clone());
        let result = self.runner.run(&stages, &inputs, &sink).await?;
        Ok(RunReport { run_dir, result })
    }
}

use anyhow::{Context, Result};
use clap::Args;
use portalflow_recipes::Recipe;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::service::{Credentials, PortalService};

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Recipe to run: login-probe, upload-navigation or provider-selection
    pub recipe: String,

    /// Portal username
    #[arg(long, env = "PORTALFLOW_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Portal password
    #[arg(long, env = "PORTALFLOW_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Provider to select (option value, or part of its label)
    #[arg(long, env = "PORTALFLOW_PROVIDER")]
    pub provider: Option<String>,

    /// Print the result on a single line
    #[arg(long)]
    pub compact: bool,
}

impl RunArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Run one recipe and print the report. `Ok(false)` means the workflow itself failed.
pub async fn cmd_run(args: RunArgs, config: &AppConfig) -> Result<bool> {
    let recipe: Recipe = args.recipe.parse()?;
    let service = PortalService::from_config(config);
    let report = service.run(recipe, &args.credentials()).await?;

    let rendered = if args.compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .context("Failed to render run report")?;
    println!("{}", rendered);

    if report.result.succeeded {
        info!(recipe = %recipe, run_dir = %report.run_dir.display(), "recipe succeeded");
    } else {
        warn!(
            recipe = %recipe,
            halted_at_stage = ?report.result.halted_at_stage,
            reason = ?report.result.failure_reason(),
            "recipe failed"
        );
    }
    Ok(report.result.succeeded)
}

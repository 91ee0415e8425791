//! Named recipes: the stage lists callers can run.

use std::fmt;
use std::str::FromStr;

use action_flow::StageDefinition;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RecipeError;
use crate::inputs::{PASSWORD, PROVIDER, USERNAME};
use crate::stages;
use crate::targets::PortalTargets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recipe {
    /// Check that the credentials are accepted
    LoginProbe,
    /// Log in and reach the certificate upload page
    UploadNavigation,
    /// Reach the upload page and pick the provider
    ProviderSelection,
}

impl Recipe {
    pub const ALL: [Recipe; 3] = [
        Recipe::LoginProbe,
        Recipe::UploadNavigation,
        Recipe::ProviderSelection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Recipe::LoginProbe => "login-probe",
            Recipe::UploadNavigation => "upload-navigation",
            Recipe::ProviderSelection => "provider-selection",
        }
    }

    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            Recipe::LoginProbe | Recipe::UploadNavigation => &[USERNAME, PASSWORD],
            Recipe::ProviderSelection => &[USERNAME, PASSWORD, PROVIDER],
        }
    }

    pub fn stages(&self, targets: &PortalTargets) -> Result<Vec<StageDefinition>, RecipeError> {
        targets.validate()?;
        let stages = match self {
            Recipe::LoginProbe => login_probe(targets),
            Recipe::UploadNavigation => upload_navigation(targets)?,
            Recipe::ProviderSelection => provider_selection(targets)?,
        };
        debug!(recipe = self.name(), stages = stages.len(), "recipe assembled");
        Ok(stages)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Recipe {
    type Err = RecipeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase().replace('_', "-");
        Recipe::ALL
            .into_iter()
            .find(|recipe| recipe.name() == wanted)
            .ok_or_else(|| RecipeError::UnknownRecipe(raw.to_string()))
    }
}

pub fn login_probe(targets: &PortalTargets) -> Vec<StageDefinition> {
    vec![stages::open_login(targets), stages::login()]
}

pub fn upload_navigation(targets: &PortalTargets) -> Result<Vec<StageDefinition>, RecipeError> {
    let mut stages = login_probe(targets);
    stages.extend([
        stages::cookie_dismiss(),
        stages::dashboard(),
        stages::sso_hop(targets)?,
        stages::upload_page(targets),
    ]);
    Ok(stages)
}

pub fn provider_selection(targets: &PortalTargets) -> Result<Vec<StageDefinition>, RecipeError> {
    let mut stages = upload_navigation(targets)?;
    stages.push(stages::provider_select());
    Ok(stages)
}

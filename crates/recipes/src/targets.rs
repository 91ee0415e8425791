//! Portal endpoints the recipes navigate to.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::RecipeError;

pub const DEFAULT_LOGIN_URL: &str = "https://iampe.adm.gov.it/sam/UI/Login?realm=/adm&locale=en";
pub const DEFAULT_SSO_URL: &str =
    "https://sso.adm.gov.it/pud2odv?Location=https://odv.adm.gov.it/ODV_OHP/";
pub const DEFAULT_ODV_HOME_URL: &str = "https://odv.adm.gov.it/ODV_OHP/";
pub const DEFAULT_UPLOAD_URL: &str =
    "https://odv.adm.gov.it/ODV_GAD/pages/acquisizioneCertificazione.xhtml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalTargets {
    pub login_url: String,
    /// Single sign-on jump that lands on the ODV home once the identity session is valid
    pub sso_url: String,
    pub odv_home_url: String,
    pub upload_url: String,
}

impl Default for PortalTargets {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            sso_url: DEFAULT_SSO_URL.to_string(),
            odv_home_url: DEFAULT_ODV_HOME_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        }
    }
}

impl PortalTargets {
    pub fn validate(&self) -> Result<(), RecipeError> {
        for (field, raw) in self.fields() {
            parse(field, raw)?;
        }
        Ok(())
    }

    /// Regex matching any URL served by the ODV host, anchored at the start.
    ///
    /// The SSO jump carries the ODV URL in its query string, so a plain substring test would
    /// match before the redirect happened.
    pub fn odv_host_pattern(&self) -> Result<String, RecipeError> {
        let home = parse("odv_home_url", &self.odv_home_url)?;
        let host = home
            .host_str()
            .ok_or_else(|| RecipeError::invalid_target("odv_home_url", "URL has no host"))?;
        Ok(format!(
            "^{}://{}(:\\d+)?/",
            regex::escape(home.scheme()),
            regex::escape(host)
        ))
    }

    fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("login_url", self.login_url.as_str()),
            ("sso_url", self.sso_url.as_str()),
            ("odv_home_url", self.odv_home_url.as_str()),
            ("upload_url", self.upload_url.as_str()),
        ]
    }
}

fn parse(field: &'static str, raw: &str) -> Result<Url, RecipeError> {
    let url = Url::parse(raw).map_err(|err| RecipeError::invalid_target(field, err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RecipeError::invalid_target(
            field,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

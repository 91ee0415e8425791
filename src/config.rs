//! Application configuration
//!
//! Loaded from YAML (see `cli::runtime::load_config`), then overridden from `PORTALFLOW_*`
//! environment variables. Credentials are deliberately absent: they travel with each run.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cdp_adapter::CdpConfig;
use portalflow_recipes::PortalTargets;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub browser: CdpConfig,
    pub portal: PortalTargets,
    pub artifacts: ArtifactsConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Reported by the health endpoint
    pub env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            env: "development".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Parent of the per-run directories
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("runs"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(bind) = get("PORTALFLOW_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = get("PORT") {
            self.server.bind = with_port(&self.server.bind, port.trim());
        }
        if let Some(env) = get("PORTALFLOW_ENV") {
            self.server.env = env;
        }
        if let Some(headless) = get("PORTALFLOW_HEADLESS") {
            self.browser.headless =
                !matches!(headless.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(chrome) = get("PORTALFLOW_CHROME") {
            self.browser.executable = Some(PathBuf::from(chrome));
        }
        if let Some(url) = get("PORTALFLOW_LOGIN_URL") {
            self.portal.login_url = url;
        }
        if let Some(url) = get("PORTALFLOW_SSO_URL") {
            self.portal.sso_url = url;
        }
        if let Some(url) = get("PORTALFLOW_ODV_HOME_URL") {
            self.portal.odv_home_url = url;
        }
        if let Some(url) = get("PORTALFLOW_UPLOAD_URL") {
            self.portal.upload_url = url;
        }
        if let Some(root) = get("PORTALFLOW_ARTIFACTS_ROOT") {
            self.artifacts.root = PathBuf::from(root);
        }
        if let Some(level) = get("PORTALFLOW_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.server.bind))
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.portal.validate()?;
        let viewport = self.browser.viewport;
        if viewport.width == 0 || viewport.height == 0 {
            bail!("Viewport must be non-empty, got {}x{}", viewport.width, viewport.height);
        }
        if self.browser.launch_timeout_ms == 0 {
            bail!("browser.launch_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

fn with_port(bind: &str, port: &str) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", bind, port),
    }
}

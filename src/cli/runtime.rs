use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

pub const LOCAL_ENV_PATH: &str = "config/local.env";
pub const LOCAL_CONFIG_PATH: &str = "config/portalflow.yaml";

/// Export `KEY=value` lines from `config/local.env`; variables already set win.
pub fn load_local_env_overrides() {
    let path = Path::new(LOCAL_ENV_PATH);
    if !path.exists() {
        return;
    }

    match stdfs::read_to_string(path) {
        Ok(contents) => {
            for (key, value) in parse_env_lines(&contents) {
                if env::var(&key).is_ok() {
                    continue;
                }
                env::set_var(key, value);
            }
            info!(path = %path.display(), "Loaded environment overrides from local.env");
        }
        Err(err) => {
            warn!(path = %path.display(), ?err, "failed to read local.env overrides");
        }
    }
}

fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = idx + 1, "invalid local.env entry; skipping");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        pairs.push((key.to_string(), unescape_value(value.trim())));
    }
    pairs
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    }
    .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
}

/// Resolve, parse, override from the environment and validate the configuration.
///
/// Priority: `--config` > ./config/portalflow.yaml > ~/.config/portalflow/config.yaml > defaults.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => default_config_path(),
    };

    let mut config = match &path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = AppConfig::from_yaml(&content)?;
            info!("Loaded configuration from: {}", path.display());
            config
        }
        None => {
            info!("No config file found, using defaults");
            AppConfig::default()
        }
    };

    config.apply_env_overrides(|key| env::var(key).ok());
    config.validate()?;
    Ok(LoadedConfig { config, path })
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }
    let mut user = dirs::config_dir()?;
    user.push("portalflow");
    user.push("config.yaml");
    user.exists().then_some(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_lines_skip_comments_and_unquote() {
        let pairs = parse_env_lines(
            "# local overrides\nPORT=7000\n\nPORTALFLOW_USERNAME = \"mario \\\"mr\\\" rossi\"\nnot-a-pair\n=orphan\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("PORT".to_string(), "7000".to_string()),
                ("PORTALFLOW_USERNAME".to_string(), "mario \"mr\" rossi".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(load_config(Some(&missing)).await.is_err());
    }

    #[tokio::test]
    async fn explicit_config_is_parsed_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portalflow.yaml");
        std::fs::write(&path, "artifacts:\n  root: /tmp/portalflow-runs\n").unwrap();
        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));

        std::fs::write(&path, "portal:\n  upload_url: nope\n").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}

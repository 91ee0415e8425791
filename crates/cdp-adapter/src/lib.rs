//! Browser session capability consumed by the portalflow engine.
//!
//! Everything the engine needs from a live browser goes through [`BrowserSession`]: navigation,
//! element introspection, form mutation, in-flight network state and visual snapshots. The
//! Chromium implementation lives in [`chromium`]; tests use the scripted session from
//! [`fake`] (feature `test-util`).

use std::{env, path::PathBuf};
use which::which;

pub mod anchor;
pub mod chromium;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target element not found")]
        TargetNotFound,
        #[error("target element not interactable")]
        NotInteractable,
        #[error("option not found")]
        OptionNotFound,
        #[error("session closed")]
        SessionClosed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: matches!(kind, AdapterErrorKind::CdpIo | AdapterErrorKind::NavTimeout),
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        /// The session is gone; nothing sampled from it afterwards is meaningful.
        pub fn is_session_lost(&self) -> bool {
            self.kind == AdapterErrorKind::SessionClosed
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{env, path::PathBuf};

    /// Viewport applied to every page the adapter opens.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ViewportSize {
        pub width: u32,
        pub height: u32,
    }

    impl Default for ViewportSize {
        fn default() -> Self {
            Self {
                width: 1366,
                height: 900,
            }
        }
    }

    /// Configuration for launching browser sessions.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: Option<PathBuf>,
        pub headless: bool,
        pub viewport: ViewportSize,
        pub launch_timeout_ms: u64,
        pub default_deadline_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: detect_chrome_executable(),
                headless: resolve_headless_default(),
                viewport: ViewportSize::default(),
                launch_timeout_ms: 20_000,
                default_deadline_ms: 30_000,
            }
        }
    }

    fn resolve_headless_default() -> bool {
        // PORTALFLOW_HEADLESS: "0", "false", "no", "off" means headful
        match env::var("PORTALFLOW_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }
}

pub use anchor::AnchorDescriptor;
pub use chromium::{ChromiumSession, ChromiumSessionFactory};
pub use config::{CdpConfig, ViewportSize};
pub use error::{AdapterError, AdapterErrorKind};
pub use session::{
    BrowserSession, ElementState, OptionChoice, SelectOptionEntry, SessionFactory,
};

/// Locate a Chrome/Chromium binary: `PORTALFLOW_CHROME`, then `PATH`, then well-known paths.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("PORTALFLOW_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "freebsd")))]
    {
        Vec::new()
    }
}

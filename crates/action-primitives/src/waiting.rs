//! Built-in settle waits applied after an action

use crate::{errors::ActionError, types::WaitTier};
use async_trait::async_trait;
use cdp_adapter::{AnchorDescriptor, BrowserSession};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Waiting strategy trait
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Execute the wait strategy
    async fn wait(&self, session: &dyn BrowserSession, tier: WaitTier)
        -> Result<(), ActionError>;
}

/// Default waiting strategy implementation
#[derive(Debug, Clone)]
pub struct DefaultWaitStrategy {
    /// Timeout for DomReady tier (milliseconds)
    pub domready_timeout_ms: u64,

    /// Timeout for Idle tier (milliseconds)
    pub idle_timeout_ms: u64,

    /// Network idle quiet period (milliseconds)
    pub network_quiet_ms: u64,

    pub poll_interval_ms: u64,
}

impl Default for DefaultWaitStrategy {
    fn default() -> Self {
        Self {
            domready_timeout_ms: 5000,
            idle_timeout_ms: 10000,
            network_quiet_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

#[async_trait]
impl WaitStrategy for DefaultWaitStrategy {
    async fn wait(
        &self,
        session: &dyn BrowserSession,
        tier: WaitTier,
    ) -> Result<(), ActionError> {
        match tier {
            WaitTier::None => Ok(()),
            WaitTier::DomReady => {
                debug!("WaitTier::DomReady - waiting for document body");
                self.wait_domready(session).await
            }
            WaitTier::Idle => {
                debug!("WaitTier::Idle - waiting for page idle");
                self.wait_domready(session).await?;
                self.wait_network_quiet(session).await
            }
        }
    }
}

impl DefaultWaitStrategy {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    async fn wait_domready(&self, session: &dyn BrowserSession) -> Result<(), ActionError> {
        let body = AnchorDescriptor::css("body");
        let deadline = Instant::now() + Duration::from_millis(self.domready_timeout_ms);
        loop {
            if session.inspect(&body).await?.is_present() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ActionError::WaitTimeout(format!(
                    "document not ready after {}ms",
                    self.domready_timeout_ms
                )));
            }
            sleep(self.poll_interval()).await;
        }
    }

    async fn wait_network_quiet(&self, session: &dyn BrowserSession) -> Result<(), ActionError> {
        let quiet = Duration::from_millis(self.network_quiet_ms);
        let deadline = Instant::now() + Duration::from_millis(self.idle_timeout_ms);
        let mut quiet_since: Option<Instant> = None;
        loop {
            let now = Instant::now();
            if session.inflight_requests().await? == 0 {
                let since = *quiet_since.get_or_insert(now);
                if now.duration_since(since) >= quiet {
                    return Ok(());
                }
            } else {
                quiet_since = None;
            }
            if now >= deadline {
                return Err(ActionError::WaitTimeout(format!(
                    "network not idle after {}ms",
                    self.idle_timeout_ms
                )));
            }
            sleep(self.poll_interval()).await;
        }
    }
}

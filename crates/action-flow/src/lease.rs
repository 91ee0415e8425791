//! Scoped ownership of a run's browser session.

use cdp_adapter::BrowserSession;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the session for one run and tears it down exactly once.
///
/// `release` is the normal path. A lease dropped without release (cancelled run, unwinding)
/// schedules the teardown on the current runtime instead.
pub(crate) struct SessionLease {
    session: Arc<dyn BrowserSession>,
    released: bool,
}

impl SessionLease {
    pub(crate) fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Arc::from(session),
            released: false,
        }
    }

    pub(crate) fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    pub(crate) async fn release(mut self) {
        self.released = true;
        match self.session.close().await {
            Ok(()) => debug!("session released"),
            Err(err) => warn!(error = %err, "session teardown reported an error"),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("session lease dropped without release; closing in background");
                handle.spawn(async move {
                    if let Err(err) = session.close().await {
                        warn!(error = %err, "background session teardown failed");
                    }
                });
            }
            Err(_) => warn!("session lease dropped outside a runtime; session left open"),
        }
    }
}

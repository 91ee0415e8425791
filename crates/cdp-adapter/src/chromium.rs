//! Chromium-backed sessions driven through `chromiumoxide`.
//!
//! DOM work is done with small evaluated scripts so that every operation reports a status
//! (`ok`, `missing`, `not-interactable`, ...) instead of throwing inside the page. In-flight
//! requests are tracked from the page's Network events.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::anchor::{js_literal, AnchorDescriptor};
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::session::{BrowserSession, ElementState, OptionChoice, SelectOptionEntry, SessionFactory};

/// Launches one browser process per session so runs never share cookies or navigation.
pub struct ChromiumSessionFactory {
    config: CdpConfig,
}

impl ChromiumSessionFactory {
    pub fn new(config: CdpConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self) -> Result<BrowserConfig, AdapterError> {
        let viewport = self.config.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.width, viewport.height)
            .viewport(Viewport {
                width: viewport.width,
                height: viewport.height,
                ..Default::default()
            })
            .request_timeout(Duration::from_millis(self.config.default_deadline_ms));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("invalid browser config: {}", err))
        })
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError> {
        let config = self.browser_config()?;
        let launch_timeout = Duration::from_millis(self.config.launch_timeout_ms);
        let (browser, mut handler) = timeout(launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("timed out launching chromium")
            })?
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("failed to launch chromium: {}", err))
            })?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_closed = Arc::clone(&closed);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(?err, "chromium handler event error");
                }
            }
            handler_closed.store(true, Ordering::SeqCst);
            debug!("chromium handler loop finished");
        });

        let page = browser.new_page("about:blank").await.map_err(|err| {
            AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("failed to open page: {}", err))
        })?;

        let session = ChromiumSession::new(browser, page, handler_task, closed);
        session.start_network_tracking().await?;
        info!("opened chromium session");
        Ok(Box::new(session))
    }
}

enum NetworkEvent {
    Started(String),
    Settled(String),
}

/// In-flight request ids.
///
/// Start and settle events arrive on separate CDP listeners, so a settle can be observed
/// before its start. Such ids are remembered and the late start is dropped.
#[derive(Debug, Default)]
struct RequestLedger {
    inflight: HashSet<String>,
    settled_early: HashSet<String>,
}

impl RequestLedger {
    fn started(&mut self, id: String) {
        if !self.settled_early.remove(&id) {
            self.inflight.insert(id);
        }
    }

    fn settled(&mut self, id: String) {
        if !self.inflight.remove(&id) {
            self.settled_early.insert(id);
        }
    }

    fn len(&self) -> usize {
        self.inflight.len()
    }
}

/// A single page in a dedicated browser process.
pub struct ChromiumSession {
    browser: AsyncMutex<Option<Browser>>,
    page: Page,
    closed: Arc<AtomicBool>,
    inflight: Arc<Mutex<RequestLedger>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumSession {
    fn new(
        browser: Browser,
        page: Page,
        handler_task: JoinHandle<()>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            browser: AsyncMutex::new(Some(browser)),
            page,
            closed,
            inflight: Arc::new(Mutex::new(RequestLedger::default())),
            tasks: Mutex::new(vec![handler_task]),
        }
    }

    async fn start_network_tracking(&self) -> Result<(), AdapterError> {
        let sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|err| self.map_cdp(err))?;
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|err| self.map_cdp(err))?;
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|err| self.map_cdp(err))?;

        let started = sent.map(|event| NetworkEvent::Started(event.request_id.inner().clone()));
        let settled = stream::select(
            finished.map(|event| NetworkEvent::Settled(event.request_id.inner().clone())),
            failed.map(|event| NetworkEvent::Settled(event.request_id.inner().clone())),
        );
        let mut events = Box::pin(stream::select(started, settled));

        let ledger = Arc::clone(&self.inflight);
        let tracker = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let mut ledger = ledger.lock();
                match event {
                    NetworkEvent::Started(id) => ledger.started(id),
                    NetworkEvent::Settled(id) => ledger.settled(id),
                }
            }
        });

        self.tasks.lock().push(tracker);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::SessionClosed));
        }
        Ok(())
    }

    fn map_cdp(&self, err: CdpError) -> AdapterError {
        if self.closed.load(Ordering::SeqCst) {
            AdapterError::new(AdapterErrorKind::SessionClosed).with_hint(err.to_string())
        } else {
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())
        }
    }

    async fn eval(&self, script: String) -> Result<Value, AdapterError> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| self.map_cdp(err))?;
        result.into_value::<Value>().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unexpected script result: {}", err))
        })
    }

    /// Run `body` against the first match of `anchor`; `body` sees `el` and returns a status.
    async fn with_element(
        &self,
        anchor: &AnchorDescriptor,
        require_interactable: bool,
        body: &str,
    ) -> Result<Value, AdapterError> {
        let script = format!(
            "(() => {{\n  const el = {query}[0];\n  if (!el) {{ return {{ status: 'missing' }}; }}\n  if ({check}) {{\n    const style = window.getComputedStyle(el);\n    const rect = el.getBoundingClientRect();\n    const visible = style.visibility !== 'hidden' && style.display !== 'none' && (rect.width > 0 || rect.height > 0);\n    if (!visible || el.disabled === true) {{ return {{ status: 'not-interactable' }}; }}\n  }}\n  {body}\n}})()",
            query = anchor.to_js_query(),
            check = require_interactable,
            body = body,
        );
        let value = self.eval(script).await?;
        check_status(&value, anchor)?;
        Ok(value)
    }
}

fn check_status(value: &Value, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
    match value.get("status").and_then(|v| v.as_str()).unwrap_or("unknown") {
        "ok" => Ok(()),
        "missing" => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
            .with_hint(format!("no element for {}", anchor))),
        "not-interactable" => Err(AdapterError::new(AdapterErrorKind::NotInteractable)
            .with_hint(format!("{} is hidden or disabled", anchor))),
        "option-missing" => Err(AdapterError::new(AdapterErrorKind::OptionNotFound)
            .with_hint(format!("no matching option in {}", anchor))),
        other => Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("unexpected status '{}' for {}", other, anchor))),
    }
}

const DISPATCH_CHANGE: &str = "el.dispatchEvent(new Event('input', { bubbles: true }));\n  el.dispatchEvent(new Event('change', { bubbles: true }));";

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError> {
        self.ensure_open()?;
        debug!(url = %url, "navigating");
        match timeout(deadline, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(self.map_cdp(err)),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("navigation to {} exceeded {:?}", url, deadline))),
        }
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        self.ensure_open()?;
        let url = self.page.url().await.map_err(|err| self.map_cdp(err))?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        let value = self.eval("document.title".to_string()).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn inspect(&self, anchor: &AnchorDescriptor) -> Result<ElementState, AdapterError> {
        let script = format!(
            "(() => {{\n  const matches = {query};\n  const el = matches[0];\n  if (!el) {{ return {{ count: 0, visible: false, enabled: false, value: null, text: null }}; }}\n  const style = window.getComputedStyle(el);\n  const rect = el.getBoundingClientRect();\n  const visible = style.visibility !== 'hidden' && style.display !== 'none' && (rect.width > 0 || rect.height > 0);\n  const enabled = !(el.disabled === true || el.getAttribute('aria-disabled') === 'true');\n  const value = ('value' in el) ? String(el.value ?? '') : null;\n  const text = (el.innerText || el.textContent || '').trim();\n  return {{ count: matches.length, visible, enabled, value, text }};\n}})()",
            query = anchor.to_js_query(),
        );
        let value = self.eval(script).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("malformed element state: {}", err))
        })
    }

    async fn fill(&self, anchor: &AnchorDescriptor, value: &str) -> Result<(), AdapterError> {
        let body = format!(
            "el.focus();\n  el.value = {value};\n  {dispatch}\n  return {{ status: 'ok' }};",
            value = js_literal(value),
            dispatch = DISPATCH_CHANGE,
        );
        self.with_element(anchor, true, &body).await.map(|_| ())
    }

    async fn click(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        let body = "el.scrollIntoView({ block: 'center' });\n  el.click();\n  return { status: 'ok' };";
        self.with_element(anchor, true, body).await.map(|_| ())
    }

    async fn list_options(
        &self,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<SelectOptionEntry>, AdapterError> {
        let body = "const options = Array.from(el.options || []).map(o => ({ value: o.value ?? '', label: (o.textContent || '').trim() }));\n  return { status: 'ok', options };";
        let value = self.with_element(anchor, false, body).await?;
        let options = value.get("options").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(options).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("malformed option list: {}", err))
        })
    }

    async fn select_option(
        &self,
        anchor: &AnchorDescriptor,
        choice: &OptionChoice,
    ) -> Result<(), AdapterError> {
        let predicate = match choice {
            OptionChoice::Value(value) => format!("(o.value ?? '') === {}", js_literal(value)),
            OptionChoice::Label(label) => {
                format!("(o.textContent || '').trim() === {}", js_literal(label))
            }
        };
        let body = format!(
            "const opt = Array.from(el.options || []).find(o => {predicate});\n  if (!opt) {{ return {{ status: 'option-missing' }}; }}\n  el.value = opt.value;\n  opt.selected = true;\n  {dispatch}\n  return {{ status: 'ok' }};",
            predicate = predicate,
            dispatch = DISPATCH_CHANGE,
        );
        self.with_element(anchor, true, &body).await.map(|_| ())
    }

    async fn dispatch_change(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        let body = format!("{}\n  return {{ status: 'ok' }};", DISPATCH_CHANGE);
        self.with_element(anchor, false, &body).await.map(|_| ())
    }

    async fn hide(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        let script = format!(
            "(() => {{\n  const matches = {query};\n  if (!matches.length) {{ return {{ status: 'missing' }}; }}\n  matches.forEach(el => {{ el.style.display = 'none'; }});\n  return {{ status: 'ok' }};\n}})()",
            query = anchor.to_js_query(),
        );
        let value = self.eval(script).await?;
        check_status(&value, anchor)
    }

    async fn inflight_requests(&self) -> Result<u32, AdapterError> {
        self.ensure_open()?;
        Ok(self.inflight.lock().len() as u32)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        self.ensure_open()?;
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|err| self.map_cdp(err))
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ());
                if let Err(err) = browser.wait().await {
                    warn!(?err, "chromium process did not exit cleanly");
                }
                closed.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint(format!("failed to close browser: {}", err))
                })
            }
            None => Ok(()),
        };
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("closed chromium session");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::RequestLedger;

    #[test]
    fn ledger_counts_requests_until_they_settle() {
        let mut ledger = RequestLedger::default();
        ledger.started("1".into());
        ledger.started("2".into());
        assert_eq!(ledger.len(), 2);
        ledger.settled("1".into());
        assert_eq!(ledger.len(), 1);
        ledger.settled("2".into());
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn settle_seen_before_start_does_not_leave_a_phantom_request() {
        let mut ledger = RequestLedger::default();
        ledger.settled("7".into());
        ledger.started("7".into());
        assert_eq!(ledger.len(), 0);

        // The tombstone is consumed, so a reused id is tracked again.
        ledger.started("7".into());
        assert_eq!(ledger.len(), 1);
    }
}

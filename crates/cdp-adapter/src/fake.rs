//! Scripted in-memory session for tests.
//!
//! A [`FakeBrowser`] holds one page model shared by every session it hands out. Tests seed
//! elements and options, register effects that fire (optionally after a delay) when the engine
//! clicks, fills, selects or navigates, then inspect what the engine did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::anchor::AnchorDescriptor;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::session::{BrowserSession, ElementState, OptionChoice, SelectOptionEntry, SessionFactory};

/// Mutation applied to the page model when a trigger fires.
pub type Effect = Arc<dyn Fn(&mut FakePage) + Send + Sync>;

/// Engine operations an effect can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    Navigate(String),
    Click(String),
    Fill(String),
    Select(String),
    DispatchChange(String),
}

impl Trigger {
    pub fn navigate(url: impl Into<String>) -> Self {
        Trigger::Navigate(url.into())
    }

    pub fn click(anchor: &AnchorDescriptor) -> Self {
        Trigger::Click(anchor.to_string())
    }

    pub fn fill(anchor: &AnchorDescriptor) -> Self {
        Trigger::Fill(anchor.to_string())
    }

    pub fn select(anchor: &AnchorDescriptor) -> Self {
        Trigger::Select(anchor.to_string())
    }

    pub fn dispatch_change(anchor: &AnchorDescriptor) -> Self {
        Trigger::DispatchChange(anchor.to_string())
    }
}

/// The page model. Elements are keyed by the anchor's display form.
#[derive(Debug, Default)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    pub elements: HashMap<String, ElementState>,
    pub options: HashMap<String, Vec<SelectOptionEntry>>,
    pub inflight: u32,
    pub closed: bool,
    pub fail_screenshots: bool,
    pub panic_on_inspect: Option<String>,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub selections: Vec<String>,
    pub dispatches: Vec<String>,
    pub hidden: Vec<String>,
    pub screenshots: u32,
    pub close_calls: u32,
}

impl FakePage {
    pub fn set_element(&mut self, anchor: &AnchorDescriptor, state: ElementState) {
        self.elements.insert(anchor.to_string(), state);
    }

    pub fn remove_element(&mut self, anchor: &AnchorDescriptor) {
        self.elements.remove(&anchor.to_string());
    }

    pub fn set_value(&mut self, anchor: &AnchorDescriptor, value: impl Into<String>) {
        let entry = self.elements.entry(anchor.to_string()).or_insert_with(visible);
        entry.value = Some(value.into());
    }
}

/// A rendered, enabled element.
pub fn visible() -> ElementState {
    ElementState {
        count: 1,
        visible: true,
        enabled: true,
        value: None,
        text: None,
    }
}

/// Attached to the DOM but not rendered.
pub fn hidden() -> ElementState {
    ElementState {
        count: 1,
        visible: false,
        enabled: true,
        value: None,
        text: None,
    }
}

pub fn visible_with_value(value: impl Into<String>) -> ElementState {
    ElementState {
        value: Some(value.into()),
        ..visible()
    }
}

struct ScheduledEffect {
    delay: Duration,
    effect: Effect,
}

/// Test handle over the shared page model.
#[derive(Clone)]
pub struct FakeBrowser {
    page: Arc<Mutex<FakePage>>,
    effects: Arc<Mutex<HashMap<Trigger, Vec<ScheduledEffect>>>>,
    opens: Arc<AtomicU32>,
}

impl FakeBrowser {
    pub fn new(url: impl Into<String>) -> Self {
        let page = FakePage {
            url: url.into(),
            ..FakePage::default()
        };
        Self {
            page: Arc::new(Mutex::new(page)),
            effects: Arc::new(Mutex::new(HashMap::new())),
            opens: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Mutate the page model directly.
    pub fn with_page<R>(&self, f: impl FnOnce(&mut FakePage) -> R) -> R {
        f(&mut *self.page.lock())
    }

    pub fn set_element(&self, anchor: &AnchorDescriptor, state: ElementState) {
        self.page.lock().set_element(anchor, state);
    }

    pub fn set_options(&self, anchor: &AnchorDescriptor, options: Vec<SelectOptionEntry>) {
        self.page.lock().options.insert(anchor.to_string(), options);
    }

    pub fn set_inflight(&self, inflight: u32) {
        self.page.lock().inflight = inflight;
    }

    /// Register `effect` to run `delay` after `trigger` fires. Effects run every time.
    pub fn on(
        &self,
        trigger: Trigger,
        delay: Duration,
        effect: impl Fn(&mut FakePage) + Send + Sync + 'static,
    ) {
        self.effects
            .lock()
            .entry(trigger)
            .or_default()
            .push(ScheduledEffect {
                delay,
                effect: Arc::new(effect),
            });
    }

    /// Simulate the browser going away underneath the engine.
    pub fn crash(&self) {
        self.page.lock().closed = true;
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            browser: self.clone(),
        }
    }

    pub fn factory(&self) -> FakeSessionFactory {
        FakeSessionFactory {
            browser: self.clone(),
            open_error: None,
        }
    }

    pub fn url(&self) -> String {
        self.page.lock().url.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.page.lock().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.page.lock().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.page.lock().fills.clone()
    }

    pub fn selections(&self) -> Vec<String> {
        self.page.lock().selections.clone()
    }

    pub fn dispatches(&self) -> Vec<String> {
        self.page.lock().dispatches.clone()
    }

    pub fn hidden(&self) -> Vec<String> {
        self.page.lock().hidden.clone()
    }

    pub fn screenshots(&self) -> u32 {
        self.page.lock().screenshots
    }

    pub fn close_calls(&self) -> u32 {
        self.page.lock().close_calls
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    fn fire(&self, trigger: Trigger) {
        let scheduled: Vec<(Duration, Effect)> = self
            .effects
            .lock()
            .get(&trigger)
            .map(|list| {
                list.iter()
                    .map(|item| (item.delay, Arc::clone(&item.effect)))
                    .collect()
            })
            .unwrap_or_default();

        for (delay, effect) in scheduled {
            if delay.is_zero() {
                effect(&mut *self.page.lock());
            } else {
                let page = Arc::clone(&self.page);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    effect(&mut *page.lock());
                });
            }
        }
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.page.lock().closed {
            return Err(AdapterError::new(AdapterErrorKind::SessionClosed));
        }
        Ok(())
    }

    fn interactable(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        let page = self.page.lock();
        match page.elements.get(&anchor.to_string()) {
            Some(state) if state.is_present() && state.visible && state.enabled => Ok(()),
            Some(state) if state.is_present() => Err(AdapterError::new(
                AdapterErrorKind::NotInteractable,
            )
            .with_hint(anchor.to_string())),
            _ => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(anchor.to_string())),
        }
    }

    fn present(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        let page = self.page.lock();
        match page.elements.get(&anchor.to_string()) {
            Some(state) if state.is_present() => Ok(()),
            _ => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(anchor.to_string())),
        }
    }
}

/// Session view over a [`FakeBrowser`].
pub struct FakeSession {
    browser: FakeBrowser,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        {
            let mut page = self.browser.page.lock();
            page.navigations.push(url.to_string());
            page.url = url.to_string();
        }
        self.browser.fire(Trigger::navigate(url));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        self.browser.ensure_open()?;
        Ok(self.browser.url())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        self.browser.ensure_open()?;
        Ok(self.browser.page.lock().title.clone())
    }

    async fn inspect(&self, anchor: &AnchorDescriptor) -> Result<ElementState, AdapterError> {
        self.browser.ensure_open()?;
        let key = anchor.to_string();
        let (state, should_panic) = {
            let page = self.browser.page.lock();
            (
                page.elements.get(&key).cloned(),
                page.panic_on_inspect.as_deref() == Some(key.as_str()),
            )
        };
        if should_panic {
            panic!("scripted panic while inspecting {}", key);
        }
        Ok(state.unwrap_or_else(ElementState::missing))
    }

    async fn fill(&self, anchor: &AnchorDescriptor, value: &str) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        self.browser.interactable(anchor)?;
        {
            let mut page = self.browser.page.lock();
            page.fills.push((anchor.to_string(), value.to_string()));
            page.set_value(anchor, value);
        }
        self.browser.fire(Trigger::fill(anchor));
        Ok(())
    }

    async fn click(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        self.browser.interactable(anchor)?;
        self.browser.page.lock().clicks.push(anchor.to_string());
        self.browser.fire(Trigger::click(anchor));
        Ok(())
    }

    async fn list_options(
        &self,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<SelectOptionEntry>, AdapterError> {
        self.browser.ensure_open()?;
        self.browser.present(anchor)?;
        let page = self.browser.page.lock();
        Ok(page
            .options
            .get(&anchor.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn select_option(
        &self,
        anchor: &AnchorDescriptor,
        choice: &OptionChoice,
    ) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        self.browser.interactable(anchor)?;
        {
            let mut page = self.browser.page.lock();
            let key = anchor.to_string();
            let picked = page.options.get(&key).and_then(|options| {
                options
                    .iter()
                    .find(|option| match choice {
                        OptionChoice::Value(value) => &option.value == value,
                        OptionChoice::Label(label) => option.label.trim() == label.trim(),
                    })
                    .cloned()
            });
            let picked = picked.ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::OptionNotFound).with_hint(key.clone())
            })?;
            page.selections.push(picked.value.clone());
            page.set_value(anchor, picked.value);
        }
        self.browser.fire(Trigger::select(anchor));
        Ok(())
    }

    async fn dispatch_change(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        self.browser.present(anchor)?;
        self.browser.page.lock().dispatches.push(anchor.to_string());
        self.browser.fire(Trigger::dispatch_change(anchor));
        Ok(())
    }

    async fn hide(&self, anchor: &AnchorDescriptor) -> Result<(), AdapterError> {
        self.browser.ensure_open()?;
        self.browser.present(anchor)?;
        let mut page = self.browser.page.lock();
        let key = anchor.to_string();
        page.hidden.push(key.clone());
        if let Some(state) = page.elements.get_mut(&key) {
            state.visible = false;
        }
        Ok(())
    }

    async fn inflight_requests(&self) -> Result<u32, AdapterError> {
        self.browser.ensure_open()?;
        Ok(self.browser.page.lock().inflight)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        self.browser.ensure_open()?;
        let mut page = self.browser.page.lock();
        if page.fail_screenshots {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("scripted failure"));
        }
        page.screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let mut page = self.browser.page.lock();
        page.close_calls += 1;
        page.closed = true;
        Ok(())
    }
}

/// Hands out sessions over one shared [`FakeBrowser`].
pub struct FakeSessionFactory {
    browser: FakeBrowser,
    open_error: Option<AdapterError>,
}

impl FakeSessionFactory {
    /// A factory whose every `open` fails with `error`.
    pub fn failing(browser: &FakeBrowser, error: AdapterError) -> Self {
        Self {
            browser: browser.clone(),
            open_error: Some(error),
        }
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, AdapterError> {
        self.browser.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        // Every open is a fresh session over the same scripted page.
        self.browser.page.lock().closed = false;
        Ok(Box::new(self.browser.session()))
    }
}

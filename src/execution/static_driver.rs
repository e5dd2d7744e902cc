//! In-process [`BrowserDriver`] serving one fixed HTML document
//!
//! Selectors are matched against the document with `scraper`; a selector
//! that never matches keeps `wait_for_selector` pending so callers' timeouts
//! fire. Page actions are recorded for inspection and the number of pages
//! open at once is tracked.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use scraper::{Html, Selector};

use super::browser::{BrowserDriver, BrowserPage, PageSettings};
use crate::error::TaskError;
use crate::models::{AntiDetectionSettings, FormDataEntry};

#[derive(Debug, Default)]
struct DriverState {
    html: String,
    navigation_delay: Duration,
    fail_launch: bool,
    launched: AtomicBool,
    open_pages: AtomicUsize,
    peak_open_pages: AtomicUsize,
    closed_pages: AtomicUsize,
    actions: Mutex<Vec<String>>,
    last_settings: Mutex<Option<PageSettings>>,
}

#[derive(Debug, Clone)]
pub struct StaticPageDriver {
    state: Arc<DriverState>,
}

impl StaticPageDriver {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            state: Arc::new(DriverState {
                html: html.into(),
                ..DriverState::default()
            }),
        }
    }

    /// Delay every navigation; combine with paused time in tests
    pub fn with_navigation_delay(self, delay: Duration) -> Self {
        self.rebuild(|state| state.navigation_delay = delay)
    }

    pub fn failing_launch(self) -> Self {
        self.rebuild(|state| state.fail_launch = true)
    }

    fn rebuild(self, apply: impl FnOnce(&mut DriverState)) -> Self {
        let mut state = DriverState {
            html: self.state.html.clone(),
            navigation_delay: self.state.navigation_delay,
            fail_launch: self.state.fail_launch,
            ..DriverState::default()
        };
        apply(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.actions.lock().clone()
    }

    pub fn is_launched(&self) -> bool {
        self.state.launched.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.state.open_pages.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open pages seen
    pub fn peak_open_pages(&self) -> usize {
        self.state.peak_open_pages.load(Ordering::SeqCst)
    }

    pub fn closed_pages(&self) -> usize {
        self.state.closed_pages.load(Ordering::SeqCst)
    }

    pub fn last_settings(&self) -> Option<PageSettings> {
        self.state.last_settings.lock().clone()
    }
}

#[async_trait]
impl BrowserDriver for StaticPageDriver {
    async fn launch(&self, _headless: bool) -> Result<(), TaskError> {
        if self.state.fail_launch {
            return Err(TaskError::browser_launch("static driver configured to fail"));
        }
        self.state.launched.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TaskError> {
        self.state.launched.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn new_page(&self, settings: &PageSettings) -> Result<Box<dyn BrowserPage>, TaskError> {
        if !self.is_launched() {
            return Err(TaskError::not_ready("browser not launched"));
        }
        *self.state.last_settings.lock() = Some(settings.clone());
        let open = self.state.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_open_pages.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(StaticPage {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct StaticPage {
    state: Arc<DriverState>,
    closed: bool,
}

impl StaticPage {
    fn record(&self, action: impl Into<String>) {
        self.state.actions.lock().push(action.into());
    }

    fn matches(&self, selector: &str) -> Result<bool, TaskError> {
        let parsed = Selector::parse(selector)
            .map_err(|e| TaskError::validation(format!("invalid parameter: selector '{selector}': {e}")))?;
        let document = Html::parse_document(&self.state.html);
        let found = document.select(&parsed).next().is_some();
        Ok(found)
    }
}

#[async_trait]
impl BrowserPage for StaticPage {
    async fn goto(&mut self, url: &Url) -> Result<(), TaskError> {
        if !self.state.navigation_delay.is_zero() {
            tokio::time::sleep(self.state.navigation_delay).await;
        }
        self.record(format!("goto:{url}"));
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), TaskError> {
        if self.matches(selector)? {
            return Ok(());
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), TaskError> {
        self.record(format!("click:{selector}"));
        Ok(())
    }

    async fn fill(&mut self, entry: &FormDataEntry) -> Result<(), TaskError> {
        self.record(format!("fill:{}={}", entry.selector, entry.value));
        Ok(())
    }

    async fn content(&mut self) -> Result<String, TaskError> {
        Ok(self.state.html.clone())
    }

    async fn screenshot_jpeg(&mut self, _quality: u8) -> Result<Vec<u8>, TaskError> {
        self.record("screenshot");
        Ok(b"jpeg".to_vec())
    }

    async fn apply_anti_detection(
        &mut self,
        _settings: &AntiDetectionSettings,
    ) -> Result<(), TaskError> {
        self.record("anti_detection");
        Ok(())
    }

    async fn block_images(&mut self) -> Result<(), TaskError> {
        self.record("block_images");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TaskError> {
        if !self.closed {
            self.closed = true;
            self.state.open_pages.fetch_sub(1, Ordering::SeqCst);
            self.state.closed_pages.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

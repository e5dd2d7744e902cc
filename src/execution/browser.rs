//! # Browser Executor
//!
//! Headless-browser scraping behind the [`BrowserDriver`] and [`BrowserPage`]
//! seams. Every execution holds a [`ConcurrencyThrottle`] slot from before the
//! page opens until after it closes.
//!
//! Per job: proxy selection, optional anti-detection, image blocking unless
//! `loadImages`, navigation under the navigation timeout, an optional
//! `waitFor` (a timeout there only warns), clicks then form fills, extraction
//! from the rendered DOM, and an optional JPEG screenshot. The page is closed
//! on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Url;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::content::{build_output, ContentExtractor};
use super::executor::{ExecutorCapabilities, TaskExecutor};
use super::proxy::ProxyRotator;
use super::text::TextProcessor;
use super::throttle::ConcurrencyThrottle;
use crate::config::ExecutionConfig;
use crate::constants::ExecutionMethod;
use crate::error::TaskError;
use crate::models::{
    AntiDetectionSettings, ExecutionOutput, ExecutionStats, FormDataEntry, ProxySettings,
    ScrapeJob, TaskContext,
};

/// Wait applied to the extraction selector before falling back to `body`
const EXTRACTION_WAIT: Duration = Duration::from_secs(5);
const SCREENSHOT_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

/// Settings a page is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct PageSettings {
    pub proxy: Option<ProxySettings>,
    pub user_agent: String,
    pub viewport: Viewport,
    pub headless: bool,
    pub default_timeout: Duration,
}

/// Browser process owned by a [`BrowserExecutor`]
#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    async fn launch(&self, headless: bool) -> Result<(), TaskError>;

    async fn shutdown(&self) -> Result<(), TaskError>;

    async fn new_page(&self, settings: &PageSettings) -> Result<Box<dyn BrowserPage>, TaskError>;
}

/// One open tab; callers must `close` it
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &Url) -> Result<(), TaskError>;

    /// Resolves once `selector` matches; callers bound it with a timeout
    async fn wait_for_selector(&mut self, selector: &str) -> Result<(), TaskError>;

    async fn click(&mut self, selector: &str) -> Result<(), TaskError>;

    async fn fill(&mut self, entry: &FormDataEntry) -> Result<(), TaskError>;

    /// Rendered DOM as HTML
    async fn content(&mut self) -> Result<String, TaskError>;

    async fn screenshot_jpeg(&mut self, quality: u8) -> Result<Vec<u8>, TaskError>;

    async fn apply_anti_detection(
        &mut self,
        settings: &AntiDetectionSettings,
    ) -> Result<(), TaskError>;

    async fn block_images(&mut self) -> Result<(), TaskError>;

    async fn close(&mut self) -> Result<(), TaskError>;
}

pub struct BrowserExecutor {
    driver: Arc<dyn BrowserDriver>,
    throttle: ConcurrencyThrottle,
    proxies: ProxyRotator,
    extractor: ContentExtractor,
    processor: TextProcessor,
    user_agent: String,
    headless: bool,
    navigation_timeout: Duration,
    selector_timeout: Duration,
    ready: AtomicBool,
}

impl std::fmt::Debug for BrowserExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserExecutor")
            .field("throttle", &self.throttle)
            .field("headless", &self.headless)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl BrowserExecutor {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: &ExecutionConfig) -> Self {
        Self::with_rotator(driver, config, ProxyRotator::new())
    }

    pub fn with_rotator(
        driver: Arc<dyn BrowserDriver>,
        config: &ExecutionConfig,
        proxies: ProxyRotator,
    ) -> Self {
        Self {
            driver,
            throttle: ConcurrencyThrottle::new(config.max_concurrent_browsers),
            proxies,
            extractor: ContentExtractor,
            processor: TextProcessor::new(),
            user_agent: config.user_agent.clone(),
            headless: config.browser_headless,
            navigation_timeout: config.navigation_timeout(),
            selector_timeout: config.selector_timeout(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn throttle(&self) -> &ConcurrencyThrottle {
        &self.throttle
    }

    fn page_settings(&self, job: &ScrapeJob, proxy: Option<ProxySettings>) -> PageSettings {
        let custom = job
            .options
            .anti_detection
            .as_ref()
            .filter(|a| a.enabled)
            .and_then(|a| a.custom_user_agent.clone());
        let user_agent = custom
            .or_else(|| job.options.user_agent.clone())
            .unwrap_or_else(|| self.user_agent.clone());

        PageSettings {
            proxy,
            user_agent,
            viewport: Viewport::default(),
            headless: self.headless,
            default_timeout: self.navigation_timeout(job),
        }
    }

    fn navigation_timeout(&self, job: &ScrapeJob) -> Duration {
        job.options
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(self.navigation_timeout)
    }

    async fn drive(
        &self,
        page: &mut dyn BrowserPage,
        job: &ScrapeJob,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError> {
        let started = Instant::now();
        let options = &job.options;

        let anti_detection = options.anti_detection.as_ref().filter(|a| a.enabled);
        if let Some(settings) = anti_detection {
            page.apply_anti_detection(settings).await?;
            ctx.info("Anti-detection measures applied");
        }
        if !options.load_images {
            page.block_images().await?;
        }

        let navigation = self.navigation_timeout(job);
        ctx.info(format!("Navigating to {}", job.url));
        timeout(navigation, page.goto(&job.url))
            .await
            .map_err(|_| TaskError::timeout("navigation", navigation.as_millis() as u64))??;

        if let Some(selector) = options.wait_for.as_deref().filter(|s| !s.trim().is_empty()) {
            ctx.info(format!("Waiting for selector: {selector}"));
            match timeout(self.selector_timeout, page.wait_for_selector(selector)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => ctx.warn(format!("Wait for selector '{selector}' failed: {e}")),
                Err(_) => ctx.warn(format!(
                    "Selector '{selector}' not found within {}ms",
                    self.selector_timeout.as_millis()
                )),
            }
        }

        for click in options.clicks.iter().flatten() {
            ctx.info(format!("Clicking: {}", click.selector));
            page.click(&click.selector).await?;
            if let Some(wait) = click.wait_after.filter(|ms| *ms > 0) {
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
        }

        for entry in options.form_data.iter().flatten() {
            ctx.info(format!("Filling form field: {}", entry.selector));
            page.fill(entry).await?;
        }

        if let Some(selector) = job.selector.as_deref() {
            if timeout(EXTRACTION_WAIT, page.wait_for_selector(selector))
                .await
                .map_or(true, |r| r.is_err())
            {
                ctx.warn(format!(
                    "Selector '{selector}' not found, extracting the page body"
                ));
            }
        }

        let html = page.content().await?;
        let mut content = self.extractor.extract(&html, job.selector.as_deref())?;

        if options.screenshot {
            let bytes = page.screenshot_jpeg(SCREENSHOT_QUALITY).await?;
            ctx.info(format!("Screenshot captured ({} bytes)", bytes.len()));
            content.screenshot = Some(STANDARD.encode(bytes));
        }

        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let mut stats = ExecutionStats::new(ExecutionMethod::Browser)
            .with("antiDetectionUsed", yes_no(anti_detection.is_some()));
        stats.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(build_output(job, content, &self.processor, stats, ctx))
    }
}

#[async_trait]
impl TaskExecutor for BrowserExecutor {
    fn method(&self) -> ExecutionMethod {
        ExecutionMethod::Browser
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities::FULL
    }

    fn is_available(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Browser jobs are reached through method resolution only
    fn can_handle(&self, _job: &ScrapeJob) -> bool {
        false
    }

    async fn initialize(&self) -> Result<(), TaskError> {
        if self.is_available() {
            return Ok(());
        }
        self.driver
            .launch(self.headless)
            .await
            .map_err(|e| TaskError::browser_launch(e.to_string()))?;
        self.ready.store(true, Ordering::Release);
        info!(
            max_concurrent = self.throttle.max(),
            headless = self.headless,
            "Browser executor initialized"
        );
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), TaskError> {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.driver.shutdown().await?;
        info!("Browser executor released");
        Ok(())
    }

    async fn execute(
        &self,
        job: &ScrapeJob,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError> {
        if !self.is_available() {
            return Err(TaskError::not_ready("browser executor not initialized"));
        }

        let _permit = self.throttle.acquire().await?;
        debug!(
            task_id = %job.task_id,
            active = self.throttle.active(),
            max = self.throttle.max(),
            "Browser slot acquired"
        );
        ctx.info(format!("Starting browser scraping for URL: {}", job.url));

        let proxy = self.proxies.select(&job.options);
        if let Some(proxy) = &proxy {
            self.proxies.log_proxy_use(proxy, ctx);
        }
        let proxy_used = proxy.is_some();

        let settings = self.page_settings(job, proxy);
        let mut page = self.driver.new_page(&settings).await?;
        let result = self.drive(page.as_mut(), job, ctx).await;
        if let Err(e) = page.close().await {
            warn!(task_id = %job.task_id, error = %e, "Failed to close browser page");
        }

        let mut output = result?;
        output.stats = output
            .stats
            .with("proxyUsed", if proxy_used { "yes" } else { "no" });
        ctx.info(format!(
            "Browser scraping completed in {}ms",
            output.stats.execution_time_ms
        ));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::StaticPageDriver;
    use crate::models::Task;
    use serde_json::{json, Value};

    const PAGE: &str = r#"<html><body><div id="app"><p class="price">42</p></div></body></html>"#;

    fn job(selector: Option<&str>, options: Value) -> ScrapeJob {
        let mut task = Task::new("job-1", "scrape")
            .with_field("url", json!("https://example.com/app"))
            .with_field("data", json!({ "options": options }));
        if let Some(selector) = selector {
            task = task.with_field("selector", json!(selector));
        }
        ScrapeJob::from_task(&task).unwrap()
    }

    async fn ready_executor(driver: &StaticPageDriver, config: &ExecutionConfig) -> BrowserExecutor {
        let executor = BrowserExecutor::new(Arc::new(driver.clone()), config);
        executor.initialize().await.unwrap();
        executor
    }

    #[tokio::test]
    async fn test_full_interaction_flow() {
        let driver = StaticPageDriver::new(PAGE);
        let executor = ready_executor(&driver, &ExecutionConfig::default()).await;
        let job = job(
            Some(".price"),
            json!({
                "waitFor": "#app",
                "clicks": [{"selector": "#more", "waitAfter": 10}],
                "formData": [{"selector": "#q", "value": "rust"}],
                "screenshot": true,
                "proxy": {"server": "http://proxy:3128"}
            }),
        );
        let mut ctx = TaskContext::for_task(&Task::new("job-1", "scrape"));

        let output = executor.execute(&job, &mut ctx).await.unwrap();

        assert_eq!(output.payload["text"], "42");
        assert_eq!(output.payload["screenshot"], STANDARD.encode(b"jpeg"));
        assert_eq!(output.stats.method, ExecutionMethod::Browser);
        assert_eq!(output.stats.extra["proxyUsed"], "yes");
        assert_eq!(output.stats.extra["antiDetectionUsed"], "no");
        assert_eq!(
            driver.actions(),
            vec![
                "block_images".to_string(),
                "goto:https://example.com/app".to_string(),
                "click:#more".to_string(),
                "fill:#q=rust".to_string(),
                "screenshot".to_string(),
            ]
        );
        assert_eq!(driver.closed_pages(), 1);
        assert_eq!(driver.last_settings().unwrap().proxy.unwrap().server, "http://proxy:3128");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_wait_for_only_warns() {
        let driver = StaticPageDriver::new(PAGE);
        let executor = ready_executor(&driver, &ExecutionConfig::default()).await;
        let mut ctx = TaskContext::for_task(&Task::new("job-1", "scrape"));

        let output = executor
            .execute(&job(None, json!({"waitFor": "#never"})), &mut ctx)
            .await
            .unwrap();

        assert!(output.payload["text"].as_str().unwrap().contains("42"));
        assert!(ctx
            .logs()
            .iter()
            .any(|l| l.message.contains("'#never' not found")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_closes_page() {
        let driver = StaticPageDriver::new(PAGE).with_navigation_delay(Duration::from_secs(60));
        let executor = ready_executor(&driver, &ExecutionConfig::default()).await;
        let mut ctx = TaskContext::for_task(&Task::new("job-1", "scrape"));

        let err = executor
            .execute(&job(None, json!({"timeout": 1000})), &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Timeout { timeout_ms: 1000, .. }));
        assert!(!err.is_permanent());
        assert_eq!(driver.closed_pages(), 1);
        assert_eq!(executor.throttle().active(), 0);
    }

    #[tokio::test]
    async fn test_anti_detection_and_images() {
        let driver = StaticPageDriver::new(PAGE);
        let executor = ready_executor(&driver, &ExecutionConfig::default()).await;
        let mut ctx = TaskContext::for_task(&Task::new("job-1", "scrape"));
        let job = job(
            None,
            json!({
                "loadImages": true,
                "antiDetection": {"enabled": true, "customUserAgent": "bot/1.0"}
            }),
        );

        let output = executor.execute(&job, &mut ctx).await.unwrap();

        assert_eq!(output.stats.extra["antiDetectionUsed"], "yes");
        assert_eq!(output.stats.extra["proxyUsed"], "no");
        assert_eq!(driver.actions()[0], "anti_detection");
        assert!(!driver.actions().contains(&"block_images".to_string()));
        assert_eq!(driver.last_settings().unwrap().user_agent, "bot/1.0");
    }

    #[tokio::test]
    async fn test_launch_failure_is_transient() {
        let driver = StaticPageDriver::new(PAGE).failing_launch();
        let executor = BrowserExecutor::new(Arc::new(driver), &ExecutionConfig::default());
        let err = executor.initialize().await.unwrap_err();
        assert!(matches!(err, TaskError::BrowserLaunch { .. }));
        assert!(!executor.is_available());
    }

    #[tokio::test]
    async fn test_never_claims_jobs() {
        let driver = StaticPageDriver::new(PAGE);
        let executor = ready_executor(&driver, &ExecutionConfig::default()).await;
        assert!(!executor.can_handle(&job(None, json!({"method": "browser"}))));
        executor.cleanup().await.unwrap();
        assert!(!executor.is_available());
        assert!(!driver.is_launched());
    }
}

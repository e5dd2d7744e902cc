//! Scrape task handler: parses the job, routes it and runs the executor

use async_trait::async_trait;
use tracing::{info, warn};

use super::router::{SelectionReason, StrategyRouter};
use crate::constants::defaults;
use crate::error::TaskError;
use crate::models::{ExecutionOutput, ScrapeJob, Task, TaskContext};
use crate::orchestration::{MessagePatternClassifier, PermanenceClassifier, TaskHandler};

/// Message fragments that make a scrape failure permanent
pub const SCRAPER_PERMANENT_PATTERNS: &[&str] =
    &["404", "forbidden", "invalid url", "validation failed"];

#[derive(Debug)]
pub struct ScraperTaskHandler {
    router: StrategyRouter,
    classifier: MessagePatternClassifier,
}

impl ScraperTaskHandler {
    pub fn new(router: StrategyRouter) -> Self {
        Self {
            router,
            classifier: MessagePatternClassifier::new()
                .with_patterns(SCRAPER_PERMANENT_PATTERNS.iter().copied()),
        }
    }

    pub fn router(&self) -> &StrategyRouter {
        &self.router
    }

    /// Initialize every registered executor
    ///
    /// An executor that fails to start is left unavailable and skipped by
    /// routing; the number started is returned.
    pub async fn initialize_all(&self) -> usize {
        let mut started = 0;
        for executor in self.router.executors() {
            match executor.initialize().await {
                Ok(()) => started += 1,
                Err(e) => warn!(
                    method = %executor.method(),
                    error = %e,
                    "Executor failed to initialize"
                ),
            }
        }
        info!(
            started,
            registered = self.router.executors().len(),
            "Executors initialized"
        );
        started
    }

    pub async fn cleanup_all(&self) {
        for executor in self.router.executors() {
            if let Err(e) = executor.cleanup().await {
                warn!(method = %executor.method(), error = %e, "Executor cleanup failed");
            }
        }
    }
}

impl PermanenceClassifier for ScraperTaskHandler {
    fn is_permanent(&self, error: &TaskError) -> bool {
        self.classifier.is_permanent(error)
    }
}

#[async_trait]
impl TaskHandler for ScraperTaskHandler {
    fn worker_type(&self) -> &str {
        defaults::WORKER_TYPE
    }

    async fn execute(
        &self,
        task: &Task,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError> {
        let job = ScrapeJob::from_task(task)?;
        let selection = self.router.select(&job)?;
        let method = selection.executor.method();

        if selection.reason == SelectionReason::Fallback {
            let requested = selection
                .resolved_method
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            warn!(
                task_id = %task.id,
                requested = %requested,
                using = %method,
                "No executor for requested method, using fallback"
            );
            ctx.warn(format!(
                "No executor for method '{requested}', falling back to '{method}'"
            ));
        }
        ctx.info(format!("Using {method} scraping method"));
        info!(task_id = %task.id, method = %method, url = %job.url, "Executing scrape");

        selection.executor.execute(&job, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::constants::ExecutionMethod;
    use crate::execution::{BrowserExecutor, LightExecutor, StaticPageDriver};
    use serde_json::json;
    use std::sync::Arc;

    const PAGE: &str = "<html><body><h1>hello</h1></body></html>";

    fn handler(with_browser: bool) -> ScraperTaskHandler {
        let config = ExecutionConfig::default();
        let mut router = StrategyRouter::new(ExecutionMethod::Auto)
            .with_executor(Arc::new(LightExecutor::new(&config).unwrap()));
        if with_browser {
            router.register(Arc::new(BrowserExecutor::new(
                Arc::new(StaticPageDriver::new(PAGE)),
                &config,
            )));
        }
        ScraperTaskHandler::new(router)
    }

    #[test]
    fn test_scraper_patterns_are_permanent() {
        let handler = handler(false);
        assert!(handler.is_permanent(&TaskError::transient("upstream said 404")));
        assert!(handler.is_permanent(&TaskError::transient("Request Forbidden")));
        assert!(handler.is_permanent(&TaskError::transient("user not found")));
        assert!(!handler.is_permanent(&TaskError::network("connection reset")));
        assert_eq!(handler.worker_type(), "scraper");
    }

    #[tokio::test]
    async fn test_invalid_url_is_permanent() {
        let handler = handler(false);
        let task = Task::new("t", "scrape").with_field("url", json!("not a url"));
        let mut ctx = TaskContext::for_task(&task);
        let err = handler.execute(&task, &mut ctx).await.unwrap_err();
        assert!(handler.is_permanent(&err));
    }

    #[tokio::test]
    async fn test_browser_job_without_browser_is_permanent() {
        let handler = handler(false);
        handler.initialize_all().await;
        let task = Task::new("t", "scrape")
            .with_field("url", json!("https://example.com"))
            .with_field("data", json!({"options": {"screenshot": true}}));
        let mut ctx = TaskContext::for_task(&task);
        let err = handler.execute(&task, &mut ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::NoSuitableExecutor { .. }));
        assert!(handler.is_permanent(&err));
    }

    #[tokio::test]
    async fn test_routes_browser_job_and_logs_method() {
        let handler = handler(true);
        assert_eq!(handler.initialize_all().await, 2);
        let task = Task::new("t", "scrape")
            .with_field("url", json!("https://example.com"))
            .with_field("data", json!({"options": {"waitFor": "h1"}}));
        let mut ctx = TaskContext::for_task(&task);

        let output = handler.execute(&task, &mut ctx).await.unwrap();

        assert_eq!(output.stats.method, ExecutionMethod::Browser);
        assert!(ctx
            .logs()
            .iter()
            .any(|l| l.message == "Using browser scraping method"));
        handler.cleanup_all().await;
        assert!(handler.router().executors().iter().all(|e| !e.is_available()));
    }
}

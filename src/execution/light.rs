//! # Light Executor
//!
//! HTTP GET plus DOM extraction. Handles every job that needs no browser
//! feature and does not name another method. Not throttled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use tracing::{debug, info};

use super::content::{build_output, ContentExtractor};
use super::executor::{ExecutorCapabilities, TaskExecutor};
use super::text::TextProcessor;
use crate::config::ExecutionConfig;
use crate::constants::ExecutionMethod;
use crate::error::{TaskError, WorkerError};
use crate::models::{ExecutionOutput, ExecutionStats, ScrapeJob, TaskContext};

#[derive(Debug)]
pub struct LightExecutor {
    client: Client,
    user_agent: String,
    request_timeout: Duration,
    extractor: ContentExtractor,
    processor: TextProcessor,
    ready: AtomicBool,
}

impl LightExecutor {
    pub fn new(config: &ExecutionConfig) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| WorkerError::ExecutorInitialization(format!("http client: {e}")))?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            request_timeout: config.request_timeout(),
            extractor: ContentExtractor,
            processor: TextProcessor::new(),
            ready: AtomicBool::new(false),
        })
    }

    async fn fetch(&self, job: &ScrapeJob, ctx: &mut TaskContext) -> Result<String, TaskError> {
        let timeout = job
            .options
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(self.request_timeout);
        let user_agent = job.options.user_agent.as_deref().unwrap_or(&self.user_agent);

        ctx.info(format!("Making GET request to {}", job.url));
        let response = self
            .client
            .get(job.url.clone())
            .header(USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskError::http_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(e, timeout))?;
        if body.trim().is_empty() {
            return Err(TaskError::transient("Empty response from server"));
        }
        debug!(task_id = %job.task_id, bytes = body.len(), "Response received");
        Ok(body)
    }
}

fn classify_request_error(error: reqwest::Error, timeout: Duration) -> TaskError {
    if error.is_timeout() {
        TaskError::timeout("http request", timeout.as_millis() as u64)
    } else {
        TaskError::network(error.to_string())
    }
}

#[async_trait]
impl TaskExecutor for LightExecutor {
    fn method(&self) -> ExecutionMethod {
        ExecutionMethod::Light
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities::NONE
    }

    fn is_available(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn can_handle(&self, job: &ScrapeJob) -> bool {
        self.is_available()
            && !job.capabilities.requires_browser()
            && job
                .capabilities
                .method
                .as_ref()
                .is_none_or(|m| *m == ExecutionMethod::Light)
    }

    async fn initialize(&self) -> Result<(), TaskError> {
        self.ready.store(true, Ordering::Release);
        info!("Light executor initialized");
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), TaskError> {
        self.ready.store(false, Ordering::Release);
        info!("Light executor released");
        Ok(())
    }

    async fn execute(
        &self,
        job: &ScrapeJob,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError> {
        if !self.is_available() {
            return Err(TaskError::not_ready("light executor not initialized"));
        }
        let started = Instant::now();
        ctx.info(format!("Starting light scraping for URL: {}", job.url));

        let body = self.fetch(job, ctx).await?;
        let content = self.extractor.extract(&body, job.selector.as_deref())?;

        let mut stats = ExecutionStats::new(ExecutionMethod::Light);
        stats.execution_time_ms = started.elapsed().as_millis() as u64;
        let output = build_output(job, content, &self.processor, stats, ctx);

        ctx.info(format!(
            "Scraping completed in {}ms",
            output.stats.execution_time_ms
        ));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use serde_json::json;

    fn job(options: serde_json::Value) -> ScrapeJob {
        let task = Task::new("job", "scrape")
            .with_field("url", json!("http://127.0.0.1:9/unreachable"))
            .with_field("data", json!({ "options": options }));
        ScrapeJob::from_task(&task).unwrap()
    }

    #[tokio::test]
    async fn test_claims_only_plain_jobs_once_initialized() {
        let executor = LightExecutor::new(&ExecutionConfig::default()).unwrap();
        assert!(!executor.can_handle(&job(json!({}))));

        executor.initialize().await.unwrap();
        assert!(executor.can_handle(&job(json!({}))));
        assert!(executor.can_handle(&job(json!({"method": "light"}))));
        assert!(!executor.can_handle(&job(json!({"method": "browser"}))));
        assert!(!executor.can_handle(&job(json!({"screenshot": true}))));
        assert!(!executor.can_handle(&job(json!({"method": "light", "clicks": [{"selector": "a"}]}))));

        executor.cleanup().await.unwrap();
        assert!(!executor.is_available());
    }

    #[tokio::test]
    async fn test_execute_requires_initialization() {
        let executor = LightExecutor::new(&ExecutionConfig::default()).unwrap();
        let mut ctx = TaskContext::for_task(&Task::new("job", "scrape"));
        let err = executor.execute(&job(json!({})), &mut ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transient() {
        let executor = LightExecutor::new(&ExecutionConfig::default()).unwrap();
        executor.initialize().await.unwrap();
        let mut ctx = TaskContext::for_task(&Task::new("job", "scrape"));
        let err = executor
            .execute(&job(json!({"timeout": 2000})), &mut ctx)
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }
}

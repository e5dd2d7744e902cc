//! Shared harness for pipeline integration tests
//!
//! Runs a real [`WorkerManager`] over the [`InMemoryBroker`], with recording
//! reporters and a local HTTP server for the light executor.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use worker_pipeline::config::{ExecutionConfig, QueueConfig, RetryConfig};
use worker_pipeline::constants::ExecutionMethod;
use worker_pipeline::error::WorkerError;
use worker_pipeline::execution::{
    BrowserExecutor, LightExecutor, ScraperTaskHandler, StaticPageDriver, StrategyRouter,
};
use worker_pipeline::messaging::{
    Broker, DeadLetterMessage, InMemoryBroker, PublishOptions, QueueConsumer, QueueMessage,
    QueueTopology,
};
use worker_pipeline::models::{Task, TaskResult};
use worker_pipeline::orchestration::{RetryPolicy, TaskHandler, WorkerManager};
use worker_pipeline::reporting::{
    QueueResultPublisher, RecordingProgressReporter, ProgressUpdate,
};
use worker_pipeline::state_machine::TaskStatus;

pub const PAGE: &str = r#"<html><head><title>Fixture</title></head><body>
<div id="app"><h1 class="headline">Rust workers</h1><p class="price">42</p></div>
</body></html>"#;

pub fn queue_config() -> QueueConfig {
    QueueConfig {
        prefetch: 10,
        ..QueueConfig::default()
    }
}

/// Deterministic delays: 1s, 2s, 4s, ...
pub fn retry_config() -> RetryConfig {
    RetryConfig {
        jitter_factor: 0.0,
        ..RetryConfig::default()
    }
}

pub fn execution_config(max_concurrent_browsers: usize) -> ExecutionConfig {
    ExecutionConfig {
        max_concurrent_browsers,
        request_timeout_ms: 5_000,
        ..ExecutionConfig::default()
    }
}

pub struct Pipeline {
    pub broker: InMemoryBroker,
    pub topology: QueueTopology,
    pub worker: Arc<WorkerManager<QueueConsumer<InMemoryBroker>>>,
    pub reporter: RecordingProgressReporter,
    running: JoinHandle<Result<(), WorkerError>>,
}

impl Pipeline {
    pub async fn start(handler: Arc<dyn TaskHandler>, retry: RetryConfig) -> Self {
        let broker = InMemoryBroker::new();
        let topology = QueueTopology::from_config(&queue_config());
        let consumer = Arc::new(QueueConsumer::new(Arc::new(broker.clone()), topology.clone()));
        consumer.setup().await.expect("topology should declare");

        let reporter = RecordingProgressReporter::new();
        let publisher =
            QueueResultPublisher::from_topology(consumer.clone()).expect("result queue configured");
        let policy = RetryPolicy::with_rng(retry, 7).expect("valid retry config");
        let worker = Arc::new(
            WorkerManager::new(consumer, handler, policy)
                .with_reporter(Arc::new(reporter.clone()))
                .with_result_publisher(Arc::new(publisher)),
        );
        let running = tokio::spawn(worker.clone().run());

        Self {
            broker,
            topology,
            worker,
            reporter,
            running,
        }
    }

    pub async fn submit(&self, task: &Task) {
        let body = task.to_bytes().expect("task should serialize");
        self.submit_raw(&body).await;
    }

    pub async fn submit_raw(&self, body: &[u8]) {
        self.broker
            .publish(self.topology.main_queue(), body, PublishOptions::persistent())
            .await
            .expect("publish to main queue");
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterMessage> {
        self.broker
            .peek_messages(self.topology.dead_letter_queue())
            .iter()
            .map(|body| DeadLetterMessage::from_bytes(body).expect("dead letter should decode"))
            .collect()
    }

    pub fn results(&self) -> Vec<TaskResult> {
        let queue = self.topology.result_queue().expect("result queue configured");
        self.broker
            .peek_messages(queue)
            .iter()
            .map(|body| TaskResult::from_bytes(body).expect("result should decode"))
            .collect()
    }

    pub fn retry_queue_tasks(&self) -> Vec<Task> {
        self.broker
            .peek_messages(self.topology.retry_queue())
            .iter()
            .map(|body| Task::from_bytes(body).expect("retry task should decode"))
            .collect()
    }

    pub fn statuses(&self, task_id: &str) -> Vec<TaskStatus> {
        self.reporter.statuses_for(task_id)
    }

    pub fn last_update(&self, task_id: &str) -> Option<ProgressUpdate> {
        self.reporter.updates_for(task_id).pop()
    }

    /// Poll `condition` until it holds, failing the test after `limit`
    pub async fn wait_for(&self, limit: Duration, condition: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + limit;
        while !condition(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached within {limit:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn stop(self) -> InMemoryBroker {
        self.worker.shutdown();
        self.running
            .await
            .expect("worker task should not panic")
            .expect("worker should stop cleanly");
        self.broker
    }
}

/// Scrape handler with a real light executor and, optionally, a browser
/// executor driving `driver`
pub async fn scraper_handler(
    driver: Option<StaticPageDriver>,
    execution: &ExecutionConfig,
) -> Arc<ScraperTaskHandler> {
    let mut router = StrategyRouter::new(ExecutionMethod::Auto).with_executor(Arc::new(
        LightExecutor::new(execution).expect("light executor should build"),
    ));
    if let Some(driver) = driver {
        router.register(Arc::new(BrowserExecutor::new(Arc::new(driver), execution)));
    }
    let handler = Arc::new(ScraperTaskHandler::new(router));
    handler.initialize_all().await;
    handler
}

pub fn scrape_task(id: &str, url: &str, options: Value) -> Task {
    Task::new(id, "scrape")
        .with_field("url", json!(url))
        .with_field("data", json!({ "options": options }))
}

/// Minimal HTTP/1.1 server answering every request with `status` and `body`
///
/// Returns the base URL; the server runs until the test runtime stops.
pub async fn serve_html(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    503 => "Service Unavailable",
                    _ => "Status",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}/page")
}

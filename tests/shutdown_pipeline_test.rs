//! # Shutdown Tests
//!
//! A shutdown request stops new deliveries, lets in-flight tasks finish and
//! closes the broker. A worker whose broker goes away on its own stops with
//! an error instead of idling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::Instant;
use worker_pipeline::error::WorkerError;
use worker_pipeline::execution::StaticPageDriver;
use worker_pipeline::messaging::{Broker as _, InMemoryBroker, QueueConsumer, QueueTopology};
use worker_pipeline::orchestration::{RetryPolicy, WorkerManager};
use worker_pipeline::state_machine::TaskStatus;

use common::{
    execution_config, queue_config, retry_config, scrape_task, scraper_handler, Pipeline, PAGE,
};

async fn standalone_worker(
    broker: &InMemoryBroker,
) -> Arc<WorkerManager<QueueConsumer<InMemoryBroker>>> {
    let consumer = Arc::new(QueueConsumer::new(
        Arc::new(broker.clone()),
        QueueTopology::from_config(&queue_config()),
    ));
    let handler = scraper_handler(None, &execution_config(1)).await;
    let policy = RetryPolicy::new(retry_config()).expect("valid retry config");
    Arc::new(WorkerManager::new(consumer, handler, policy))
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_task_finishes_after_shutdown() {
    let driver = StaticPageDriver::new(PAGE).with_navigation_delay(Duration::from_secs(2));
    let handler = scraper_handler(Some(driver.clone()), &execution_config(1)).await;
    let pipeline = Pipeline::start(handler, retry_config()).await;
    let reporter = pipeline.reporter.clone();
    let topology = pipeline.topology.clone();

    let started = Instant::now();
    pipeline
        .submit(&scrape_task("slow", "https://example.com/app", json!({"waitFor": "#app"})))
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipeline.statuses("slow"), vec![TaskStatus::Processing]);

    pipeline.worker.shutdown();
    pipeline
        .submit(&scrape_task("late", "https://example.com/late", json!({})))
        .await;
    let broker = pipeline.stop().await;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(
        reporter.statuses_for("slow"),
        vec![TaskStatus::Processing, TaskStatus::Completed]
    );
    assert_eq!(driver.closed_pages(), 1);

    let results = topology.result_queue().expect("result queue configured");
    assert_eq!(broker.peek_messages(results).len(), 1);

    // The late task was never taken and stays on the main queue for the next worker
    assert!(reporter.statuses_for("late").is_empty());
    assert_eq!(broker.queue_length(topology.main_queue()), 1);
    assert_eq!(broker.unacked_count(topology.main_queue()), 0);
    assert!(broker.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_signal_stops_worker_cleanly() {
    let broker = InMemoryBroker::new();
    let worker = standalone_worker(&broker).await;

    let (tx, rx) = oneshot::channel::<()>();
    let running = tokio::spawn(worker.clone().run_until(async {
        let _ = rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!running.is_finished());

    tx.send(()).expect("worker still listening");
    let outcome = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker should stop")
        .expect("worker task should not panic");

    assert!(outcome.is_ok());
    assert!(worker.is_shutting_down());
    assert!(broker.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_lost_broker_stops_worker_with_error() {
    let broker = InMemoryBroker::new();
    let worker = standalone_worker(&broker).await;

    let running = tokio::spawn(worker.clone().run_until(std::future::pending()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!running.is_finished());

    broker.close().await.expect("close broker");
    let outcome = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker should not idle without a broker")
        .expect("worker task should not panic");

    assert!(matches!(outcome, Err(WorkerError::StoppedUnexpectedly)));
    assert!(!worker.is_shutting_down());
}

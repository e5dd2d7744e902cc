//! Scraper Worker Binary
//!
//! Consumes scrape tasks from RabbitMQ until SIGINT or SIGTERM, then drains
//! in-flight tasks and exits. If the worker stops on its own (broker
//! connection lost, topology setup failed) the process exits with its error.
//!
//! No browser driver is compiled into this binary. Jobs that require a
//! browser are routed to the dead-letter queue as unroutable unless an
//! embedding application registers a [`BrowserExecutor`] with its own
//! [`BrowserDriver`].
//!
//! [`BrowserExecutor`]: worker_pipeline::execution::BrowserExecutor
//! [`BrowserDriver`]: worker_pipeline::execution::BrowserDriver

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use worker_pipeline::config::ConfigManager;
use worker_pipeline::execution::{LightExecutor, ScraperTaskHandler, StrategyRouter};
use worker_pipeline::logging::init_structured_logging;
use worker_pipeline::messaging::{QueueConsumer, QueueTopology, RabbitMqBroker};
use worker_pipeline::orchestration::{RetryPolicy, WorkerManager};
use worker_pipeline::reporting::{
    GraphqlProgressReporter, LoggingProgressReporter, ProgressReporter, QueueResultPublisher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("loading worker configuration")?;
    let config = manager.config();
    init_structured_logging(&config.logging);

    info!(
        source = ?manager.source_file(),
        config = %manager.debug_config(),
        "Configuration loaded"
    );

    let broker = RabbitMqBroker::connect(&config.queue.url)
        .await
        .context("connecting to RabbitMQ")?;
    let consumer = Arc::new(QueueConsumer::new(
        Arc::new(broker),
        QueueTopology::from_config(&config.queue),
    ));

    let light = LightExecutor::new(&config.execution).context("building light executor")?;
    let router =
        StrategyRouter::new(config.execution.default_method.clone()).with_executor(Arc::new(light));
    let handler = Arc::new(ScraperTaskHandler::new(router));
    if handler.initialize_all().await == 0 {
        anyhow::bail!("no executor could be initialized");
    }
    warn!("No browser driver available; browser-only jobs will be dead-lettered");

    let reporter: Arc<dyn ProgressReporter> = match config.reporting.graphql_url {
        Some(_) => Arc::new(
            GraphqlProgressReporter::new(&config.reporting)
                .context("building GraphQL progress reporter")?,
        ),
        None => {
            info!("No GraphQL endpoint configured, progress updates are logged only");
            Arc::new(LoggingProgressReporter)
        }
    };

    let retry_policy = RetryPolicy::new(config.retry.clone()).context("building retry policy")?;
    let mut worker =
        WorkerManager::new(consumer.clone(), handler.clone(), retry_policy).with_reporter(reporter);
    if let Some(publisher) = QueueResultPublisher::from_topology(consumer) {
        worker = worker.with_result_publisher(Arc::new(publisher));
    }
    let worker = Arc::new(worker);

    let outcome = worker.run_until(shutdown_signal()).await;
    handler.cleanup_all().await;

    if let Err(e) = &outcome {
        error!(error = %e, "Worker stopped with an error");
    }
    outcome.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Worker Pipeline
//!
//! Queue-driven task worker with delayed retries, dead-lettering and
//! capability-based executor routing, shipped with a web scraping handler.
//!
//! ## Overview
//!
//! Tasks arrive as JSON on a durable queue. Each delivery is handed to a
//! [`WorkerManager`], which runs the task through its handler and settles it
//! in exactly one place: a result on success, the retry queue after a
//! transient failure, or the dead-letter queue once retries are exhausted or
//! the failure is permanent. Retries are delayed by the broker itself through
//! a dead-letter exchange and per-message TTL.
//!
//! ## Module Organization
//!
//! - [`messaging`] - queue topology, broker abstraction and the consumer
//! - [`orchestration`] - retry policy, permanence classification, worker manager
//! - [`execution`] - strategy router, light and browser executors, throttle
//! - [`reporting`] - progress updates and result publishing
//! - [`models`] - task, result and scrape job types
//! - [`state_machine`] - task lifecycle states and transitions
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use worker_pipeline::config::ConfigManager;
//! use worker_pipeline::execution::{LightExecutor, ScraperTaskHandler, StrategyRouter};
//! use worker_pipeline::messaging::{QueueConsumer, QueueTopology, RabbitMqBroker};
//! use worker_pipeline::orchestration::{RetryPolicy, WorkerManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let broker = RabbitMqBroker::connect(&config.queue.url).await?;
//! let consumer = Arc::new(QueueConsumer::new(
//!     Arc::new(broker),
//!     QueueTopology::from_config(&config.queue),
//! ));
//!
//! let router = StrategyRouter::new(config.execution.default_method.clone())
//!     .with_executor(Arc::new(LightExecutor::new(&config.execution)?));
//! let handler = ScraperTaskHandler::new(router);
//! handler.initialize_all().await;
//!
//! let worker = Arc::new(WorkerManager::new(
//!     consumer,
//!     Arc::new(handler),
//!     RetryPolicy::new(config.retry.clone())?,
//! ));
//! worker.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod reporting;
pub mod state_machine;

pub use config::{ConfigManager, WorkerConfig};
pub use constants::{events, ExecutionMethod};
pub use error::{ErrorCategory, Result, TaskError, WorkerError};
pub use execution::{
    BrowserExecutor, LightExecutor, RoutingError, ScraperTaskHandler, StrategyRouter, TaskExecutor,
};
pub use messaging::{Broker, InMemoryBroker, QueueConsumer, QueueTopology, RabbitMqBroker};
pub use models::{ExecutionOutput, ScrapeJob, Task, TaskContext, TaskResult};
pub use orchestration::{RetryDecision, RetryPolicy, TaskHandler, WorkerManager};
pub use reporting::{ProgressReporter, ProgressUpdate, ResultPublisher};
pub use state_machine::TaskStatus;

//! # Worker Manager
//!
//! Drives one task through its lifecycle:
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED
//!                       -> RETRY_SCHEDULED   (schedule_retry, retryCount + 1)
//!                       -> FAILED            (send_to_dead_letter_queue)
//! ```
//!
//! Each transition is checked by [`TaskStateMachine`] and followed by a
//! best-effort progress update. Reporter and result-publisher failures are
//! logged and never change the outcome. The task is rerouted (retry queue
//! or DLQ) before its RETRY_SCHEDULED or FAILED update goes out. A failure to
//! reroute is returned as an error so the consumer requeues the delivery
//! unchanged, and nothing terminal has been announced.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::error_classifier::PermanenceClassifier;
use super::retry_policy::{RetryDecision, RetryPolicy};
use crate::constants::{defaults, events};
use crate::error::{TaskError, WorkerError};
use crate::logging::log_task_operation;
use crate::messaging::{Broker, DeliveryHandler, QueueConsumer, TaskDisposition, TaskQueue};
use crate::models::{ExecutionOutput, Task, TaskContext, TaskResult};
use crate::reporting::{
    LoggingProgressReporter, NoopResultPublisher, ProgressReporter, ProgressUpdate,
    ResultPublisher,
};
use crate::state_machine::{TaskEvent, TaskStateMachine};

/// Domain logic plugged into the worker
#[async_trait]
pub trait TaskHandler: PermanenceClassifier + 'static {
    /// Short name used in logs, e.g. `scraper`
    fn worker_type(&self) -> &str;

    /// `currentStep` reported when processing starts
    fn initial_step(&self, _task: &Task) -> String {
        defaults::INITIAL_STEP.to_string()
    }

    async fn execute(
        &self,
        task: &Task,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError>;
}

/// Counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    processed: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

pub struct WorkerManager<Q: TaskQueue> {
    queue: Arc<Q>,
    handler: Arc<dyn TaskHandler>,
    retry_policy: RetryPolicy,
    reporter: Arc<dyn ProgressReporter>,
    result_publisher: Arc<dyn ResultPublisher>,
    shutdown_tx: watch::Sender<bool>,
    stats: StatsCounters,
}

impl<Q: TaskQueue> std::fmt::Debug for WorkerManager<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("worker_type", &self.handler.worker_type())
            .field("retry_policy", &self.retry_policy)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<Q: TaskQueue> WorkerManager<Q> {
    /// Progress goes to the log and results are dropped until replaced
    pub fn new(queue: Arc<Q>, handler: Arc<dyn TaskHandler>, retry_policy: RetryPolicy) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            handler,
            retry_policy,
            reporter: Arc::new(LoggingProgressReporter),
            result_publisher: Arc::new(NoopResultPublisher),
            shutdown_tx,
            stats: StatsCounters::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_result_publisher(mut self, publisher: Arc<dyn ResultPublisher>) -> Self {
        self.result_publisher = publisher;
        self
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.stats.processed.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            retried: self.stats.retried.load(Ordering::Relaxed),
            dead_lettered: self.stats.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Ask a running [`WorkerManager::run`] to stop after in-flight tasks
    pub fn shutdown(&self) {
        info!(worker_type = self.handler.worker_type(), "🛑 Shutdown requested");
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Run one task to a terminal outcome for this attempt
    pub async fn process_task(&self, task: Task) -> Result<TaskDisposition, WorkerError> {
        let mut machine = TaskStateMachine::new(task.id.clone());
        machine.transition(TaskEvent::Dequeue)?;
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let mut ctx = TaskContext::for_task(&task);
        log_task_operation(
            events::TASK_DEQUEUED,
            &task.id,
            ctx.attempt(),
            machine.current_state(),
            Some(self.handler.worker_type()),
        );
        self.report(
            &task.id,
            ProgressUpdate::processing(task.retry_count(), self.handler.initial_step(&task)),
        )
        .await;
        ctx.info(format!("Attempt {} started", ctx.attempt()));

        match self.handler.execute(&task, &mut ctx).await {
            Ok(output) => self.complete(task, machine, ctx, output).await,
            Err(error) => self.fail(task, machine, ctx, error).await,
        }
    }

    async fn complete(
        &self,
        task: Task,
        mut machine: TaskStateMachine,
        mut ctx: TaskContext,
        mut output: ExecutionOutput,
    ) -> Result<TaskDisposition, WorkerError> {
        machine.transition(TaskEvent::Succeed)?;
        if output.stats.execution_time_ms == 0 {
            output.stats.execution_time_ms = ctx.elapsed_ms();
        }
        ctx.info(format!(
            "Completed in {}ms via {}",
            output.stats.execution_time_ms, output.stats.method
        ));

        let result = TaskResult::success(task.id.clone(), output);
        let serialized = serde_json::to_string(&result).unwrap_or_else(|e| {
            warn!(task_id = %task.id, error = %e, "Result could not be serialized for progress");
            String::from("null")
        });

        self.report(
            &task.id,
            ProgressUpdate::completed(serialized, ctx.logs().to_vec()),
        )
        .await;

        if let Err(e) = self.result_publisher.publish(&result).await {
            warn!(task_id = %task.id, error = %e, "Result publish failed");
        }

        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        log_task_operation(
            events::TASK_COMPLETED,
            &task.id,
            ctx.attempt(),
            machine.current_state(),
            None,
        );
        Ok(TaskDisposition::Completed)
    }

    async fn fail(
        &self,
        task: Task,
        mut machine: TaskStateMachine,
        mut ctx: TaskContext,
        error: TaskError,
    ) -> Result<TaskDisposition, WorkerError> {
        let message = error.to_string();
        ctx.error(format!("Attempt {} failed: {message}", ctx.attempt()));

        let decision = self
            .retry_policy
            .decide(&error, task.retry_count(), self.handler.as_ref());

        match decision {
            RetryDecision::Retry { delay } => {
                let requeued = self.queue.schedule_retry(&task, delay).await?;
                machine.transition(TaskEvent::ScheduleRetry {
                    delay_ms: delay.as_millis() as u64,
                })?;

                let next_retry = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                ctx.warn(format!(
                    "Retry {}/{} scheduled in {}ms",
                    requeued.retry_count(),
                    self.retry_policy.max_retries(),
                    delay.as_millis()
                ));

                self.report(
                    &task.id,
                    ProgressUpdate::retry_scheduled(
                        requeued.retry_count(),
                        message.clone(),
                        next_retry,
                        ctx.logs().to_vec(),
                    ),
                )
                .await;

                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                log_task_operation(
                    events::TASK_RETRY_SCHEDULED,
                    &task.id,
                    ctx.attempt(),
                    machine.current_state(),
                    Some(&message),
                );
                Ok(TaskDisposition::Rerouted)
            }
            RetryDecision::Exhausted | RetryDecision::Permanent => {
                let reason = if decision == RetryDecision::Permanent {
                    format!("permanent {} error", error.error_code())
                } else {
                    format!("retries exhausted after {} attempts", ctx.attempt())
                };
                // FAILED is terminal; announce it only once the task left the main queue
                self.queue.send_to_dead_letter_queue(&task, &message).await?;
                machine.transition(TaskEvent::Fail(message.clone()))?;
                ctx.error(format!("Giving up: {reason}"));

                self.report(
                    &task.id,
                    ProgressUpdate::failed(message.clone(), ctx.logs().to_vec()),
                )
                .await;

                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                error!(
                    task_id = %task.id,
                    attempt = ctx.attempt(),
                    reason = %reason,
                    error = %message,
                    "❌ Task failed"
                );
                log_task_operation(
                    events::TASK_FAILED,
                    &task.id,
                    ctx.attempt(),
                    machine.current_state(),
                    Some(&reason),
                );
                Ok(TaskDisposition::Rerouted)
            }
        }
    }

    async fn report(&self, task_id: &str, update: ProgressUpdate) {
        if let Err(e) = self.reporter.report(task_id, &update).await {
            warn!(
                task_id = %task_id,
                status = %update.status,
                error = %e,
                "Progress report failed"
            );
        }
    }
}

#[async_trait]
impl<Q: TaskQueue> DeliveryHandler for WorkerManager<Q> {
    async fn handle(&self, task: Task) -> Result<TaskDisposition, WorkerError> {
        self.process_task(task).await
    }
}

impl<B: Broker> WorkerManager<QueueConsumer<B>> {
    /// Declare the topology, consume until shutdown, then close the broker
    pub async fn run(self: Arc<Self>) -> Result<(), WorkerError> {
        self.queue.setup().await?;
        info!(
            worker_type = self.handler.worker_type(),
            main_queue = %self.queue.topology().main_queue(),
            "🚀 Worker started"
        );

        let consumed = self
            .queue
            .consume(self.clone(), self.shutdown_signal())
            .await;
        let closed = self.queue.close().await;

        let stats = self.stats();
        info!(
            processed = stats.processed,
            completed = stats.completed,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            "🛑 Worker stopped"
        );

        consumed?;
        closed?;
        Ok(())
    }

    /// [`WorkerManager::run`] until `signal` resolves, then drain and stop
    ///
    /// Returns [`WorkerError::StoppedUnexpectedly`] when consumption ends
    /// before any shutdown was requested, e.g. the broker dropped the
    /// delivery stream.
    pub async fn run_until<F>(self: Arc<Self>, signal: F) -> Result<(), WorkerError>
    where
        F: Future<Output = ()>,
    {
        let run = self.clone().run();
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => {
                outcome?;
                if self.is_shutting_down() {
                    Ok(())
                } else {
                    warn!(
                        worker_type = self.handler.worker_type(),
                        "Worker stopped without a shutdown request"
                    );
                    Err(WorkerError::StoppedUnexpectedly)
                }
            }
            () = signal => {
                info!("Shutdown signal received, draining in-flight tasks");
                self.shutdown();
                run.await
            }
        }
    }
}

//! # Queue Consumer
//!
//! Composes broker primitives into the worker's delivery protocol:
//!
//! | Outcome of a delivery                      | Broker action            |
//! |--------------------------------------------|--------------------------|
//! | handler returns `Completed`                | ack                      |
//! | handler returns `Rerouted` (retry or DLQ)  | ack                      |
//! | body is not a valid task                   | nack, requeue            |
//! | handler returns `Err` (dispatch failure)   | nack, requeue            |
//!
//! A requeued delivery comes back unchanged: its `retryCount` is untouched.
//! Malformed bodies are requeued without bound.
//!
//! The consumer never decides between retry and dead-letter; it only carries
//! out what the handler already did through [`TaskQueue`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::broker::{Broker, PublishOptions, RawDelivery};
use super::errors::MessagingError;
use super::message::{DeadLetterMessage, QueueMessage};
use super::topology::QueueTopology;
use crate::constants::events;
use crate::error::WorkerError;
use crate::logging::log_task_operation;
use crate::models::{Task, TaskResult};
use crate::state_machine::TaskStatus;

/// How a successfully handled delivery left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDisposition {
    Completed,
    /// Already republished to the retry queue or the dead-letter queue
    Rerouted,
}

/// Receives every decoded task
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// `Err` means the task could not be dispatched at all; the delivery is
    /// requeued as-is.
    async fn handle(&self, task: Task) -> Result<TaskDisposition, WorkerError>;
}

/// Queue operations the lifecycle orchestrator relies on
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Republish with `retryCount + 1` behind a per-message delay; returns the
    /// task exactly as requeued
    async fn schedule_retry(&self, task: &Task, delay: Duration) -> Result<Task, MessagingError>;

    /// Terminal, one-way publish to the dead-letter queue
    async fn send_to_dead_letter_queue(&self, task: &Task, error: &str) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryOutcome {
    Acked,
    Requeued,
    BrokerFailure,
}

pub struct QueueConsumer<B: Broker> {
    broker: Arc<B>,
    topology: QueueTopology,
    closed: AtomicBool,
}

impl<B: Broker> std::fmt::Debug for QueueConsumer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("provider", &self.broker.provider_name())
            .field("topology", &self.topology)
            .finish()
    }
}

impl<B: Broker> QueueConsumer<B> {
    pub fn new(broker: Arc<B>, topology: QueueTopology) -> Self {
        Self {
            broker,
            topology,
            closed: AtomicBool::new(false),
        }
    }

    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }

    /// Declare the queues and retry exchange
    pub async fn setup(&self) -> Result<(), MessagingError> {
        self.broker.declare(&self.topology).await
    }

    /// Consume the main queue until `shutdown` flips to `true`
    ///
    /// Every delivery runs as its own tokio task; the broker's prefetch is the
    /// only concurrency bound. On shutdown no new deliveries are taken and
    /// in-flight tasks are awaited before returning.
    pub async fn consume<H: DeliveryHandler>(
        &self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MessagingError> {
        let queue = self.topology.main_queue().to_string();
        let mut deliveries = self.broker.deliveries(&queue, self.topology.prefetch).await?;
        let mut in_flight: JoinSet<DeliveryOutcome> = JoinSet::new();
        let mut stream_error = None;

        info!(
            queue = %queue,
            prefetch = self.topology.prefetch,
            provider = self.broker.provider_name(),
            "🚀 Consuming tasks"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Shutdown wins over a ready delivery
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        in_flight.spawn(process_delivery(
                            self.broker.clone(),
                            handler.clone(),
                            delivery,
                        ));
                    }
                    Some(Err(e)) => {
                        error!(queue = %queue, error = %e, "Delivery stream failed");
                        stream_error = Some(e);
                        break;
                    }
                    None => {
                        info!(queue = %queue, "Delivery stream ended");
                        break;
                    }
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(deliveries);
        let pending = in_flight.len();
        if pending > 0 {
            info!(pending, "⏳ Waiting for in-flight tasks");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!(queue = %queue, "🛑 Consumer stopped");

        match stream_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Requeue a task behind a delay
    ///
    /// This is the only place `retryCount` changes.
    pub async fn schedule_retry(&self, task: &Task, delay: Duration) -> Result<Task, MessagingError> {
        let requeued = task.next_retry();
        let body = requeued.to_bytes()?;

        self.broker
            .publish(
                self.topology.retry_queue(),
                &body,
                PublishOptions::persistent().with_expiration(delay),
            )
            .await?;

        info!(
            task_id = %requeued.id,
            retry_count = requeued.retry_count(),
            delay_ms = delay.as_millis() as u64,
            queue = %self.topology.retry_queue(),
            "🔁 Retry scheduled"
        );
        Ok(requeued)
    }

    pub async fn send_to_dead_letter_queue(&self, task: &Task, error: &str) -> Result<(), MessagingError> {
        let message = DeadLetterMessage::new(task.clone(), error);
        let body = message.to_bytes()?;

        self.broker
            .publish(
                self.topology.dead_letter_queue(),
                &body,
                PublishOptions::persistent(),
            )
            .await?;

        warn!(
            task_id = %task.id,
            retry_count = task.retry_count(),
            error = %error,
            queue = %self.topology.dead_letter_queue(),
            "☠️ Task sent to dead-letter queue"
        );
        Ok(())
    }

    pub async fn publish_result(&self, queue: &str, result: &TaskResult) -> Result<(), MessagingError> {
        let body = result.to_bytes()?;
        self.broker
            .publish(queue, &body, PublishOptions::persistent())
            .await?;
        debug!(task_id = %result.task_id, queue = %queue, "Result published");
        Ok(())
    }

    /// Close the broker. Idempotent.
    pub async fn close(&self) -> Result<(), MessagingError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.broker.close().await
    }
}

#[async_trait]
impl<B: Broker> TaskQueue for QueueConsumer<B> {
    async fn schedule_retry(&self, task: &Task, delay: Duration) -> Result<Task, MessagingError> {
        QueueConsumer::schedule_retry(self, task, delay).await
    }

    async fn send_to_dead_letter_queue(&self, task: &Task, error: &str) -> Result<(), MessagingError> {
        QueueConsumer::send_to_dead_letter_queue(self, task, error).await
    }
}

async fn process_delivery<B: Broker, H: DeliveryHandler>(
    broker: Arc<B>,
    handler: Arc<H>,
    delivery: RawDelivery,
) -> DeliveryOutcome {
    let dispatched = match Task::from_bytes(&delivery.body) {
        Ok(task) => {
            debug!(
                task_id = %task.id,
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                "Delivery decoded"
            );
            if delivery.redelivered {
                log_task_operation(
                    events::TASK_REDELIVERED,
                    &task.id,
                    task.attempt(),
                    TaskStatus::Pending,
                    Some(&delivery.queue),
                );
            }
            handler.handle(task).await.map_err(|e| e.to_string())
        }
        Err(e) => Err(format!("malformed message body: {e}")),
    };

    match dispatched {
        Ok(disposition) => match broker.ack(&delivery).await {
            Ok(()) => {
                debug!(delivery_tag = delivery.delivery_tag, ?disposition, "Delivery acked");
                DeliveryOutcome::Acked
            }
            Err(e) => {
                warn!(delivery_tag = delivery.delivery_tag, error = %e, "Ack failed");
                DeliveryOutcome::BrokerFailure
            }
        },
        Err(reason) => {
            warn!(
                delivery_tag = delivery.delivery_tag,
                reason = %reason,
                "Requeueing delivery unchanged"
            );
            match broker.nack(&delivery, true).await {
                Ok(()) => DeliveryOutcome::Requeued,
                Err(e) => {
                    error!(delivery_tag = delivery.delivery_tag, error = %e, "Nack failed");
                    DeliveryOutcome::BrokerFailure
                }
            }
        }
    }
}

fn log_join(joined: Result<DeliveryOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => debug!(?outcome, "Delivery finished"),
        Err(e) => error!(error = %e, "Delivery task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::messaging::providers::InMemoryBroker;
    use parking_lot::Mutex;

    fn consumer() -> (QueueConsumer<InMemoryBroker>, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        let topology = QueueTopology::from_config(&QueueConfig {
            main_queue: "main".into(),
            retry_queue: "retry".into(),
            dead_letter_queue: "dlq".into(),
            prefetch: 2,
            ..QueueConfig::default()
        });
        (QueueConsumer::new(Arc::new(broker.clone()), topology), broker)
    }

    struct Recording {
        seen: Mutex<Vec<String>>,
        result: fn() -> Result<TaskDisposition, WorkerError>,
    }

    #[async_trait]
    impl DeliveryHandler for Recording {
        async fn handle(&self, task: Task) -> Result<TaskDisposition, WorkerError> {
            self.seen.lock().push(task.id);
            (self.result)()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_retry_increments_and_sets_expiration() {
        let (consumer, broker) = consumer();
        consumer.setup().await.unwrap();

        let task = Task::new("t-1", "scrape").with_retry_count(1);
        let requeued = consumer
            .schedule_retry(&task, Duration::from_millis(2500))
            .await
            .unwrap();

        assert_eq!(requeued.retry_count(), 2);
        let stored: Task = serde_json::from_slice(&broker.peek_messages("retry")[0]).unwrap();
        assert_eq!(stored, requeued);
        assert_eq!(
            broker.pending_expirations("retry"),
            vec![Some(Duration::from_millis(2500))]
        );
    }

    #[tokio::test]
    async fn test_dead_letter_carries_error() {
        let (consumer, broker) = consumer();
        consumer.setup().await.unwrap();

        let task = Task::new("t-2", "scrape");
        consumer
            .send_to_dead_letter_queue(&task, "Resource not found")
            .await
            .unwrap();

        let stored: DeadLetterMessage =
            serde_json::from_slice(&broker.peek_messages("dlq")[0]).unwrap();
        assert_eq!(stored.task.id, "t-2");
        assert_eq!(stored.error, "Resource not found");
        assert_eq!(broker.pending_expirations("dlq"), vec![None]);
    }

    #[tokio::test]
    async fn test_consume_acks_and_stops_on_shutdown() {
        let (consumer, broker) = consumer();
        consumer.setup().await.unwrap();
        for id in ["a", "b", "c"] {
            let body = Task::new(id, "scrape").to_vec().unwrap();
            broker
                .publish("main", &body, PublishOptions::persistent())
                .await
                .unwrap();
        }

        let handler = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            result: || Ok(TaskDisposition::Completed),
        });
        let (tx, rx) = watch::channel(false);
        let consumer = Arc::new(consumer);
        let running = tokio::spawn({
            let consumer = consumer.clone();
            let handler = handler.clone();
            async move { consumer.consume(handler, rx).await }
        });

        while broker.queue_stats("main").await.unwrap().total_acked < 3 {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        running.await.unwrap().unwrap();

        let mut seen = handler.seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(broker.queue_length("main"), 0);
    }

    #[tokio::test]
    async fn test_handler_error_requeues_without_touching_retry_count() {
        let (consumer, broker) = consumer();
        consumer.setup().await.unwrap();
        let body = Task::new("x", "scrape").to_vec().unwrap();
        broker
            .publish("main", &body, PublishOptions::persistent())
            .await
            .unwrap();

        let handler = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            result: || Err(WorkerError::ShuttingDown),
        });
        let (tx, rx) = watch::channel(false);
        let consumer = Arc::new(consumer);
        let running = tokio::spawn({
            let consumer = consumer.clone();
            let handler = handler.clone();
            async move { consumer.consume(handler, rx).await }
        });

        while broker.queue_stats("main").await.unwrap().total_nacked < 2 {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        running.await.unwrap().unwrap();

        let stats = broker.queue_stats("main").await.unwrap();
        assert_eq!(stats.total_acked, 0);
        assert_eq!(broker.queue_length("retry"), 0);
        let remaining: Task = serde_json::from_slice(&broker.peek_messages("main")[0]).unwrap();
        assert_eq!(remaining.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (consumer, broker) = consumer();
        consumer.setup().await.unwrap();
        consumer.close().await.unwrap();
        consumer.close().await.unwrap();
        assert!(broker.is_closed());
    }
}

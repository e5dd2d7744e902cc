//! Result publishers backed by the broker

use std::sync::Arc;

use async_trait::async_trait;

use super::{ReportingError, ResultPublisher};
use crate::messaging::{Broker, QueueConsumer};
use crate::models::TaskResult;

/// Publishes completed results as persistent JSON messages
#[derive(Debug)]
pub struct QueueResultPublisher<B: Broker> {
    consumer: Arc<QueueConsumer<B>>,
    queue: String,
}

impl<B: Broker> QueueResultPublisher<B> {
    pub fn new(consumer: Arc<QueueConsumer<B>>, queue: impl Into<String>) -> Self {
        Self {
            consumer,
            queue: queue.into(),
        }
    }

    /// Publisher for the topology's result queue, if one is configured
    pub fn from_topology(consumer: Arc<QueueConsumer<B>>) -> Option<Self> {
        let queue = consumer.topology().result_queue()?.to_string();
        Some(Self::new(consumer, queue))
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl<B: Broker> ResultPublisher for QueueResultPublisher<B> {
    async fn publish(&self, result: &TaskResult) -> Result<(), ReportingError> {
        self.consumer.publish_result(&self.queue, result).await?;
        Ok(())
    }
}

/// Drops results when no result queue is configured
#[derive(Debug, Default, Clone)]
pub struct NoopResultPublisher;

#[async_trait]
impl ResultPublisher for NoopResultPublisher {
    async fn publish(&self, _result: &TaskResult) -> Result<(), ReportingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::constants::ExecutionMethod;
    use crate::messaging::{InMemoryBroker, QueueTopology};
    use crate::models::{ExecutionOutput, ExecutionStats};

    #[tokio::test]
    async fn test_publishes_to_result_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let topology = QueueTopology::from_config(&QueueConfig::default());
        let consumer = Arc::new(QueueConsumer::new(broker.clone(), topology));
        consumer.setup().await.unwrap();

        let publisher = QueueResultPublisher::from_topology(consumer).unwrap();
        assert_eq!(publisher.queue(), "result_queue");

        let output = ExecutionOutput {
            payload: serde_json::json!({"text": "hello"}),
            stats: ExecutionStats::new(ExecutionMethod::Light),
        };
        publisher
            .publish(&TaskResult::success("task-1", output))
            .await
            .unwrap();

        let messages = broker.peek_messages("result_queue");
        assert_eq!(messages.len(), 1);
        let json: serde_json::Value = serde_json::from_slice(&messages[0]).unwrap();
        assert_eq!(json["taskId"], "task-1");
        assert_eq!(json["success"], true);
        assert_eq!(json["stats"]["method"], "light");
    }

    #[test]
    fn test_no_publisher_without_result_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let topology = QueueTopology::from_config(&QueueConfig {
            result_queue: None,
            ..QueueConfig::default()
        });
        let consumer = Arc::new(QueueConsumer::new(broker, topology));
        assert!(QueueResultPublisher::from_topology(consumer).is_none());
    }
}

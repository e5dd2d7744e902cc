//! # Broker Abstraction
//!
//! Provider-agnostic broker primitives. The consumer layer composes these into
//! the retry and dead-letter protocol; providers only move bytes.
//!
//! Implementations:
//! - [`RabbitMqBroker`](super::providers::RabbitMqBroker) - AMQP 0.9.1 via lapin
//! - [`InMemoryBroker`](super::providers::InMemoryBroker) - in-process broker
//!   honouring the same TTL and dead-letter arguments, for tests and local runs

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::errors::MessagingError;
use super::topology::QueueTopology;

/// One message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDelivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub body: Vec<u8>,
    /// Broker-level redelivery flag. Crash recovery, not a domain retry.
    pub redelivered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOptions {
    /// Per-message TTL, sent as whole milliseconds
    pub expiration: Option<Duration>,
    pub persistent: bool,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self {
            expiration: None,
            persistent: true,
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// AMQP `expiration` property value (integer milliseconds, floored)
    pub fn expiration_property(&self) -> Option<String> {
        self.expiration.map(|d| d.as_millis().to_string())
    }
}

pub type DeliveryStream = BoxStream<'static, Result<RawDelivery, MessagingError>>;

/// Counters a broker keeps per queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
    pub in_flight_count: u64,
    pub total_sent: u64,
    pub total_received: u64,
    pub total_acked: u64,
    pub total_nacked: u64,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            ..Default::default()
        }
    }

    pub fn with_counters(mut self, sent: u64, received: u64, acked: u64, nacked: u64) -> Self {
        self.total_sent = sent;
        self.total_received = received;
        self.total_acked = acked;
        self.total_nacked = nacked;
        self
    }

    pub fn with_in_flight_count(mut self, count: u64) -> Self {
        self.in_flight_count = count;
        self
    }
}

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Declare queues, the retry exchange and its binding. Idempotent.
    async fn declare(&self, topology: &QueueTopology) -> Result<(), MessagingError>;

    /// Start consuming a queue with at most `prefetch` unacked deliveries
    async fn deliveries(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, MessagingError>;

    async fn ack(&self, delivery: &RawDelivery) -> Result<(), MessagingError>;

    async fn nack(&self, delivery: &RawDelivery, requeue: bool) -> Result<(), MessagingError>;

    /// Publish through the default exchange with the queue name as routing key
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        options: PublishOptions,
    ) -> Result<(), MessagingError>;

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, MessagingError>;

    /// Close channel and connection. Safe to call more than once.
    async fn close(&self) -> Result<(), MessagingError>;

    async fn health_check(&self) -> Result<bool, MessagingError>;

    fn provider_name(&self) -> &'static str;
}

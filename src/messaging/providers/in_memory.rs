//! # In-Memory Broker
//!
//! In-process broker for tests and local runs that honours the same topology
//! arguments a RabbitMQ deployment relies on:
//!
//! - **Per-message expiration**: a message published with an expiration is
//!   dead-lettered once it expires, using the queue's
//!   `x-dead-letter-exchange` / `x-dead-letter-routing-key`.
//! - **Direct exchanges**: bindings declared by the topology route
//!   dead-lettered messages by routing key; the empty exchange routes to the
//!   queue named by the routing key.
//! - **Prefetch**: a consumer never holds more than `prefetch` unacked
//!   deliveries.
//! - **Redelivery**: `nack(requeue = true)` puts the message back at the head
//!   of its queue with `redelivered = true`.
//!
//! Timing uses `tokio::time`, so tests running with paused time observe
//! retry delays without sleeping.
//!
//! Unlike RabbitMQ, expiry is checked for every message rather than only at
//! the queue head.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::messaging::broker::{Broker, DeliveryStream, PublishOptions, QueueStats, RawDelivery};
use crate::messaging::errors::MessagingError;
use crate::messaging::topology::{DeadLetterTarget, QueueTopology};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    expires_at: Option<Instant>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
    dead_letter: Option<DeadLetterTarget>,
    /// 0 means unlimited
    prefetch: u16,
    total_sent: u64,
    total_received: u64,
    total_acked: u64,
    total_nacked: u64,
}

impl InMemoryQueue {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.unacked.len() < self.prefetch as usize
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, InMemoryQueue>,
    /// exchange -> routing key -> queue
    bindings: HashMap<String, HashMap<String, String>>,
    next_delivery_tag: u64,
    closed: bool,
}

impl BrokerState {
    fn resolve(&self, target: &DeadLetterTarget) -> Option<String> {
        if target.exchange.is_empty() {
            return Some(target.routing_key.clone());
        }
        self.bindings
            .get(&target.exchange)
            .and_then(|routes| routes.get(&target.routing_key))
            .cloned()
    }

    /// Route a message through a queue's dead-letter target, if it has one
    fn dead_letter_from(&mut self, source: &str, mut message: StoredMessage) {
        let target = self
            .queues
            .get(source)
            .and_then(|q| q.dead_letter.clone());
        let Some(destination) = target.as_ref().and_then(|t| self.resolve(t)) else {
            trace!(queue = %source, "Dropping message without dead-letter route");
            return;
        };

        // The broker strips the expiration when dead-lettering
        message.expires_at = None;
        message.redelivered = false;

        if let Some(queue) = self.queues.get_mut(&destination) {
            debug!(from = %source, to = %destination, "Dead-lettered message");
            queue.ready.push_back(message);
            queue.total_sent += 1;
        }
    }

    /// Move every expired ready message to its dead-letter destination
    fn expire(&mut self, now: Instant) -> bool {
        let mut expired = Vec::new();
        for (name, queue) in self.queues.iter_mut() {
            let mut kept = VecDeque::with_capacity(queue.ready.len());
            for message in queue.ready.drain(..) {
                match message.expires_at {
                    Some(at) if at <= now => expired.push((name.clone(), message)),
                    _ => kept.push_back(message),
                }
            }
            queue.ready = kept;
        }

        let moved = !expired.is_empty();
        for (source, message) in expired {
            self.dead_letter_from(&source, message);
        }
        moved
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.queues
            .values()
            .flat_map(|q| q.ready.iter().filter_map(|m| m.expires_at))
            .min()
    }

    fn take(&mut self, queue_name: &str) -> Option<RawDelivery> {
        let tag = self.next_delivery_tag + 1;
        let queue = self.queues.get_mut(queue_name)?;
        if !queue.has_capacity() {
            return None;
        }
        let message = queue.ready.pop_front()?;
        queue.total_received += 1;

        let delivery = RawDelivery {
            delivery_tag: tag,
            queue: queue_name.to_string(),
            body: message.body.clone(),
            redelivered: message.redelivered,
        };
        queue.unacked.insert(tag, message);
        self.next_delivery_tag = tag;
        Some(delivery)
    }
}

/// In-process broker
///
/// Cloning shares the same state, so a test can hold a handle while the
/// worker owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    changed: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting in a queue (excludes unacked deliveries)
    pub fn queue_length(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    pub fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Bodies of the messages waiting in a queue, head first
    pub fn peek_messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Remaining time-to-live of the messages waiting in a queue, head first
    pub fn pending_expirations(&self, queue: &str) -> Vec<Option<std::time::Duration>> {
        let now = Instant::now();
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| {
                q.ready
                    .iter()
                    .map(|m| m.expires_at.map(|at| at.saturating_duration_since(now)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dead-letter anything already expired without waiting for a consumer
    pub fn process_expirations(&self) {
        let moved = self.state.lock().expire(Instant::now());
        if moved {
            self.changed.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.state.lock().closed {
            Err(MessagingError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare(&self, topology: &QueueTopology) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut state = self.state.lock();

        for declaration in topology.queues() {
            let queue = state.queues.entry(declaration.name.clone()).or_default();
            queue.dead_letter = declaration.dead_letter.clone();
        }

        let binding = &topology.retry_binding;
        state
            .bindings
            .entry(binding.exchange.clone())
            .or_default()
            .insert(binding.routing_key.clone(), binding.queue.clone());

        debug!(
            main_queue = %topology.main_queue(),
            retry_queue = %topology.retry_queue(),
            dead_letter_queue = %topology.dead_letter_queue(),
            "In-memory topology declared"
        );
        Ok(())
    }

    async fn deliveries(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, MessagingError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(MessagingError::Closed);
            }
            let entry = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| MessagingError::queue_not_found(queue))?;
            entry.prefetch = prefetch;
        }

        let seed = (self.clone(), queue.to_string());
        let deliveries = stream::unfold(seed, |(broker, queue)| async move {
            let changed = broker.changed.clone();
            loop {
                let notified = changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let next_expiry = {
                    let mut state = broker.state.lock();
                    if state.closed {
                        return None;
                    }
                    state.expire(Instant::now());
                    if let Some(delivery) = state.take(&queue) {
                        drop(state);
                        return Some((Ok(delivery), (broker, queue)));
                    }
                    state.next_expiry()
                };

                match next_expiry {
                    Some(at) => {
                        tokio::select! {
                            _ = notified => {}
                            _ = tokio::time::sleep_until(at) => {}
                        }
                    }
                    None => notified.await,
                }
            }
        });

        Ok(Box::pin(deliveries))
    }

    async fn ack(&self, delivery: &RawDelivery) -> Result<(), MessagingError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(MessagingError::Closed);
            }
            let queue = state
                .queues
                .get_mut(&delivery.queue)
                .ok_or_else(|| MessagingError::queue_not_found(&delivery.queue))?;
            if queue.unacked.remove(&delivery.delivery_tag).is_none() {
                return Err(MessagingError::ack(
                    &delivery.queue,
                    delivery.delivery_tag,
                    "unknown delivery tag",
                ));
            }
            queue.total_acked += 1;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery: &RawDelivery, requeue: bool) -> Result<(), MessagingError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(MessagingError::Closed);
            }
            let queue = state
                .queues
                .get_mut(&delivery.queue)
                .ok_or_else(|| MessagingError::queue_not_found(&delivery.queue))?;
            let Some(mut message) = queue.unacked.remove(&delivery.delivery_tag) else {
                return Err(MessagingError::nack(
                    &delivery.queue,
                    delivery.delivery_tag,
                    "unknown delivery tag",
                ));
            };
            queue.total_nacked += 1;

            if requeue {
                message.redelivered = true;
                queue.ready.push_front(message);
            } else {
                state.dead_letter_from(&delivery.queue, message);
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        options: PublishOptions,
    ) -> Result<(), MessagingError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(MessagingError::Closed);
            }
            let target = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| MessagingError::queue_not_found(queue))?;
            target.ready.push_back(StoredMessage {
                body: body.to_vec(),
                expires_at: options.expiration.map(|ttl| Instant::now() + ttl),
                redelivered: false,
            });
            target.total_sent += 1;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, MessagingError> {
        let state = self.state.lock();
        let entry = state
            .queues
            .get(queue)
            .ok_or_else(|| MessagingError::queue_not_found(queue))?;

        Ok(QueueStats::new(queue, entry.ready.len() as u64)
            .with_in_flight_count(entry.unacked.len() as u64)
            .with_counters(
                entry.total_sent,
                entry.total_received,
                entry.total_acked,
                entry.total_nacked,
            ))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        // Unacked deliveries go back to their queues, as on a channel close
        for queue in state.queues.values_mut() {
            let mut returned: Vec<_> = queue.unacked.drain().collect();
            returned.sort_by_key(|(tag, _)| *tag);
            for (_, mut message) in returned.into_iter().rev() {
                message.redelivered = true;
                queue.ready.push_front(message);
            }
        }
        drop(state);

        self.changed.notify_waiters();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        if self.is_closed() {
            Err(MessagingError::health_check("in-memory broker is closed"))
        } else {
            Ok(true)
        }
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

//! # Messaging Module
//!
//! Durable-queue delivery with delayed retries and dead-lettering, built from
//! plain broker primitives (dead-letter exchanges plus per-message TTL).
//!
//! Three layers:
//! - [`QueueTopology`] describes queues, the retry exchange and their arguments
//! - [`Broker`] moves bytes; [`RabbitMqBroker`] and [`InMemoryBroker`] implement it
//! - [`QueueConsumer`] runs the delivery protocol on top of a broker

pub mod broker;
pub mod consumer;
pub mod errors;
pub mod message;
pub mod providers;
pub mod topology;

pub use broker::{Broker, DeliveryStream, PublishOptions, QueueStats, RawDelivery};
pub use consumer::{DeliveryHandler, QueueConsumer, TaskDisposition, TaskQueue};
pub use errors::MessagingError;
pub use message::{DeadLetterMessage, QueueMessage};
pub use providers::{InMemoryBroker, RabbitMqBroker};
pub use topology::{QueueTopology, ARG_DEAD_LETTER_EXCHANGE, ARG_DEAD_LETTER_ROUTING_KEY};

//! Broker implementations

mod in_memory;
mod rabbitmq;

pub use in_memory::InMemoryBroker;
pub use rabbitmq::RabbitMqBroker;

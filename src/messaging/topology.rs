//! # Queue Topology
//!
//! Pure description of the queues and exchange that make up the delayed
//! retry mechanism. Brokers read it in `declare`; nothing here does I/O.
//!
//! ```text
//!   main queue --(reject/expire)--> retry exchange --(retry queue name)--> retry queue
//!       ^                                                                     |
//!       +------------- default exchange, routing key = main queue <--(TTL)----+
//!
//!   dead-letter queue: terminal, published to directly
//! ```
//!
//! The retry queue has no queue-level TTL. Each retry publish carries its own
//! `expiration`, so tasks with different delays share one retry queue.

use std::collections::BTreeMap;

use crate::config::QueueConfig;

pub const ARG_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
pub const ARG_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Where a queue sends messages it dead-letters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterTarget {
    /// Empty string is the broker's default exchange
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclaration {
    pub name: String,
    pub durable: bool,
    pub dead_letter: Option<DeadLetterTarget>,
}

impl QueueDeclaration {
    fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter: None,
        }
    }

    fn dead_lettering_to(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.dead_letter = Some(DeadLetterTarget {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        });
        self
    }

    /// Declaration arguments as string pairs
    pub fn arguments(&self) -> BTreeMap<&'static str, String> {
        let mut args = BTreeMap::new();
        if let Some(target) = &self.dead_letter {
            args.insert(ARG_DEAD_LETTER_EXCHANGE, target.exchange.clone());
            args.insert(ARG_DEAD_LETTER_ROUTING_KEY, target.routing_key.clone());
        }
        args
    }
}

/// Direct exchange bound to the retry queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub main: QueueDeclaration,
    pub retry: QueueDeclaration,
    pub dead_letter: QueueDeclaration,
    pub result: Option<QueueDeclaration>,
    pub retry_binding: ExchangeBinding,
    pub prefetch: u16,
}

impl QueueTopology {
    pub fn from_config(config: &QueueConfig) -> Self {
        let main = QueueDeclaration::durable(&config.main_queue)
            .dead_lettering_to(&config.retry_exchange, &config.retry_queue);
        let retry = QueueDeclaration::durable(&config.retry_queue)
            .dead_lettering_to("", &config.main_queue);
        let dead_letter = QueueDeclaration::durable(&config.dead_letter_queue);
        let result = config
            .result_queue
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(QueueDeclaration::durable);

        Self {
            retry_binding: ExchangeBinding {
                exchange: config.retry_exchange.clone(),
                queue: config.retry_queue.clone(),
                routing_key: config.retry_queue.clone(),
            },
            main,
            retry,
            dead_letter,
            result,
            prefetch: config.prefetch,
        }
    }

    pub fn main_queue(&self) -> &str {
        &self.main.name
    }

    pub fn retry_queue(&self) -> &str {
        &self.retry.name
    }

    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter.name
    }

    pub fn result_queue(&self) -> Option<&str> {
        self.result.as_ref().map(|q| q.name.as_str())
    }

    /// Every queue to declare, in declaration order
    pub fn queues(&self) -> impl Iterator<Item = &QueueDeclaration> {
        [&self.main, &self.retry, &self.dead_letter]
            .into_iter()
            .chain(self.result.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QueueConfig {
        QueueConfig {
            main_queue: "tasks".into(),
            retry_queue: "tasks-retry".into(),
            dead_letter_queue: "tasks-dlq".into(),
            retry_exchange: "retry_exchange".into(),
            result_queue: Some("results".into()),
            prefetch: 4,
            ..QueueConfig::default()
        }
    }

    #[test]
    fn test_main_queue_dead_letters_into_retry_exchange() {
        let topology = QueueTopology::from_config(&config());
        let args = topology.main.arguments();
        assert_eq!(args[ARG_DEAD_LETTER_EXCHANGE], "retry_exchange");
        assert_eq!(args[ARG_DEAD_LETTER_ROUTING_KEY], "tasks-retry");
    }

    #[test]
    fn test_retry_queue_dead_letters_back_to_main() {
        let topology = QueueTopology::from_config(&config());
        let args = topology.retry.arguments();
        assert_eq!(args[ARG_DEAD_LETTER_EXCHANGE], "");
        assert_eq!(args[ARG_DEAD_LETTER_ROUTING_KEY], "tasks");
        assert_eq!(topology.retry_binding.exchange, "retry_exchange");
        assert_eq!(topology.retry_binding.queue, "tasks-retry");
    }

    #[test]
    fn test_all_queues_durable_and_dlq_terminal() {
        let topology = QueueTopology::from_config(&config());
        assert!(topology.queues().all(|q| q.durable));
        assert!(topology.dead_letter.arguments().is_empty());
        assert_eq!(topology.queues().count(), 4);
        assert_eq!(topology.prefetch, 4);
    }

    #[test]
    fn test_result_queue_optional() {
        let mut cfg = config();
        cfg.result_queue = None;
        let topology = QueueTopology::from_config(&cfg);
        assert_eq!(topology.result_queue(), None);
        assert_eq!(topology.queues().count(), 3);
    }
}

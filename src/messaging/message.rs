//! # Queue Message Structures
//!
//! Serialization contract for anything placed on a queue, and the enriched
//! envelope written to the dead-letter queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::MessagingError;
use crate::models::Task;

/// Message serialization contract
///
/// Any serde type is JSON-encoded through the blanket implementation.
pub trait QueueMessage: Send + Sync + Clone + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError>
    where
        Self: Sized;
}

impl<T> QueueMessage for T
where
    T: Serialize + serde::de::DeserializeOwned + Send + Sync + Clone + 'static,
{
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes)
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}

/// Task as stored in the dead-letter queue
///
/// Carries every task field unchanged plus the failure that ended it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    #[serde(flatten)]
    pub task: Task,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterMessage {
    pub fn new(task: Task, error: impl Into<String>) -> Self {
        Self {
            task,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

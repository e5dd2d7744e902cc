use serde::{Deserialize, Serialize};

/// Events that drive task status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Delivery picked up by the consumer
    Dequeue,
    /// Execution returned a result
    Succeed,
    /// Transient failure with retries remaining
    ScheduleRetry { delay_ms: u64 },
    /// Permanent failure or retries exhausted
    Fail(String),
    /// Retry delay expired and the broker moved the task back to the main queue
    Requeue,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dequeue => "dequeue",
            Self::Succeed => "succeed",
            Self::ScheduleRetry { .. } => "schedule_retry",
            Self::Fail(_) => "fail",
            Self::Requeue => "requeue",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail(_))
    }
}

//! # Task Model
//!
//! The unit of work carried on the queue, plus the per-attempt execution
//! context the orchestrator threads through handlers and executors.
//!
//! ## Retry count
//!
//! `retryCount` travels inside the message body and is the single source of
//! truth for how many domain retries a task has consumed. Broker redelivery
//! flags are never folded into it: a redelivery after a crash is not a retry.
//! The only writer is `QueueConsumer::schedule_retry`, which bumps the count
//! by exactly one on the copy it republishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work as it appears on the wire
///
/// Every field not named here is kept verbatim in `payload` so producer
/// fields (`url`, `data`, `createdAt`, ...) survive a retry round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            retry_count: 0,
            priority: None,
            metadata: Map::new(),
            payload: Map::new(),
        }
    }

    /// Builder for tasks that already consumed retries (fixtures, producers)
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// 1-based attempt number of the current delivery
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Copy with the retry count advanced by one
    pub(crate) fn next_retry(&self) -> Self {
        let mut next = self.clone();
        next.retry_count = self.retry_count.saturating_add(1);
        next
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Severity of a task log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One audit entry recorded while processing a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Per-attempt execution context
///
/// Exclusively owned by the task processing it. Logs are append-only.
#[derive(Debug, Clone)]
pub struct TaskContext {
    attempt: u32,
    started_at: DateTime<Utc>,
    logs: Vec<TaskLog>,
}

impl TaskContext {
    pub fn for_task(task: &Task) -> Self {
        Self {
            attempt: task.attempt(),
            started_at: Utc::now(),
            logs: Vec::new(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn logs(&self) -> &[TaskLog] {
        &self.logs
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        self.logs.push(TaskLog {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }
}

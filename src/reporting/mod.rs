//! # Progress and Result Reporting
//!
//! Narrow outbound interfaces used by the worker manager. Every call is
//! best-effort from the pipeline's point of view: a failing reporter is
//! logged and never changes a task's outcome.
//!
//! - [`ProgressReporter`]: one update per lifecycle transition
//!   ([`GraphqlProgressReporter`], [`LoggingProgressReporter`])
//! - [`ResultPublisher`]: completed results for downstream consumers
//!   ([`QueueResultPublisher`], [`NoopResultPublisher`])

pub mod graphql;
pub mod recording;
pub mod result_queue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::messaging::MessagingError;
use crate::models::{TaskLog, TaskResult};
use crate::state_machine::TaskStatus;

pub use graphql::GraphqlProgressReporter;
pub use recording::{RecordingProgressReporter, RecordingResultPublisher};
pub use result_queue::{NoopResultPublisher, QueueResultPublisher};

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Reporter configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// Partial task state sent on every transition
///
/// Unset fields are omitted from the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Serialized result payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<TaskLog>>,
}

impl ProgressUpdate {
    fn empty(status: TaskStatus) -> Self {
        Self {
            status,
            progress: None,
            current_step: None,
            retry_count: None,
            error_message: None,
            result: None,
            last_attempt: None,
            completed_at: None,
            next_retry: None,
            failed_at: None,
            logs: None,
        }
    }

    pub fn processing(retry_count: u32, current_step: impl Into<String>) -> Self {
        Self {
            progress: Some(0),
            current_step: Some(current_step.into()),
            retry_count: Some(retry_count),
            last_attempt: Some(Utc::now()),
            ..Self::empty(TaskStatus::Processing)
        }
    }

    pub fn completed(result: String, logs: Vec<TaskLog>) -> Self {
        Self {
            progress: Some(100),
            result: Some(result),
            completed_at: Some(Utc::now()),
            logs: Some(logs),
            ..Self::empty(TaskStatus::Completed)
        }
    }

    pub fn retry_scheduled(
        retry_count: u32,
        error_message: impl Into<String>,
        next_retry: DateTime<Utc>,
        logs: Vec<TaskLog>,
    ) -> Self {
        Self {
            retry_count: Some(retry_count),
            error_message: Some(error_message.into()),
            next_retry: Some(next_retry),
            logs: Some(logs),
            ..Self::empty(TaskStatus::RetryScheduled)
        }
    }

    pub fn failed(error_message: impl Into<String>, logs: Vec<TaskLog>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            failed_at: Some(Utc::now()),
            logs: Some(logs),
            ..Self::empty(TaskStatus::Failed)
        }
    }
}

#[async_trait]
pub trait ProgressReporter: Send + Sync + 'static {
    async fn report(&self, task_id: &str, update: &ProgressUpdate) -> Result<(), ReportingError>;
}

#[async_trait]
pub trait ResultPublisher: Send + Sync + 'static {
    async fn publish(&self, result: &TaskResult) -> Result<(), ReportingError>;
}

/// Writes progress to the log when no reporting endpoint is configured
#[derive(Debug, Default, Clone)]
pub struct LoggingProgressReporter;

#[async_trait]
impl ProgressReporter for LoggingProgressReporter {
    async fn report(&self, task_id: &str, update: &ProgressUpdate) -> Result<(), ReportingError> {
        info!(
            task_id = %task_id,
            status = %update.status,
            progress = update.progress,
            retry_count = update.retry_count,
            error_message = update.error_message.as_deref(),
            "📊 Task progress"
        );
        Ok(())
    }
}

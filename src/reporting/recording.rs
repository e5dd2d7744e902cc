//! In-memory reporters that record every call, for tests and local runs

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProgressReporter, ProgressUpdate, ReportingError, ResultPublisher};
use crate::models::TaskResult;
use crate::state_machine::TaskStatus;

#[derive(Debug, Clone, Default)]
pub struct RecordingProgressReporter {
    updates: Arc<Mutex<Vec<(String, ProgressUpdate)>>>,
    fail: bool,
}

impl RecordingProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls but reports every one as failed
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<(String, ProgressUpdate)> {
        self.updates.lock().clone()
    }

    pub fn updates_for(&self, task_id: &str) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub fn statuses_for(&self, task_id: &str) -> Vec<TaskStatus> {
        self.updates_for(task_id).iter().map(|u| u.status).collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgressReporter {
    async fn report(&self, task_id: &str, update: &ProgressUpdate) -> Result<(), ReportingError> {
        self.updates
            .lock()
            .push((task_id.to_string(), update.clone()));
        if self.fail {
            return Err(ReportingError::Status {
                status: 503,
                body: "reporting unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingResultPublisher {
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl RecordingResultPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl ResultPublisher for RecordingResultPublisher {
    async fn publish(&self, result: &TaskResult) -> Result<(), ReportingError> {
        self.results.lock().push(result.clone());
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::ExecutionMethod;

/// Execution statistics attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub execution_time_ms: u64,
    pub method: ExecutionMethod,
    /// Executor-specific counters (`wordCount`, `proxyUsed`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionStats {
    pub fn new(method: ExecutionMethod) -> Self {
        Self {
            execution_time_ms: 0,
            method,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// What an executor hands back on success
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub payload: Value,
    pub stats: ExecutionStats,
}

/// Final outcome of a task, published downstream on completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub stats: ExecutionStats,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, output: ExecutionOutput) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            payload: Some(output.payload),
            error_message: None,
            stats: output.stats,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        task_id: impl Into<String>,
        error_message: impl Into<String>,
        stats: ExecutionStats,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            payload: None,
            error_message: Some(error_message.into()),
            stats,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_result_wire_format() {
        let stats = ExecutionStats::new(ExecutionMethod::Light).with("wordCount", 42);
        let result = TaskResult::success(
            "t-1",
            ExecutionOutput {
                payload: json!({"text": "hello"}),
                stats,
            },
        );

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["taskId"], json!("t-1"));
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["stats"]["method"], json!("light"));
        assert_eq!(value["stats"]["wordCount"], json!(42));
        assert!(value.get("errorMessage").is_none());
    }

    #[test]
    fn test_failure_result_has_no_payload() {
        let result = TaskResult::failure(
            "t-2",
            "Resource not found",
            ExecutionStats::new(ExecutionMethod::Browser),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("payload").is_none());
        assert_eq!(value["errorMessage"], json!("Resource not found"));
    }
}

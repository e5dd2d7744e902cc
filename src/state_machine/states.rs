use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally observed task status
///
/// Serialized in SCREAMING_SNAKE_CASE, the form the progress API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Sitting in the main queue
    #[default]
    Pending,
    /// Dequeued and executing
    Processing,
    /// Waiting in the retry queue for its delay to expire
    RetryScheduled,
    /// Finished successfully
    Completed,
    /// Dead-lettered
    Failed,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::RetryScheduled => "RETRY_SCHEDULED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "RETRY_SCHEDULED" => Ok(Self::RetryScheduled),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::RetryScheduled.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::RetryScheduled).unwrap(),
            "\"RETRY_SCHEDULED\""
        );
        assert_eq!(
            "PROCESSING".parse::<TaskStatus>().unwrap(),
            TaskStatus::Processing
        );
        assert!("processing".parse::<TaskStatus>().is_err());
    }
}

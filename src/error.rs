//! # Error Types
//!
//! Structured error handling for the worker pipeline using thiserror.
//!
//! Two families live here:
//!
//! - [`TaskError`] - failures raised while executing a single task. Every
//!   variant carries an [`ErrorCategory`] so the orchestrator can decide
//!   between scheduling a retry and dead-lettering the task.
//! - [`WorkerError`] - infrastructure failures of the worker itself
//!   (messaging, configuration, state transitions). These never describe a
//!   task outcome; the consumer answers them by requeueing the delivery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::execution::RoutingError;
use crate::messaging::MessagingError;
use crate::state_machine::StateTransitionError;

/// Whether a task failure may succeed on a later attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Will never succeed if retried (bad input, 404, no executor)
    Permanent,
    /// May succeed on retry (network, timeouts, browser launch)
    Transient,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Permanent => write!(f, "permanent"),
            ErrorCategory::Transient => write!(f, "transient"),
        }
    }
}

/// Failure raised by a task handler or executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("HTTP error: {status} {message}")]
    HttpStatus { status: u16, message: String },

    #[error("No suitable executor available: {message}")]
    NoSuitableExecutor { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timeout: {operation} did not finish within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Browser launch failed: {message}")]
    BrowserLaunch { message: String },

    #[error("Executor not ready: {message}")]
    NotReady { message: String },

    #[error("Extraction failed: {message}")]
    Extraction { message: String },

    #[error("{message}")]
    Other {
        message: String,
        category: ErrorCategory,
    },
}

impl TaskError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Map an unsuccessful HTTP status onto the taxonomy
    pub fn http_status(status: u16, reason: impl Into<String>) -> Self {
        let message = reason.into();
        match status {
            404 | 410 => Self::NotFound {
                message: format!("HTTP error: {status} {message}"),
            },
            401 | 403 => Self::Forbidden {
                message: format!("HTTP error: {status} {message}"),
            },
            _ => Self::HttpStatus { status, message },
        }
    }

    pub fn no_suitable_executor(message: impl Into<String>) -> Self {
        Self::NoSuitableExecutor {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn browser_launch(message: impl Into<String>) -> Self {
        Self::BrowserLaunch {
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Category implied by the variant alone
    ///
    /// Handlers may widen this (see `orchestration::error_classifier`), but a
    /// variant typed as permanent is never downgraded to transient.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. }
            | Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::Forbidden { .. }
            | Self::NoSuitableExecutor { .. } => ErrorCategory::Permanent,
            Self::HttpStatus { status, .. } => {
                if (400..500).contains(status) && *status != 408 && *status != 429 {
                    ErrorCategory::Permanent
                } else {
                    ErrorCategory::Transient
                }
            }
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::BrowserLaunch { .. }
            | Self::NotReady { .. }
            | Self::Extraction { .. } => ErrorCategory::Transient,
            Self::Other { category, .. } => *category,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.category() == ErrorCategory::Permanent
    }

    /// Stable code used in logs and progress updates
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::HttpStatus { .. } => "HTTP_ERROR",
            Self::NoSuitableExecutor { .. } => "NO_SUITABLE_EXECUTOR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "EXECUTION_TIMEOUT",
            Self::BrowserLaunch { .. } => "BROWSER_LAUNCH_ERROR",
            Self::NotReady { .. } => "EXECUTOR_NOT_READY",
            Self::Extraction { .. } => "EXTRACTION_ERROR",
            Self::Other { .. } => "TASK_ERROR",
        }
    }
}

impl From<RoutingError> for TaskError {
    fn from(err: RoutingError) -> Self {
        TaskError::no_suitable_executor(err.to_string())
    }
}

/// Infrastructure failure of the worker process
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    #[error("Executor initialization failed: {0}")]
    ExecutorInitialization(String),

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("Worker stopped without a shutdown request")]
    StoppedUnexpectedly,
}

pub type Result<T> = std::result::Result<T, WorkerError>;

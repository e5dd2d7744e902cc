//! # Orchestration
//!
//! Task lifecycle decisions on top of the messaging layer.
//!
//! ## Core Components
//!
//! - **WorkerManager**: runs each delivered task through execute, then
//!   complete, retry or dead-letter, reporting progress at every transition
//! - **RetryPolicy**: exponential backoff with jitter and the retry/give-up
//!   decision
//! - **PermanenceClassifier**: decides which failures are never worth
//!   retrying
//!
//! The orchestrator never talks to the broker directly; it only sees the
//! [`TaskQueue`](crate::messaging::TaskQueue) operations.

pub mod error_classifier;
pub mod retry_policy;
pub mod worker_manager;

pub use error_classifier::{
    MessagePatternClassifier, PermanenceClassifier, DEFAULT_PERMANENT_PATTERNS,
};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use worker_manager::{TaskHandler, WorkerManager, WorkerStats};

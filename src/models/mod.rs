//! # Data Models
//!
//! Wire and in-memory types for tasks, their results and scrape requests.

pub mod result;
pub mod scrape;
pub mod task;

pub use result::{ExecutionOutput, ExecutionStats, TaskResult};
pub use scrape::{
    AntiDetectionSettings, CapabilityRequest, ClickAction, FormDataEntry, FormFieldType,
    ProxyRotationSettings, ProxySettings, RotationStrategy, ScrapeJob, ScrapeOptions,
};
pub use task::{LogLevel, Task, TaskContext, TaskLog};

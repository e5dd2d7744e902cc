//! Executor contract shared by the light and browser paths

use async_trait::async_trait;

use crate::constants::ExecutionMethod;
use crate::error::TaskError;
use crate::models::{CapabilityRequest, ExecutionOutput, ScrapeJob, TaskContext};

/// Browser-only features an executor can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorCapabilities {
    pub form_fill: bool,
    pub click: bool,
    pub screenshot: bool,
    pub dynamic_wait: bool,
}

impl ExecutorCapabilities {
    /// Plain fetch and extract
    pub const NONE: Self = Self {
        form_fill: false,
        click: false,
        screenshot: false,
        dynamic_wait: false,
    };

    pub const FULL: Self = Self {
        form_fill: true,
        click: true,
        screenshot: true,
        dynamic_wait: true,
    };

    /// Whether every requirement of `request` is served
    pub fn covers(&self, request: &CapabilityRequest) -> bool {
        (!request.needs_form_fill || self.form_fill)
            && (!request.needs_click || self.click)
            && (!request.needs_screenshot || self.screenshot)
            && (!request.needs_dynamic_wait || self.dynamic_wait)
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Tag the router matches resolved methods against
    fn method(&self) -> ExecutionMethod;

    fn capabilities(&self) -> ExecutorCapabilities;

    /// Initialized and not cleaned up
    fn is_available(&self) -> bool;

    /// Claim a job outright, before any method resolution
    fn can_handle(&self, job: &ScrapeJob) -> bool;

    async fn initialize(&self) -> Result<(), TaskError>;

    async fn cleanup(&self) -> Result<(), TaskError>;

    async fn execute(
        &self,
        job: &ScrapeJob,
        ctx: &mut TaskContext,
    ) -> Result<ExecutionOutput, TaskError>;
}

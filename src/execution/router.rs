//! # Strategy Router
//!
//! Pure selection of an executor for a job. No I/O happens here.
//!
//! 1. The first registered executor whose `can_handle` claims the job wins.
//! 2. Otherwise the method is resolved: an explicit non-`auto` method on the
//!    job wins; any browser-only requirement resolves to `browser`; else the
//!    configured default applies (`auto` meaning `light`).
//! 3. The first available executor tagged with that method is used. Failing
//!    that, the first available executor whose capabilities cover the job is
//!    used as a fallback. Failing that, routing fails permanently.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::executor::TaskExecutor;
use crate::constants::ExecutionMethod;
use crate::models::{CapabilityRequest, ScrapeJob};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no suitable executor for method '{method}' ({available} of {registered} executors available)")]
    NoSuitableExecutor {
        method: ExecutionMethod,
        registered: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    ExplicitClaim,
    MethodMatch,
    /// No executor carries the resolved method; callers should warn
    Fallback,
}

#[derive(Clone)]
pub struct Selection {
    pub executor: Arc<dyn TaskExecutor>,
    pub index: usize,
    /// Method resolved for the job; `None` for explicit claims
    pub resolved_method: Option<ExecutionMethod>,
    pub reason: SelectionReason,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("executor", &self.executor.method())
            .field("index", &self.index)
            .field("resolved_method", &self.resolved_method)
            .field("reason", &self.reason)
            .finish()
    }
}

pub struct StrategyRouter {
    executors: Vec<Arc<dyn TaskExecutor>>,
    default_method: ExecutionMethod,
}

impl std::fmt::Debug for StrategyRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<_> = self.executors.iter().map(|e| e.method()).collect();
        f.debug_struct("StrategyRouter")
            .field("executors", &methods)
            .field("default_method", &self.default_method)
            .finish()
    }
}

impl StrategyRouter {
    pub fn new(default_method: ExecutionMethod) -> Self {
        Self {
            executors: Vec::new(),
            default_method,
        }
    }

    /// Append an executor; registration order is claim order
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.push(executor);
    }

    pub fn executors(&self) -> &[Arc<dyn TaskExecutor>] {
        &self.executors
    }

    pub fn default_method(&self) -> &ExecutionMethod {
        &self.default_method
    }

    pub fn resolve_method(&self, request: &CapabilityRequest) -> ExecutionMethod {
        if let Some(method) = &request.method {
            return method.clone();
        }
        if request.requires_browser() {
            return ExecutionMethod::Browser;
        }
        match &self.default_method {
            ExecutionMethod::Auto => ExecutionMethod::Light,
            other => other.clone(),
        }
    }

    pub fn select(&self, job: &ScrapeJob) -> Result<Selection, RoutingError> {
        if let Some((index, executor)) = self
            .executors
            .iter()
            .enumerate()
            .find(|(_, e)| e.can_handle(job))
        {
            return Ok(Selection {
                executor: executor.clone(),
                index,
                resolved_method: None,
                reason: SelectionReason::ExplicitClaim,
            });
        }

        let method = self.resolve_method(&job.capabilities);
        debug!(task_id = %job.task_id, method = %method, "Resolved execution method");

        let available = || {
            self.executors
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_available())
        };

        if let Some((index, executor)) = available().find(|(_, e)| e.method() == method) {
            return Ok(Selection {
                executor: executor.clone(),
                index,
                resolved_method: Some(method),
                reason: SelectionReason::MethodMatch,
            });
        }

        if let Some((index, executor)) =
            available().find(|(_, e)| e.capabilities().covers(&job.capabilities))
        {
            return Ok(Selection {
                executor: executor.clone(),
                index,
                resolved_method: Some(method),
                reason: SelectionReason::Fallback,
            });
        }

        Err(RoutingError::NoSuitableExecutor {
            method,
            registered: self.executors.len(),
            available: available().count(),
        })
    }
}

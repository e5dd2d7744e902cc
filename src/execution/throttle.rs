//! # Concurrency Throttle
//!
//! Counting semaphore bounding simultaneous browser executions. A slot is
//! held by a [`ThrottlePermit`] and released when the permit drops, on every
//! exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::TaskError;

#[derive(Debug)]
pub struct ConcurrencyThrottle {
    semaphore: Arc<Semaphore>,
    max: usize,
    active: Arc<AtomicUsize>,
}

/// One occupied slot
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyThrottle {
    /// `max` is raised to 1 if zero
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<ThrottlePermit, TaskError> {
        if self.semaphore.available_permits() == 0 {
            debug!(max = self.max, "Waiting for a free execution slot");
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TaskError::not_ready("execution throttle closed"))?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(ThrottlePermit {
            _permit: permit,
            active: self.active.clone(),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Reject new acquisitions; held permits stay valid
    pub fn close(&self) {
        self.semaphore.close();
    }
}

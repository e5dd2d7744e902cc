//! Proxy selection for browser sessions
//!
//! An explicit `proxy` on the job always wins. Otherwise, when rotation is
//! enabled with a non-empty list, one proxy is picked per job. The
//! round-robin index belongs to one rotator instance.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::models::{ProxySettings, RotationStrategy, ScrapeOptions, TaskContext};

#[derive(Debug)]
pub struct ProxyRotator {
    next_index: AtomicUsize,
    rng: Mutex<fastrand::Rng>,
}

impl Default for ProxyRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyRotator {
    pub fn new() -> Self {
        Self {
            next_index: AtomicUsize::new(0),
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            next_index: AtomicUsize::new(0),
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    pub fn select(&self, options: &ScrapeOptions) -> Option<ProxySettings> {
        if let Some(proxy) = &options.proxy {
            return Some(proxy.clone());
        }

        let rotation = options.proxy_rotation.as_ref().filter(|r| r.enabled)?;
        let proxies = &rotation.proxies;
        if proxies.is_empty() {
            return None;
        }

        let index = match rotation.rotation_strategy {
            RotationStrategy::RoundRobin => {
                self.next_index.fetch_add(1, Ordering::Relaxed) % proxies.len()
            }
            RotationStrategy::Random => self.rng.lock().usize(..proxies.len()),
        };
        proxies.get(index).cloned()
    }

    /// Record the proxy in the task log; credentials are never logged
    pub fn log_proxy_use(&self, proxy: &ProxySettings, ctx: &mut TaskContext) {
        ctx.info(format!("Using proxy: {}", proxy.server));
        info!(proxy = %proxy.server, "Using proxy");
    }
}

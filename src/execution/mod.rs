//! # Execution
//!
//! Executors and the routing that picks one per job.
//!
//! - [`StrategyRouter`] chooses an executor from a job's [`CapabilityRequest`](crate::models::CapabilityRequest)
//! - [`LightExecutor`] fetches over HTTP and extracts with CSS selectors
//! - [`BrowserExecutor`] drives a [`BrowserDriver`] under a [`ConcurrencyThrottle`]
//! - [`ScraperTaskHandler`] ties routing and executors into a task handler

pub mod browser;
pub mod content;
pub mod executor;
pub mod handler;
pub mod light;
pub mod proxy;
pub mod router;
pub mod static_driver;
pub mod text;
pub mod throttle;

pub use browser::{BrowserDriver, BrowserExecutor, BrowserPage, PageSettings, Viewport};
pub use content::{ContentExtractor, ExtractedContent};
pub use executor::{ExecutorCapabilities, TaskExecutor};
pub use handler::{ScraperTaskHandler, SCRAPER_PERMANENT_PATTERNS};
pub use light::LightExecutor;
pub use proxy::ProxyRotator;
pub use router::{RoutingError, Selection, SelectionReason, StrategyRouter};
pub use static_driver::StaticPageDriver;
pub use text::TextProcessor;
pub use throttle::{ConcurrencyThrottle, ThrottlePermit};

//! # Structured Logging
//!
//! Console output (pretty or JSON) plus an optional JSON file layer, all
//! filtered by `RUST_LOG` when set and by [`LoggingConfig::level`] otherwise.

use std::fs;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::state_machine::TaskStatus;

/// Holds the file writer guard for the life of the process
static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize the global subscriber; later calls are no-ops
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let console = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(build_filter(&config.level))
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_filter(build_filter(&config.level))
                .boxed(),
        };

        let mut guard = None;
        let mut log_file = None;
        let file_layer = config.directory.as_ref().and_then(|dir| {
            if let Err(e) = fs::create_dir_all(dir) {
                eprintln!("log directory {} unavailable: {e}", dir.display());
                return None;
            }
            let file_name = format!(
                "worker.{}.{}.log",
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            log_file = Some(dir.join(&file_name));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&config.level)),
            )
        });

        // Embedding hosts may already have installed a subscriber
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = process::id(),
            level = %config.level,
            format = ?config.format,
            log_file = ?log_file,
            "🔧 Structured logging initialized"
        );

        guard
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log a task lifecycle event
pub fn log_task_operation(
    operation: &str,
    task_id: &str,
    attempt: u32,
    status: TaskStatus,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = %task_id,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log a broker-side operation such as a retry publish or dead-lettering
pub fn log_queue_operation(operation: &str, queue: &str, task_id: Option<&str>, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        queue = %queue,
        task_id = task_id,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📬 QUEUE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

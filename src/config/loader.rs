//! Configuration Loader
//!
//! Layered loading with the `config` crate. Later layers win:
//!
//! 1. built-in defaults ([`WorkerConfig::default`])
//! 2. TOML file: `WORKER_CONFIG_PATH`, else `config/worker.toml` when present
//! 3. `WORKER__<SECTION>__<KEY>` variables, e.g. `WORKER__QUEUE__PREFETCH=4`
//! 4. flat variables used by existing deployments (`RABBITMQ_URL`,
//!    `SCRAPER_QUEUE`, `MAX_RETRIES`, ...)
//!
//! The merged result is validated before it is returned.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::WorkerConfig;

pub const CONFIG_PATH_ENV: &str = "WORKER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/worker.toml";
const ENV_PREFIX: &str = "WORKER";
const ENV_SEPARATOR: &str = "__";

/// Flat environment variables and the configuration key each one sets
pub const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("RABBITMQ_URL", "queue.url"),
    ("SCRAPER_QUEUE", "queue.main_queue"),
    ("SCRAPER_RETRY_QUEUE", "queue.retry_queue"),
    ("SCRAPER_DLQ", "queue.dead_letter_queue"),
    ("RETRY_EXCHANGE", "queue.retry_exchange"),
    ("RESULT_QUEUE", "queue.result_queue"),
    ("PREFETCH", "queue.prefetch"),
    ("MAX_RETRIES", "retry.max_retries"),
    ("INITIAL_DELAY", "retry.initial_delay_ms"),
    ("BACKOFF_FACTOR", "retry.backoff_factor"),
    ("MAX_DELAY", "retry.max_delay_ms"),
    ("JITTER_FACTOR", "retry.jitter_factor"),
    ("GRAPHQL_URL", "reporting.graphql_url"),
    ("GRAPHQL_API_KEY", "reporting.graphql_api_key"),
    ("MAX_CONCURRENT_BROWSERS", "execution.max_concurrent_browsers"),
    ("DEFAULT_SCRAPER_METHOD", "execution.default_method"),
    ("USER_AGENT", "execution.user_agent"),
    ("BROWSER_HEADLESS", "execution.browser_headless"),
    ("BROWSER_TIMEOUT", "execution.navigation_timeout_ms"),
    ("LOG_LEVEL", "logging.level"),
];

#[derive(Debug)]
pub struct ConfigManager {
    config: WorkerConfig,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from the process environment and the default file locations
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let vars: HashMap<String, String> = env::vars().collect();
        let file = vars
            .get(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.is_file().then_some(default)
            });
        Self::load_with(file.as_deref(), &vars)
    }

    /// Load from an explicit file and variable set
    ///
    /// Tests pass their own map instead of mutating the process environment.
    pub fn load_with(
        file: Option<&Path>,
        vars: &HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = Config::try_from(&WorkerConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigurationError::load_error(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigurationError::load_error(format!("{}: {e}", path.display())))?;
            let file_layer = Config::builder()
                .add_source(File::from_str(&contents, FileFormat::Toml))
                .build()
                .map_err(|e| ConfigurationError::invalid_toml(path.display().to_string(), e))?;
            builder = builder.add_source(file_layer);
            debug!(path = %path.display(), "Configuration file layered");
        }

        let scoped: HashMap<String, String> = vars
            .iter()
            .filter(|(key, _)| key.starts_with(&format!("{ENV_PREFIX}{ENV_SEPARATOR}")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(Some(scoped)),
        );

        for (var, key) in LEGACY_ENV_KEYS {
            if let Some(value) = vars.get(*var) {
                builder = builder
                    .set_override(*key, value.as_str())
                    .map_err(|e| ConfigurationError::environment_override(*var, e))?;
            }
        }

        let config: WorkerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            main_queue = %config.queue.main_queue,
            prefetch = config.queue.prefetch,
            max_retries = config.retry.max_retries,
            default_method = %config.execution.default_method,
            source_file = ?file,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source_file: file.map(Path::to_path_buf),
        }))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Configuration as JSON with credentials masked, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        sanitize_json_recursive(&mut value);
        value
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value) {
    const SENSITIVE: [&str; 4] = ["password", "secret", "key", "token"];

    if let serde_json::Value::Object(map) = value {
        for (key, val) in map.iter_mut() {
            let key_lower = key.to_lowercase();
            if SENSITIVE.iter().any(|p| key_lower.contains(p)) && !val.is_null() {
                *val = serde_json::Value::String("[MASKED]".to_string());
            } else if key_lower == "url" {
                if let Some(url) = val.as_str() {
                    *val = serde_json::Value::String(mask_credentials(url));
                }
            } else {
                sanitize_json_recursive(val);
            }
        }
    }
}

fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

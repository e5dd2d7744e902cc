//! # Scrape Job Model
//!
//! Typed view over a scrape task's payload. The options bag producers send in
//! `data.options` is parsed once into [`ScrapeOptions`], and the routing
//! inputs are computed once into a closed [`CapabilityRequest`].

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::ExecutionMethod;
use crate::error::TaskError;
use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldType {
    #[default]
    Text,
    Select,
    Checkbox,
    Radio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDataEntry {
    pub selector: String,
    pub value: String,
    #[serde(default, rename = "type")]
    pub field_type: FormFieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAction {
    pub selector: String,
    #[serde(default)]
    pub wait_after: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRotationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub proxies: Vec<ProxySettings>,
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiDetectionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub randomize_user_agent: bool,
    #[serde(default)]
    pub use_plugins: bool,
    #[serde(default)]
    pub evasion_techniques: Vec<String>,
    #[serde(default)]
    pub custom_user_agent: Option<String>,
}

/// Options a producer may attach under `data.options`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    pub method: Option<ExecutionMethod>,
    pub wait_for: Option<String>,
    /// Per-job navigation/request timeout in milliseconds
    pub timeout: Option<u64>,
    #[serde(default)]
    pub remove_html: bool,
    pub max_length: Option<usize>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub form_data: Option<Vec<FormDataEntry>>,
    pub clicks: Option<Vec<ClickAction>>,
    #[serde(default)]
    pub screenshot: bool,
    pub proxy: Option<ProxySettings>,
    pub proxy_rotation: Option<ProxyRotationSettings>,
    pub anti_detection: Option<AntiDetectionSettings>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub load_images: bool,
}

/// Closed set of requirements the router reads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityRequest {
    pub needs_form_fill: bool,
    pub needs_click: bool,
    pub needs_screenshot: bool,
    pub needs_dynamic_wait: bool,
    /// Explicit method from the job, `None` when absent or `auto`
    pub method: Option<ExecutionMethod>,
}

impl CapabilityRequest {
    pub fn from_options(options: &ScrapeOptions) -> Self {
        Self {
            needs_form_fill: options.form_data.is_some(),
            needs_click: options.clicks.is_some(),
            needs_screenshot: options.screenshot,
            needs_dynamic_wait: options
                .wait_for
                .as_deref()
                .is_some_and(|selector| !selector.trim().is_empty()),
            method: options.method.clone().filter(|m| !m.is_auto()),
        }
    }

    /// Any requirement only a browser can satisfy
    pub fn requires_browser(&self) -> bool {
        self.needs_form_fill || self.needs_click || self.needs_screenshot || self.needs_dynamic_wait
    }
}

/// Scrape request extracted from a task
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeJob {
    pub task_id: String,
    pub url: Url,
    pub selector: Option<String>,
    pub options: ScrapeOptions,
    pub capabilities: CapabilityRequest,
}

impl ScrapeJob {
    /// Parse the scrape fields of a task
    ///
    /// A missing or unparseable URL and malformed options are permanent
    /// validation failures: retrying the same payload cannot fix them.
    pub fn from_task(task: &Task) -> Result<Self, TaskError> {
        let data = task.field("data");

        let raw_url = task
            .field("url")
            .and_then(Value::as_str)
            .or_else(|| data.and_then(|d| d.get("url")).and_then(Value::as_str))
            .ok_or_else(|| TaskError::validation("validation failed: task has no url"))?;

        let url = Url::parse(raw_url)
            .map_err(|e| TaskError::invalid_input(format!("invalid url '{raw_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaskError::invalid_input(format!(
                "invalid url '{raw_url}': unsupported scheme {}",
                url.scheme()
            )));
        }

        let selector = task
            .field("selector")
            .and_then(Value::as_str)
            .or_else(|| data.and_then(|d| d.get("selector")).and_then(Value::as_str))
            .map(str::to_string);

        let options = match data.and_then(|d| d.get("options")) {
            Some(raw) if !raw.is_null() => serde_json::from_value::<ScrapeOptions>(raw.clone())
                .map_err(|e| TaskError::validation(format!("validation failed: options: {e}")))?,
            _ => ScrapeOptions::default(),
        };
        let capabilities = CapabilityRequest::from_options(&options);

        Ok(Self {
            task_id: task.id.clone(),
            url,
            selector,
            options,
            capabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_with(data: Value) -> Task {
        Task::new("job-1", "scrape")
            .with_field("url", json!("https://example.com/page"))
            .with_field("data", data)
    }

    #[test]
    fn test_plain_job_needs_no_browser() {
        let job = ScrapeJob::from_task(&task_with(json!({}))).unwrap();
        assert_eq!(job.url.as_str(), "https://example.com/page");
        assert!(!job.capabilities.requires_browser());
        assert_eq!(job.capabilities.method, None);
    }

    #[test]
    fn test_each_browser_feature_is_detected() {
        let cases = [
            json!({"formData": [{"selector": "#q", "value": "rust"}]}),
            json!({"clicks": [{"selector": "#next", "waitAfter": 200}]}),
            json!({"screenshot": true}),
            json!({"waitFor": ".loaded"}),
        ];
        for options in cases {
            let job = ScrapeJob::from_task(&task_with(json!({"options": options}))).unwrap();
            assert!(job.capabilities.requires_browser(), "{options}");
        }
    }

    #[test]
    fn test_auto_method_is_not_explicit() {
        let job =
            ScrapeJob::from_task(&task_with(json!({"options": {"method": "auto"}}))).unwrap();
        assert_eq!(job.capabilities.method, None);

        let job =
            ScrapeJob::from_task(&task_with(json!({"options": {"method": "light"}}))).unwrap();
        assert_eq!(job.capabilities.method, Some(ExecutionMethod::Light));
    }

    #[test]
    fn test_url_falls_back_to_data_url() {
        let task = Task::new("job-2", "scrape")
            .with_field("data", json!({"url": "http://example.org", "selector": "h1"}));
        let job = ScrapeJob::from_task(&task).unwrap();
        assert_eq!(job.url.host_str(), Some("example.org"));
        assert_eq!(job.selector.as_deref(), Some("h1"));
    }

    #[test]
    fn test_invalid_inputs_are_permanent() {
        let missing = Task::new("job-3", "scrape");
        assert!(ScrapeJob::from_task(&missing).unwrap_err().is_permanent());

        let bad_url = Task::new("job-4", "scrape").with_field("url", json!("not a url"));
        assert!(ScrapeJob::from_task(&bad_url).unwrap_err().is_permanent());

        let ftp = Task::new("job-5", "scrape").with_field("url", json!("ftp://example.com"));
        assert!(ScrapeJob::from_task(&ftp).unwrap_err().is_permanent());

        let bad_options = task_with(json!({"options": {"screenshot": "yes please"}}));
        assert!(ScrapeJob::from_task(&bad_options).unwrap_err().is_permanent());
    }

    #[test]
    fn test_rotation_settings_parse() {
        let job = ScrapeJob::from_task(&task_with(json!({"options": {
            "proxyRotation": {
                "enabled": true,
                "rotationStrategy": "random",
                "proxies": [{"server": "http://p1:8080"}, {"server": "http://p2:8080", "username": "u"}]
            }
        }})))
        .unwrap();
        let rotation = job.options.proxy_rotation.unwrap();
        assert_eq!(rotation.rotation_strategy, RotationStrategy::Random);
        assert_eq!(rotation.proxies.len(), 2);
    }
}

//! GraphQL progress reporter
//!
//! Sends `updateTaskProgress(id, data)` with a bearer token. Null fields are
//! never sent; the request is bounded by the configured timeout.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::debug;

use super::{ProgressReporter, ProgressUpdate, ReportingError};
use crate::config::ReportingConfig;

pub const UPDATE_TASK_PROGRESS: &str = "mutation UpdateTaskProgress($id: String!, $data: UpdateTaskProgressInput!) {
  updateTaskProgress(id: $id, data: $data) {
    id
    status
    progress
    currentStep
    updatedAt
  }
}";

#[derive(Debug, Clone)]
pub struct GraphqlProgressReporter {
    client: Client,
    endpoint: Url,
}

impl GraphqlProgressReporter {
    pub fn new(config: &ReportingConfig) -> Result<Self, ReportingError> {
        let raw = config.graphql_url.as_deref().ok_or_else(|| {
            ReportingError::Configuration("reporting.graphql_url is not set".to_string())
        })?;
        let endpoint = Url::parse(raw)
            .map_err(|e| ReportingError::Configuration(format!("Invalid GraphQL URL: {e}")))?;

        let mut builder = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("scraper-worker/{}", env!("CARGO_PKG_VERSION")));

        if let Some(api_key) = config.graphql_api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {api_key}").parse().map_err(|e| {
                    ReportingError::Configuration(format!("Invalid API key: {e}"))
                })?,
            );
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Request body for one progress update
pub fn mutation_body(task_id: &str, update: &ProgressUpdate) -> Value {
    let mut data = json!(update);
    strip_nulls(&mut data);
    json!({
        "query": UPDATE_TASK_PROGRESS,
        "variables": { "id": task_id, "data": data },
    })
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

#[async_trait]
impl ProgressReporter for GraphqlProgressReporter {
    async fn report(&self, task_id: &str, update: &ProgressUpdate) -> Result<(), ReportingError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&mutation_body(task_id, update))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReportingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        if let Some(errors) = payload.get("errors").filter(|e| !e.is_null()) {
            return Err(ReportingError::GraphQl(errors.to_string()));
        }

        debug!(task_id = %task_id, status = %update.status, "Progress reported");
        Ok(())
    }
}

//! HTTP client for the Dune execution API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::config::QueryEngineConfig;
use crate::error::QueryError;
use crate::query::{
    ExecutionHandle, ExecutionState, ExecutionStatus, QueryEngine, QueryId, QueryParameters,
    ResultRow,
};

const API_KEY_HEADER: &str = "x-dune-api-key";
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    execution_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    result: Option<ResultsPayload>,
}

#[derive(Debug, Deserialize)]
struct ResultsPayload {
    #[serde(default)]
    rows: Vec<ResultRow>,
}

/// [`QueryEngine`] backed by the Dune REST API.
pub struct DuneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl DuneClient {
    pub fn new(config: &QueryEngineConfig) -> Result<Self, QueryError> {
        Self::with_timeout(&config.base_url, config.api_key.clone(), config.http_timeout)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::transport(base_url, e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, QueryError> {
        let response = request
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| QueryError::transport(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(QueryError::transport(
                endpoint,
                format!("HTTP {status}: {body}"),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| QueryError::transport(endpoint, format!("invalid JSON response: {e}")))
    }
}

/// Failure detail of a status payload: the `error` object when the engine
/// attached one, otherwise the whole payload.
fn failure_detail(payload: &Value) -> String {
    match payload.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => payload.to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl QueryEngine for DuneClient {
    async fn submit(
        &self,
        query: QueryId,
        params: &QueryParameters,
    ) -> Result<ExecutionHandle, QueryError> {
        let endpoint = self.endpoint(&format!("/query/{query}/execute"));
        let body = serde_json::json!({ "query_parameters": params });
        let payload = self
            .send_json(&endpoint, self.http.post(&endpoint).json(&body))
            .await?;

        let submitted: SubmitResponse = serde_json::from_value(payload).map_err(|e| {
            QueryError::transport(&endpoint, format!("missing execution_id: {e}"))
        })?;
        tracing::debug!(query = %query, execution = %submitted.execution_id, "Query submitted");
        Ok(ExecutionHandle::new(submitted.execution_id))
    }

    async fn check_status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus, QueryError> {
        let endpoint = self.endpoint(&format!("/execution/{handle}/status"));
        let payload = self.send_json(&endpoint, self.http.get(&endpoint)).await?;

        let raw_state = payload
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::transport(&endpoint, "status payload has no state"))?;
        let state = ExecutionState::from_api(raw_state);

        let status = ExecutionStatus::new(state);
        Ok(match state {
            ExecutionState::Failed | ExecutionState::Cancelled => {
                status.with_detail(failure_detail(&payload))
            }
            _ => status,
        })
    }

    async fn fetch_results(&self, handle: &ExecutionHandle) -> Result<Vec<ResultRow>, QueryError> {
        let endpoint = self.endpoint(&format!("/execution/{handle}/results"));
        let payload = self.send_json(&endpoint, self.http.get(&endpoint)).await?;

        let results: ResultsResponse = serde_json::from_value(payload)
            .map_err(|e| QueryError::transport(&endpoint, format!("malformed result set: {e}")))?;
        Ok(results.result.map(|r| r.rows).unwrap_or_default())
    }
}

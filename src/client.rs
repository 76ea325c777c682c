//! HTTP client for a running Zeus server.
//!
//! Used by the CLI subcommands other than `serve`. Error responses are turned
//! back into the matching [`ZeusError`] category.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use crate::api::dto::{ExecuteResponse, HealthDto};
use crate::api::error::ErrorBody;
use crate::athena::ExecutionHandle;
use crate::error::{Result, ZeusError};
use crate::ledger::QueryRun;
use crate::query::{ExecuteRequest, PageRequest, ResultPage, RunSnapshot};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Default timeout for non-streaming requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ZeusClient {
    base_url: String,
    client: Client,
}

impl ZeusClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ZeusError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub async fn health(&self) -> Result<HealthDto> {
        let response = self.send(self.get("/health")).await?;
        Self::json(response).await
    }

    /// Executes ad-hoc SQL.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse> {
        let response = self
            .send(self.post("/athena/execute").json(request))
            .await?;
        Self::json(response).await
    }

    /// Executes a saved definition.
    pub async fn execute_definition(
        &self,
        query_id: Uuid,
        request: &ExecuteRequest,
    ) -> Result<QueryRun> {
        let response = self
            .send(self.post(&format!("/queries/{query_id}/runs")).json(request))
            .await?;
        Self::json(response).await
    }

    pub async fn list_runs(&self, query_id: Uuid) -> Result<Vec<RunSnapshot>> {
        let response = self
            .send(self.get(&format!("/queries/{query_id}/runs")))
            .await?;
        Self::json(response).await
    }

    pub async fn results(
        &self,
        handle: &ExecutionHandle,
        request: PageRequest,
    ) -> Result<ResultPage> {
        let response = self
            .send(
                self.get(&format!("/athena/results/{handle}"))
                    .query(&[("page", request.page), ("size", request.size)]),
            )
            .await?;
        Self::json(response).await
    }

    /// Streams the exported CSV of an execution. No overall timeout applies.
    pub async fn export(&self, handle: &ExecutionHandle) -> Result<BoxStream<'static, Result<Bytes>>> {
        let response = self
            .send(self.client.get(self.url(&format!("/athena/export/{handle}"))))
            .await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ZeusError::export_fetch(format!("Stream error: {e}"))))
            .boxed())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ZeusError::internal(format!(
                        "Failed to connect to Zeus at {}. Is it running? Try: zeus serve",
                        self.base_url
                    ))
                } else if e.is_timeout() {
                    ZeusError::internal("Request timed out. Try again.")
                } else {
                    ZeusError::internal(format!("Request failed: {e}"))
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => error_from_code(&parsed.error.code, parsed.error.message),
            Err(_) => ZeusError::internal(format!("Server error ({status}): {body}")),
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| ZeusError::internal(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ZeusError::internal(format!("Failed to parse response: {e}")))
    }
}

/// Maps an API error code back to its error category.
fn error_from_code(code: &str, message: String) -> ZeusError {
    match code {
        "VALIDATION_ERROR" => ZeusError::Validation(message),
        "NOT_FOUND" => ZeusError::NotFound(message),
        "SUBMISSION_FAILED" => ZeusError::Submission(message),
        "RECONCILE_FAILED" => ZeusError::Reconcile(message),
        "RESULTS_FETCH_FAILED" => ZeusError::ResultsFetch(message),
        "EXPORT_LOCATION_UNRESOLVED" => ZeusError::ExportLocation(message),
        "EXPORT_FETCH_FAILED" => ZeusError::ExportFetch(message),
        "PERSISTENCE_ERROR" => ZeusError::Persistence(message),
        "CONFIG_ERROR" => ZeusError::Config(message),
        _ => ZeusError::Internal(message),
    }
}

//! AWS Athena execution service client.
//!
//! Implements the ExecutionService trait on top of `aws-sdk-athena`.

use async_trait::async_trait;
use aws_sdk_athena::error::{DisplayErrorContext, SdkError};
use aws_sdk_athena::types::ResultConfiguration;
use aws_sdk_athena::Client;
use tracing::debug;

use super::{
    ExecutionHandle, ExecutionService, ExecutionStatus, LifecycleState, ResultBatch,
    ServiceError, ServiceResult, MAX_RESULTS_PER_CALL,
};

/// Workgroup used when none is configured.
pub const DEFAULT_WORKGROUP: &str = "primary";

/// Athena-backed execution service.
#[derive(Debug, Clone)]
pub struct AthenaClient {
    client: Client,
    workgroup: String,
}

impl AthenaClient {
    /// Wraps an existing SDK client.
    pub fn new(client: Client, workgroup: impl Into<String>) -> Self {
        Self {
            client,
            workgroup: workgroup.into(),
        }
    }

    /// Builds a client from a loaded AWS configuration.
    pub fn from_sdk_config(config: &aws_config::SdkConfig, workgroup: impl Into<String>) -> Self {
        Self::new(Client::new(config), workgroup)
    }

    /// Returns the workgroup queries are submitted to.
    pub fn workgroup(&self) -> &str {
        &self.workgroup
    }
}

/// Maps an SDK failure onto the service error kinds.
///
/// Errors modeled by the service (bad SQL, unknown execution id, access
/// denied) are rejections; everything else never got a service answer.
fn service_error<E, R>(err: SdkError<E, R>) -> ServiceError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => ServiceError::Rejected(message),
        _ => ServiceError::Unavailable(message),
    }
}

#[async_trait]
impl ExecutionService for AthenaClient {
    async fn start_query(
        &self,
        sql: &str,
        output_location: &str,
    ) -> ServiceResult<ExecutionHandle> {
        let output = self
            .client
            .start_query_execution()
            .query_string(sql)
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .work_group(&self.workgroup)
            .send()
            .await
            .map_err(service_error)?;

        let id = output
            .query_execution_id()
            .ok_or_else(|| ServiceError::Malformed("no query execution id returned".into()))?;

        debug!("Started Athena query execution {id}");
        Ok(ExecutionHandle::from(id))
    }

    async fn describe(&self, handle: &ExecutionHandle) -> ServiceResult<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(service_error)?;

        let execution = output
            .query_execution()
            .ok_or_else(|| ServiceError::Malformed("missing query execution".into()))?;
        let status = execution
            .status()
            .ok_or_else(|| ServiceError::Malformed("missing query execution status".into()))?;
        let raw_state = status
            .state()
            .ok_or_else(|| ServiceError::Malformed("missing query execution state".into()))?;
        let state = LifecycleState::parse(raw_state.as_str()).ok_or_else(|| {
            ServiceError::Malformed(format!("unknown query state '{}'", raw_state.as_str()))
        })?;

        debug!("Query {handle} status: {state}");

        Ok(ExecutionStatus {
            state,
            reason: status.state_change_reason().map(str::to_string),
            output_location: execution
                .result_configuration()
                .and_then(|c| c.output_location())
                .map(str::to_string),
        })
    }

    async fn fetch_results(
        &self,
        handle: &ExecutionHandle,
        max_results: usize,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultBatch> {
        let max_results = max_results.clamp(1, MAX_RESULTS_PER_CALL) as i32;

        let output = self
            .client
            .get_query_results()
            .query_execution_id(handle.as_str())
            .max_results(max_results)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(service_error)?;

        let rows = output
            .result_set()
            .map(|set| {
                set.rows()
                    .iter()
                    .map(|row| {
                        row.data()
                            .iter()
                            .map(|datum| datum.var_char_value().map(str::to_string))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ResultBatch {
            rows,
            next_token: output.next_token().map(str::to_string),
        })
    }
}

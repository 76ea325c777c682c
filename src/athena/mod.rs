//! Execution service abstraction for Zeus.
//!
//! Provides a trait-based interface to the remote asynchronous query engine,
//! so the reconciliation engine can run against AWS Athena in production and
//! against an in-memory double in tests.

mod aws;
mod mock;
mod types;

pub use aws::AthenaClient;
pub use mock::MockExecutionService;
pub use types::{
    ExecutionHandle, ExecutionStatus, LifecycleState, RawRow, ResultBatch, ServiceError,
    ServiceResult,
};

use async_trait::async_trait;

/// Largest page the execution service will return from one results call.
pub const MAX_RESULTS_PER_CALL: usize = 1000;

/// Trait defining the interface to the external execution service.
///
/// Implementations perform exactly one remote round trip per call and never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submits `sql`, asking the service to write results under `output_location`.
    async fn start_query(&self, sql: &str, output_location: &str)
        -> ServiceResult<ExecutionHandle>;

    /// Returns the current lifecycle state of an execution.
    async fn describe(&self, handle: &ExecutionHandle) -> ServiceResult<ExecutionStatus>;

    /// Fetches up to `max_results` rows, continuing from `next_token` if given.
    async fn fetch_results(
        &self,
        handle: &ExecutionHandle,
        max_results: usize,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultBatch>;
}

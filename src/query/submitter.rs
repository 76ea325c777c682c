//! Query submission.

use tracing::{debug, info};

use crate::athena::{ExecutionHandle, ExecutionService};
use crate::error::{Result, ZeusError};

/// Submits fully rendered SQL to the execution service.
///
/// Makes exactly one remote call. Failures are reported as `Submission`
/// errors carrying the service's message; nothing is retried or recorded.
pub async fn submit(
    service: &dyn ExecutionService,
    sql: &str,
    output_location: &str,
) -> Result<ExecutionHandle> {
    if sql.trim().is_empty() {
        return Err(ZeusError::validation("SQL is required"));
    }

    debug!("Submitting query with output location {output_location}");
    let handle = service
        .start_query(sql, output_location)
        .await
        .map_err(|e| ZeusError::submission(format!("Failed to start query execution: {e}")))?;

    info!("Submitted query execution {handle}");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athena::MockExecutionService;

    #[tokio::test]
    async fn test_submit_returns_handle() {
        let service = MockExecutionService::new();
        let handle = submit(&service, "SELECT 1", "s3://bucket/").await.unwrap();

        assert_eq!(handle.as_str(), "exec-0001");
        assert_eq!(service.submitted_sql(&handle).as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_sql_without_remote_call() {
        let service = MockExecutionService::new();
        let err = submit(&service, "   ", "s3://bucket/").await.unwrap_err();

        assert!(matches!(err, ZeusError::Validation(_)));
        assert_eq!(service.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_surfaces_service_message() {
        let service = MockExecutionService::new();
        service.reject_submissions("line 1:8: mismatched input 'FORM'");

        let err = submit(&service, "SELECT * FORM t", "s3://bucket/")
            .await
            .unwrap_err();

        assert!(matches!(err, ZeusError::Submission(_)));
        assert!(err.to_string().contains("mismatched input 'FORM'"));
        assert_eq!(service.start_calls(), 1);
    }
}

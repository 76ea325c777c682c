//! Result export.
//!
//! Resolves where an execution's full result set lives and streams that
//! object back byte for byte.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use super::reconciler;
use crate::athena::{ExecutionHandle, ExecutionService, LifecycleState};
use crate::error::{Result, ZeusError};
use crate::ledger::{runs, QueryRun};
use crate::objects::{ObjectStore, ObjectStoreError, S3Location};

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const EXPORT_FILENAME: &str = "query_results.csv";

/// A result object ready to be sent to the caller.
pub struct ExportStream {
    pub location: S3Location,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl ExportStream {
    pub fn content_type(&self) -> &'static str {
        CSV_CONTENT_TYPE
    }

    pub fn content_disposition(&self) -> String {
        format!("attachment; filename={EXPORT_FILENAME}")
    }
}

impl std::fmt::Debug for ExportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStream")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Resolves the result object of a SUCCEEDED execution.
///
/// A location already recorded in the ledger is used as is. Otherwise the
/// execution is described once; anything other than SUCCEEDED with a
/// reported location is an `ExportLocation` error. A SUCCEEDED run recorded
/// without a location gets the reported one written back.
pub async fn resolve_location(
    service: &dyn ExecutionService,
    pool: &SqlitePool,
    handle: &ExecutionHandle,
) -> Result<S3Location> {
    if let Some(run) = runs::get_run_by_execution_id(pool, handle).await? {
        if run.status == LifecycleState::Succeeded {
            if let Some(location) = &run.results_location {
                debug!("Using recorded result location for {handle}");
                return parse_location(location);
            }
            return fill_missing_location(service, pool, run).await;
        }
    }

    let observation = reconciler::observe(service, pool, handle)
        .await
        .map_err(|e| match e {
            ZeusError::Reconcile(msg) => ZeusError::export_location(msg),
            other => other,
        })?;

    if observation.state != LifecycleState::Succeeded {
        return Err(ZeusError::export_location(format!(
            "Execution {handle} has not succeeded (status {})",
            observation.state
        )));
    }

    let location = observation.output_location.ok_or_else(|| {
        ZeusError::export_location(format!("No output location found for {handle}"))
    })?;
    parse_location(&location)
}

async fn fill_missing_location(
    service: &dyn ExecutionService,
    pool: &SqlitePool,
    run: QueryRun,
) -> Result<S3Location> {
    let handle = &run.execution_id;
    let status = service.describe(handle).await.map_err(|e| {
        ZeusError::export_location(format!("Failed to get query execution {handle}: {e}"))
    })?;

    let location = status.output_location.ok_or_else(|| {
        ZeusError::export_location(format!("No output location found for {handle}"))
    })?;
    parse_location(&location)?;

    if runs::record_results_location(pool, run.id, &location).await? {
        info!("Recorded result location for run {} ({handle})", run.id);
    }

    // A concurrent export may have recorded first.
    let stored = runs::get_run(pool, run.id)
        .await?
        .and_then(|run| run.results_location)
        .unwrap_or(location);
    parse_location(&stored)
}

fn parse_location(location: &str) -> Result<S3Location> {
    S3Location::parse(location).map_err(|e| ZeusError::export_location(e.to_string()))
}

/// Opens the result object for streaming.
pub async fn open_export(store: &dyn ObjectStore, location: S3Location) -> Result<ExportStream> {
    let body = store.get_object(&location).await.map_err(map_store_error)?;
    info!("Exporting results from {location}");

    Ok(ExportStream {
        location,
        body: body.map(|chunk| chunk.map_err(map_store_error)).boxed(),
    })
}

fn map_store_error(err: ObjectStoreError) -> ZeusError {
    ZeusError::export_fetch(format!("Failed to get results file: {err}"))
}

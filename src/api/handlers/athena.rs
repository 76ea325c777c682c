//! Execution handlers: ad-hoc execution, results and export by execution ID.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::api::dto::{ExecuteResponse, ResultsQuery};
use crate::api::error::RestError;
use crate::athena::ExecutionHandle;
use crate::error::ZeusError;
use crate::query::paginator::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::query::{ExecuteRequest, PageRequest, QueryService, ResultPage};

fn execution_handle(raw: &str) -> Result<ExecutionHandle, ZeusError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ZeusError::validation("Execution ID is required"));
    }
    Ok(ExecutionHandle::new(raw))
}

pub async fn execute(
    Extension(service): Extension<Arc<QueryService>>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ExecuteResponse>), RestError> {
    let Json(request) = body?;
    let run = service.execute_adhoc(&request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ExecuteResponse {
            execution_id: run.execution_id.to_string(),
            run_id: run.id.to_string(),
        }),
    ))
}

pub async fn results(
    Extension(service): Extension<Arc<QueryService>>,
    Path(execution_id): Path<String>,
    query: Result<Query<ResultsQuery>, QueryRejection>,
) -> Result<Json<ResultPage>, RestError> {
    let Query(query) = query?;
    let request = PageRequest::new(
        query.page.unwrap_or(DEFAULT_PAGE),
        query.size.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;
    let handle = execution_handle(&execution_id)?;
    Ok(Json(service.results(&handle, request).await?))
}

pub async fn export(
    Extension(service): Extension<Arc<QueryService>>,
    Path(execution_id): Path<String>,
) -> Result<Response, RestError> {
    let handle = execution_handle(&execution_id)?;
    let export = service.export(&handle).await?;

    let headers = [
        (header::CONTENT_TYPE, export.content_type().to_string()),
        (header::CONTENT_DISPOSITION, export.content_disposition()),
    ];
    Ok((headers, Body::from_stream(export.body)).into_response())
}

//! Query definition handlers, plus the runs nested under a definition.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path},
    http::StatusCode,
    Extension, Json,
};
use tracing::info;

use super::parse_id;
use crate::api::dto::DeleteDefinitionResponse;
use crate::api::error::RestError;
use crate::ledger::{DefinitionUpdate, NewDefinition, QueryDefinition, QueryRun};
use crate::query::{ExecuteRequest, QueryService, RunSnapshot};

pub async fn list(
    Extension(service): Extension<Arc<QueryService>>,
) -> Result<Json<Vec<QueryDefinition>>, RestError> {
    Ok(Json(service.list_definitions().await?))
}

pub async fn create(
    Extension(service): Extension<Arc<QueryService>>,
    body: Result<Json<NewDefinition>, JsonRejection>,
) -> Result<(StatusCode, Json<QueryDefinition>), RestError> {
    let Json(definition) = body?;
    let created = service.create_definition(&definition).await?;
    info!("Created query {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
) -> Result<Json<QueryDefinition>, RestError> {
    let id = parse_id(&id, "query")?;
    Ok(Json(service.get_definition(id).await?))
}

pub async fn update(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
    body: Result<Json<DefinitionUpdate>, JsonRejection>,
) -> Result<Json<QueryDefinition>, RestError> {
    let id = parse_id(&id, "query")?;
    let Json(update) = body?;
    Ok(Json(service.update_definition(id, &update).await?))
}

pub async fn delete(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteDefinitionResponse>, RestError> {
    let id = parse_id(&id, "query")?;
    let deleted_runs = service.delete_definition(id).await?;
    info!("Deleted query {id} and {deleted_runs} run(s)");
    Ok(Json(DeleteDefinitionResponse {
        message: "Query deleted successfully".to_string(),
        deleted_runs,
    }))
}

pub async fn list_runs(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RunSnapshot>>, RestError> {
    let id = parse_id(&id, "query")?;
    Ok(Json(service.list_runs(id).await?))
}

/// Executes a definition. An empty body runs the stored SQL; anything else
/// must be a valid request or nothing is submitted.
pub async fn execute(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<QueryRun>), RestError> {
    let id = parse_id(&id, "query")?;
    let request = parse_execute_body(&body)?;
    let run = service.execute_definition(id, &request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

fn parse_execute_body(body: &[u8]) -> Result<ExecuteRequest, RestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExecuteRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RestError::bad_request(format!("Invalid request body: {e}")))
}

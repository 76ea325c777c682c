//! Individual run handlers.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};

use super::parse_id;
use crate::api::dto::MessageResponse;
use crate::api::error::RestError;
use crate::ledger::QueryRun;
use crate::query::QueryService;

/// Returns a run as last recorded, without refreshing it.
pub async fn get(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
) -> Result<Json<QueryRun>, RestError> {
    let id = parse_id(&id, "run")?;
    Ok(Json(service.get_run(id).await?))
}

pub async fn delete(
    Extension(service): Extension<Arc<QueryService>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, RestError> {
    let id = parse_id(&id, "run")?;
    service.delete_run(id).await?;
    Ok(Json(MessageResponse {
        message: "Query run deleted successfully".to_string(),
    }))
}

//! Health check endpoint.

use axum::Json;

use crate::api::dto::HealthDto;

pub async fn health() -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

use axum::{extract::Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::database::Repository;
use crate::utils::error::ApiError;

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readiness_check(
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(repository.pool.get_pool())
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(json!({ "status": "ready" })))
}

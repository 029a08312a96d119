use axum::{
    extract::{Extension, Path},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{load_owned_conversation, parse_id};
use crate::auth::AuthUser;
use crate::database::Repository;
use crate::models::chat::NavigateRequest;
use crate::services::conversation::versioning;
use crate::utils::error::ApiError;

pub async fn list_version_groups_handler(
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    load_owned_conversation(&repository, conversation_id, &user).await?;

    let version_groups = repository
        .list_version_groups_with_files(conversation_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(json!({ "versionGroups": version_groups })))
}

/// Step a group's active pair one version in either direction. The offset
/// is computed server-side; stepping past a boundary is a no-op.
pub async fn navigate_version_handler(
    user: AuthUser,
    Path((conversation_id, group_id)): Path<(String, String)>,
    Extension(repository): Extension<Arc<Repository>>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let group_id = parse_id(&group_id, "version group")?;
    load_owned_conversation(&repository, conversation_id, &user).await?;

    let group = repository
        .get_version_group(group_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Version group not found".to_string()))?;

    if group.conversation_id != conversation_id {
        return Err(ApiError::BadRequest(
            "Version group does not belong to this conversation".to_string(),
        ));
    }

    let new_index = versioning::navigate(group.index, group.versions.len(), request.direction);

    if new_index != group.index {
        let affected = repository
            .set_group_index(group_id, conversation_id, new_index)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if affected == 0 {
            return Err(ApiError::NotFound("Version group not found".to_string()));
        }
    }

    let version_info = versioning::version_info(new_index, group.versions.len());

    Ok(Json(json!({
        "success": true,
        "index": new_index,
        "versionInfo": version_info,
    })))
}

pub async fn delete_version_group_handler(
    user: AuthUser,
    Path(group_id): Path<String>,
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    let group_id = parse_id(&group_id, "version group")?;

    let group = repository
        .get_version_group(group_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Version group not found".to_string()))?;

    load_owned_conversation(&repository, group.conversation_id, &user).await?;

    repository
        .delete_version_group(group_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    info!(%group_id, "Version group deleted");

    Ok(Json(json!({
        "message": "Version Group Deleted Successfully",
    })))
}

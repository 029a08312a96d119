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
use crate::utils::error::ApiError;

pub async fn create_conversation_handler(
    user: AuthUser,
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    let conversation = repository
        .create_conversation(&user.user_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    info!(conversation_id = %conversation.id, user_id = %user.user_id, "Conversation created");

    Ok(Json(json!({
        "message": "Conversation created successfully.",
        "conversation": conversation,
    })))
}

pub async fn list_conversations_handler(
    user: AuthUser,
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    let conversations = repository
        .list_conversations(&user.user_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(json!({
        "message": "Conversations found successfully",
        "success": true,
        "conversations": conversations,
    })))
}

pub async fn delete_conversation_handler(
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Extension(repository): Extension<Arc<Repository>>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let conversation = load_owned_conversation(&repository, conversation_id, &user).await?;

    repository
        .delete_conversation(conversation_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    info!(%conversation_id, "Conversation deleted");

    Ok(Json(json!({
        "message": "Conversation Deleted Successfully",
        "conversation": conversation,
    })))
}

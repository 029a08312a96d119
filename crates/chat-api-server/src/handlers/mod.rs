pub mod conversations;
pub mod edit;
pub mod health;
pub mod query;
pub mod versions;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::{Conversation, Repository};
use crate::models::chat::StreamEvent;
use crate::utils::error::ApiError;

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {} id", what)))
}

/// Load a conversation and verify the caller owns it. Absence and ownership
/// mismatch are reported distinctly.
pub(crate) async fn load_owned_conversation(
    repository: &Arc<Repository>,
    conversation_id: Uuid,
    user: &AuthUser,
) -> Result<Conversation, ApiError> {
    let conversation = repository
        .get_conversation(conversation_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    if conversation.user_id != user.user_id {
        return Err(ApiError::Forbidden(
            "Conversation does not belong to the authenticated user".to_string(),
        ));
    }

    Ok(conversation)
}

/// Wrap an orchestrator event channel as a newline-delimited JSON response.
/// The producing task keeps running if the client disconnects; only the
/// relay stops.
pub(crate) fn ndjson_response(
    mut rx: mpsc::Receiver<StreamEvent>,
) -> Result<Response, ApiError> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => yield Ok::<String, Infallible>(format!("{}\n", line)),
                Err(e) => tracing::error!("Failed to serialize stream event: {}", e),
            }
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}

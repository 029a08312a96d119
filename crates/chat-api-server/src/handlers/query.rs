use axum::{
    extract::{Extension, Multipart, Path},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::{load_owned_conversation, ndjson_response, parse_id};
use crate::auth::AuthUser;
use crate::database::Repository;
use crate::models::chat::{FileAttachment, QueryRequest};
use crate::services::conversation::TurnOrchestrator;
use crate::services::StorageService;
use crate::utils::error::ApiError;

/// The turn endpoint: JSON `{query, isFirstQuery}` in, NDJSON events out.
pub async fn query_handler(
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Extension(repository): Extension<Arc<Repository>>,
    Extension(orchestrator): Extension<Arc<TurnOrchestrator>>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let conversation = load_owned_conversation(&repository, conversation_id, &user).await?;

    info!(
        %conversation_id,
        user_id = %user.user_id,
        query_len = request.query.len(),
        is_first = request.is_first_query,
        "Query received"
    );

    let rx = orchestrator
        .run_query(
            &user.user_id,
            conversation,
            request.query,
            request.is_first_query,
            vec![],
        )
        .await?;

    ndjson_response(rx)
}

/// Multipart variant of the turn endpoint: a `query` field plus any number
/// of file fields, uploaded to blob storage before the turn starts.
pub async fn query_file_handler(
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Extension(repository): Extension<Arc<Repository>>,
    Extension(orchestrator): Extension<Arc<TurnOrchestrator>>,
    Extension(storage): Extension<Arc<StorageService>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let conversation = load_owned_conversation(&repository, conversation_id, &user).await?;

    let mut query = String::new();
    let mut attachments: Vec<FileAttachment> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("query") => {
                query = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid query field: {}", e)))?;
            }
            _ => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let file_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid file field: {}", e)))?
                    .to_vec();

                let storage_url = storage
                    .upload(bytes.clone(), &file_name, &file_type)
                    .await
                    .map_err(|e| ApiError::InternalError(format!("File upload failed: {}", e)))?;

                attachments.push(FileAttachment {
                    file_name,
                    file_type,
                    storage_url,
                    bytes,
                });
            }
        }
    }

    if query.trim().is_empty() && attachments.is_empty() {
        return Err(ApiError::BadRequest("Query is missing".to_string()));
    }

    info!(
        %conversation_id,
        files = attachments.len(),
        "File query received"
    );

    let rx = orchestrator
        .run_query(&user.user_id, conversation, query, false, attachments)
        .await?;

    ndjson_response(rx)
}

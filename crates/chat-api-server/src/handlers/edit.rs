use axum::{
    extract::{Extension, Multipart, Path},
    response::Response,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{load_owned_conversation, ndjson_response, parse_id};
use crate::auth::AuthUser;
use crate::database::Repository;
use crate::models::chat::FileAttachment;
use crate::services::conversation::TurnOrchestrator;
use crate::services::StorageService;
use crate::utils::error::ApiError;

/// Edit a user message: branch a new version pair off its group, streamed
/// like the main turn endpoint. Multipart fields: `editedQuery`,
/// `existingFileIds` (JSON array), `newFiles[...]`.
pub async fn edit_message_handler(
    user: AuthUser,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(repository): Extension<Arc<Repository>>,
    Extension(orchestrator): Extension<Arc<TurnOrchestrator>>,
    Extension(storage): Extension<Arc<StorageService>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let message_id = parse_id(&message_id, "message")?;
    let conversation = load_owned_conversation(&repository, conversation_id, &user).await?;

    let mut edited_query = String::new();
    let mut existing_file_ids: Vec<Uuid> = Vec::new();
    let mut attachments: Vec<FileAttachment> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("editedQuery") => {
                edited_query = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Invalid editedQuery field: {}", e))
                })?;
            }
            Some("existingFileIds") => {
                let raw = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Invalid existingFileIds field: {}", e))
                })?;
                match serde_json::from_str::<Vec<Uuid>>(&raw) {
                    Ok(ids) => existing_file_ids = ids,
                    Err(e) => warn!("Failed to parse existingFileIds: {}", e),
                }
            }
            Some(name) if name.starts_with("newFiles[") => {
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
            _ => {}
        }
    }

    // Files carried over from the original message are re-attached to the
    // new version: fetch their bytes so the model sees them again.
    if !existing_file_ids.is_empty() {
        let existing = repository
            .list_files_by_ids(&existing_file_ids)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        for file in existing {
            match storage.fetch(&file.storage_url).await {
                Ok(bytes) => attachments.push(FileAttachment {
                    file_name: file.file_name,
                    file_type: file.file_type,
                    storage_url: file.storage_url,
                    bytes,
                }),
                Err(e) => warn!("Error fetching file {}: {:#}", file.file_name, e),
            }
        }
    }

    if edited_query.trim().is_empty() && attachments.is_empty() {
        return Err(ApiError::BadRequest(
            "Either content or files must be provided".to_string(),
        ));
    }

    info!(
        %conversation_id,
        %message_id,
        files = attachments.len(),
        "Edit received"
    );

    let rx = orchestrator
        .run_edit(
            &user.user_id,
            conversation,
            message_id,
            edited_query,
            attachments,
        )
        .await?;

    ndjson_response(rx)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub title: Option<String>,
    pub model: Option<String>,
    pub history_summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// One logical turn slot. `versions` holds message ids appended two at a
/// time (user id then assistant id); `index` is the even offset of the
/// currently selected pair within `versions`.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionGroup {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub versions: Vec<Uuid>,
    pub index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub version_group_id: Uuid,
    pub role: String, // "user" | "assistant"
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: Option<Uuid>,
    pub message_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub storage_url: String,
    pub created_at: DateTime<Utc>,
}

/// A version group with its messages in creation order.
#[derive(Debug, Clone)]
pub struct GroupWithMessages {
    pub group: VersionGroup,
    pub messages: Vec<Message>,
}

/// Read model for the versions endpoint: a group with messages, each
/// carrying its file attachments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionGroupView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub versions: Vec<Uuid>,
    pub index: i32,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub version_group_id: Uuid,
    pub role: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub files: Vec<StoredFile>,
}

impl MessageView {
    pub fn from_message(message: Message, files: Vec<StoredFile>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            version_group_id: message.version_group_id,
            role: message.role,
            sender: message.sender,
            content: message.content,
            created_at: message.created_at,
            updated_at: message.updated_at,
            files,
        }
    }
}

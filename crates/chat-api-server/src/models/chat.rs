use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::VersionGroupView;

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub is_first_query: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NavigateDirection {
    Prev,
    Next,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub direction: NavigateDirection,
}

// ===== MODEL GATEWAY MESSAGES =====

/// One entry of the ordered message list fed to the model. Tool-call fields
/// are only populated inside the tool loop and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Plain-text view; file parts contribute nothing.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::File { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    File { file: FilePartData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePartData {
    pub filename: String,
    pub file_data: String, // data URL
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn file(filename: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        ContentPart::File {
            file: FilePartData {
                filename: filename.into(),
                file_data: format!("data:{};base64,{}", mime_type, encoded),
            },
        }
    }
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallPayload>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(String::new()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Wire form of a tool call on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String, // always "function"
    pub function: FunctionCallPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    pub arguments: String, // JSON-encoded
}

/// Wire form of a tool declaration sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String, // always "function"
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            spec_type: "function".to_string(),
            function: FunctionSpec {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

// ===== CLIENT STREAM EVENTS =====

/// One NDJSON line of a streamed turn response. Every variant that belongs
/// to an in-flight assistant message carries its id so the client can route
/// deltas to the right placeholder.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Vg {
        data: VersionGroupView,
    },
    #[serde(rename_all = "camelCase")]
    Stream {
        data: String,
        role: String,
        message_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Tool {
        role: String,
        id: String,
        message_id: Uuid,
        name: String,
        args: Value,
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        role: String,
        id: String,
        message_id: Uuid,
        data: String,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn content_delta(message_id: Uuid, delta: impl Into<String>) -> Self {
        StreamEvent::Stream {
            data: delta.into(),
            role: "ai".to_string(),
            message_id,
        }
    }

    pub fn tool_call(message_id: Uuid, id: &str, name: &str, args: &Value) -> Self {
        StreamEvent::Tool {
            role: "tool".to_string(),
            id: id.to_string(),
            message_id,
            name: name.to_string(),
            args: args.clone(),
            data: format!(
                "Calling tool: {}\nArguments: {}",
                name,
                serde_json::to_string_pretty(args).unwrap_or_else(|_| "{}".to_string())
            ),
        }
    }

    pub fn tool_result(message_id: Uuid, id: &str, result: &str) -> Self {
        StreamEvent::ToolResult {
            role: "tool".to_string(),
            id: id.to_string(),
            message_id,
            data: format!("Tool result: {}", result),
        }
    }
}

/// An uploaded attachment's bytes, ready to be turned into a model file part.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    pub file_name: String,
    pub file_type: String,
    pub storage_url: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_tags_match_wire_protocol() {
        let id = Uuid::nil();

        let delta = serde_json::to_value(StreamEvent::content_delta(id, "hi")).unwrap();
        assert_eq!(delta["type"], "stream");
        assert_eq!(delta["messageId"], id.to_string());
        assert_eq!(delta["role"], "ai");

        let call = serde_json::to_value(StreamEvent::tool_call(
            id,
            "call_1",
            "calculator",
            &serde_json::json!({"a": 5, "b": 3, "operator": "+"}),
        ))
        .unwrap();
        assert_eq!(call["type"], "tool");
        assert_eq!(call["name"], "calculator");
        assert_eq!(call["args"]["operator"], "+");

        let result = serde_json::to_value(StreamEvent::tool_result(id, "call_1", "8")).unwrap();
        assert_eq!(result["type"], "tool_result");
        assert_eq!(result["data"], "Tool result: 8");
    }

    #[test]
    fn tool_fields_skipped_for_plain_messages() {
        let value = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(value["content"], "hello");
        assert!(value.get("tool_calls").is_none());
        assert!(value.get("tool_call_id").is_none());
    }

    #[test]
    fn file_part_encodes_data_url() {
        let part = ContentPart::file("notes.txt", "text/plain", b"abc");
        match part {
            ContentPart::File { file } => {
                assert_eq!(file.filename, "notes.txt");
                assert!(file.file_data.starts_with("data:text/plain;base64,"));
            }
            _ => panic!("expected file part"),
        }
    }
}

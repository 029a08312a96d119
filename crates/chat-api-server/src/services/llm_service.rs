use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::chat::{ChatMessage, ToolSpec};
// Trait and event types live with the orchestrator
use crate::services::conversation::orchestrator::{
    ModelEvent, ModelEventStream, ModelGateway, ToolCallDirective,
};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
}

// Streaming response structs
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Tool-call fragments accumulate across deltas until the round finishes.
#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    fn into_directive(self) -> Result<ToolCallDirective> {
        let arguments: serde_json::Value = serde_json::from_str(&self.arguments)
            .map_err(|e| anyhow!("Malformed tool-call arguments from model: {}", e))?;

        Ok(ToolCallDirective {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
        tools: Option<Vec<ToolSpec>>,
        stream: bool,
    ) -> ChatCompletionRequest {
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            all_messages.push(ChatMessage::system(system));
        }
        all_messages.extend(messages);

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: all_messages,
            max_tokens: self.config.max_tokens,
            temperature: 0.7,
            stream,
            tools,
        }
    }

    async fn post_completion(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call LLM API: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error: {} - {}", status, body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelGateway for LlmService {
    /// Stream a completion, decoding the SSE wire format into content deltas
    /// and aggregated tool-call directives.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<ModelEventStream> {
        debug!("Starting chat stream with {} messages", messages.len());

        let request = self.build_request(messages, system, tools, true);
        let response = self.post_completion(&request).await?;

        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut buffer = String::new();
            let mut pending: Vec<PendingToolCall> = Vec::new();

            'outer: while let Some(chunk) = byte_stream.next().await {
                let bytes = chunk.map_err(|e| anyhow!("Stream error: {}", e))?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE lines may span byte chunks; consume only complete ones.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(json_str) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    if json_str == "[DONE]" {
                        break 'outer;
                    }

                    let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(json_str) else {
                        continue;
                    };

                    let Some(choice) = parsed.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield ModelEvent::Content(content);
                        }
                    }

                    if let Some(deltas) = choice.delta.tool_calls {
                        for delta in deltas {
                            if pending.len() <= delta.index {
                                pending.resize(delta.index + 1, PendingToolCall::default());
                            }
                            pending[delta.index].merge(delta);
                        }
                    }

                    if choice.finish_reason.as_deref() == Some("tool_calls") {
                        break 'outer;
                    }
                }
            }

            for call in pending {
                yield ModelEvent::ToolCall(call.into_directive()?);
            }
        };

        Ok(Box::pin(stream))
    }

    /// Generate a completion without streaming (wait for the full response).
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
    ) -> Result<String> {
        debug!("Starting chat generation with {} messages", messages.len());

        let request = self.build_request(messages, system, None, false);
        let response = self.post_completion(&request).await?;

        #[derive(Deserialize)]
        struct ChatCompletionResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse LLM response: {}", e))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("No choices returned from LLM"))
    }
}

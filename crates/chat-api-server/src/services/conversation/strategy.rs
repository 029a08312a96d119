//! Response strategies: how a turn drives the model.
//!
//! The pipeline is the same for every variant; what differs is whether a
//! tool set is bound and whether a suggestion pre-step runs. The chat loop
//! is the `Chat -> (ToolExec -> Chat)*` state machine: the model is invoked
//! with the working history, any tool-call directives are executed (each
//! isolated), their results are fed back, and the loop re-enters `Chat`
//! until a response arrives without directives.

use anyhow::Result;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::orchestrator::{ModelEvent, ModelGateway, ToolCallDirective};
use super::tools::{ToolContext, ToolRegistry};
use crate::models::chat::{
    ChatMessage, FunctionCallPayload, StreamEvent, ToolCallPayload,
};
use crate::utils::extract_first_json_object;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStrategy {
    NoTools,
    SuggestThenChat,
    ChatWithTools,
}

impl ResponseStrategy {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "suggest_then_chat" => Self::SuggestThenChat,
            "chat_with_tools" => Self::ChatWithTools,
            _ => Self::NoTools,
        }
    }

    pub fn uses_tools(&self) -> bool {
        !matches!(self, Self::NoTools)
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionOut {
    #[serde(default)]
    suggested_tools: Vec<String>,
    #[serde(default)]
    description: String,
}

/// Drive one turn's model interaction to completion, relaying events as
/// they arrive. Returns the full assistant text (the concatenation of every
/// relayed content delta, in order).
#[allow(clippy::too_many_arguments)]
pub async fn run_chat_loop(
    gateway: &dyn ModelGateway,
    registry: &ToolRegistry,
    strategy: ResponseStrategy,
    suggestion_prompt: &str,
    events: &mpsc::Sender<StreamEvent>,
    message_id: Uuid,
    mut messages: Vec<ChatMessage>,
    system: String,
    ctx: ToolContext,
    max_rounds: usize,
) -> Result<String> {
    if strategy == ResponseStrategy::SuggestThenChat && !registry.is_empty() {
        suggest_tools(gateway, registry, suggestion_prompt, &mut messages).await;
    }

    let tools = if strategy.uses_tools() && !registry.is_empty() {
        Some(registry.specs())
    } else {
        None
    };

    let mut full_text = String::new();

    for round in 0..max_rounds {
        let mut stream = gateway
            .stream_chat(messages.clone(), Some(system.clone()), tools.clone())
            .await?;

        let mut round_text = String::new();
        let mut directives: Vec<ToolCallDirective> = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                ModelEvent::Content(delta) => {
                    if delta.is_empty() {
                        continue;
                    }
                    full_text.push_str(&delta);
                    round_text.push_str(&delta);
                    // The receiver may be gone (client disconnect); the loop
                    // still runs to completion on the server-side text.
                    let _ = events
                        .send(StreamEvent::content_delta(message_id, delta))
                        .await;
                }
                ModelEvent::ToolCall(directive) => directives.push(directive),
            }
        }

        if directives.is_empty() {
            return Ok(full_text);
        }

        debug!(round, count = directives.len(), "Executing tool directives");

        // Any text the model produced alongside its directives stays in the
        // working history for the next round.
        let mut call_message = ChatMessage::assistant_tool_calls(
            directives
                .iter()
                .map(|d| ToolCallPayload {
                    id: d.id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCallPayload {
                        name: d.name.clone(),
                        arguments: d.arguments.to_string(),
                    },
                })
                .collect(),
        );
        call_message.content = crate::models::chat::MessageContent::Text(round_text);
        messages.push(call_message);

        for directive in directives {
            let _ = events
                .send(StreamEvent::tool_call(
                    message_id,
                    &directive.id,
                    &directive.name,
                    &directive.arguments,
                ))
                .await;

            // Registry isolates each call: an error becomes error-content.
            let result = registry
                .execute(&directive.name, directive.arguments, &ctx)
                .await;

            let _ = events
                .send(StreamEvent::tool_result(message_id, &directive.id, &result))
                .await;

            messages.push(ChatMessage::tool_result(directive.id, result));
        }
    }

    warn!("Tool round cap ({}) reached, returning accumulated text", max_rounds);
    Ok(full_text)
}

/// The optional Suggest pre-step: ask the model which declared tools look
/// relevant and inject the answer into history as a hint. Never a visible
/// turn, and never fatal; a failed suggestion just means no hint.
async fn suggest_tools(
    gateway: &dyn ModelGateway,
    registry: &ToolRegistry,
    suggestion_prompt: &str,
    messages: &mut Vec<ChatMessage>,
) {
    let Some(last_user) = messages.iter().rev().find(|m| m.role == "user") else {
        return;
    };

    let system = suggestion_prompt.replace("{tools}", &registry.describe());
    let probe = vec![ChatMessage::user(last_user.content.as_text())];

    let raw = match gateway.generate(probe, Some(system)).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Tool suggestion step failed: {:#}", e);
            return;
        }
    };

    let json_str = extract_first_json_object(&raw).unwrap_or(raw.as_str());
    let Ok(suggestion) = serde_json::from_str::<SuggestionOut>(json_str) else {
        warn!("Tool suggestion output was not valid JSON");
        return;
    };

    if suggestion.suggested_tools.is_empty() {
        return;
    }

    let hint = ChatMessage::system(format!(
        "Suggested tools for this query: {}. {}",
        suggestion.suggested_tools.join(", "),
        suggestion.description
    ));

    // Before the final user message, so the hint reads as context.
    let position = messages.len().saturating_sub(1);
    messages.insert(position, hint);
}

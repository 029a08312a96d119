//! The turn orchestrator: converts one user query into a persisted,
//! versioned turn while streaming the model's answer, then fans out the
//! post-completion side effects without blocking the stream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::history::{filter_memories_before, memories_to_excerpt, HistoryAssembler, MemoryEntry};
use super::strategy::{run_chat_loop, ResponseStrategy};
use super::tools::{ToolContext, ToolRegistry};
use crate::config::{OrchestratorConfig, PromptsConfig};
use crate::database::models::{
    Conversation, GroupWithMessages, Message, MessageView, StoredFile, VersionGroup,
    VersionGroupView,
};
use crate::database::Repository;
use crate::models::chat::{
    ChatMessage, ContentPart, FileAttachment, StreamEvent, ToolSpec,
};
use crate::utils::error::ApiError;
use crate::utils::extract_first_json_object;

/// Lifecycle of one turn, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Created,
    AwaitingModel,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

// ===== COLLABORATOR SEAMS =====

/// What the model emits while a turn streams.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    Content(String),
    ToolCall(ToolCallDirective),
}

#[derive(Debug, Clone)]
pub struct ToolCallDirective {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

pub type ModelEventStream = Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>;

/// The external LLM capability.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<ModelEventStream>;

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
    ) -> Result<String>;
}

/// The external long-term memory store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryEntry>>;
    async fn add(&self, messages: Vec<ChatMessage>, user_id: &str) -> Result<()>;
    async fn update(&self, memory_id: &str, text: &str) -> Result<()>;
    async fn get_all_in_window(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>>;
}

/// The external embeddings/similarity index, scoped by conversation.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add_documents(&self, conversation_id: Uuid, contents: Vec<String>) -> Result<()>;
    async fn retrieve(
        &self,
        query: &str,
        conversation_id: Uuid,
        top_k: i64,
    ) -> Result<Vec<String>>;
}

/// The durable conversation store operations the orchestrator drives.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>>;

    async fn create_turn_slot(
        &self,
        conversation_id: Uuid,
        sender: &str,
        query: &str,
    ) -> Result<(VersionGroup, Message, Message)>;

    async fn create_message(
        &self,
        conversation_id: Uuid,
        version_group_id: Uuid,
        role: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message>;

    async fn update_message_content(&self, message_id: Uuid, content: &str) -> Result<Message>;

    async fn append_version_pair(
        &self,
        group_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    ) -> Result<VersionGroup>;

    async fn lookback(
        &self,
        conversation_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<GroupWithMessages>>;

    async fn find_group_containing_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<VersionGroup>>;

    async fn touch_conversation(&self, conversation_id: Uuid) -> Result<()>;
    async fn update_conversation_title(&self, conversation_id: Uuid, title: &str) -> Result<()>;
    async fn update_conversation_summary(
        &self,
        conversation_id: Uuid,
        summary: &str,
    ) -> Result<()>;

    async fn create_file(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message_id: Uuid,
        file_name: &str,
        file_type: &str,
        storage_url: &str,
    ) -> Result<StoredFile>;
}

#[async_trait]
impl ConversationStore for Repository {
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        Repository::get_message(self, message_id).await
    }

    async fn create_turn_slot(
        &self,
        conversation_id: Uuid,
        sender: &str,
        query: &str,
    ) -> Result<(VersionGroup, Message, Message)> {
        self.create_version_group_with_pair(conversation_id, sender, query)
            .await
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        version_group_id: Uuid,
        role: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message> {
        Repository::create_message(self, conversation_id, version_group_id, role, sender, content)
            .await
    }

    async fn update_message_content(&self, message_id: Uuid, content: &str) -> Result<Message> {
        Repository::update_message_content(self, message_id, content).await
    }

    async fn append_version_pair(
        &self,
        group_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    ) -> Result<VersionGroup> {
        Repository::append_version_pair(self, group_id, user_message_id, assistant_message_id)
            .await
    }

    async fn lookback(
        &self,
        conversation_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<GroupWithMessages>> {
        self.list_groups_with_messages_desc(conversation_id, limit, before)
            .await
    }

    async fn find_group_containing_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<VersionGroup>> {
        Repository::find_group_containing_message(self, conversation_id, message_id).await
    }

    async fn touch_conversation(&self, conversation_id: Uuid) -> Result<()> {
        Repository::touch_conversation(self, conversation_id).await
    }

    async fn update_conversation_title(&self, conversation_id: Uuid, title: &str) -> Result<()> {
        Repository::update_conversation_title(self, conversation_id, title).await
    }

    async fn update_conversation_summary(
        &self,
        conversation_id: Uuid,
        summary: &str,
    ) -> Result<()> {
        Repository::update_conversation_summary(self, conversation_id, summary).await
    }

    async fn create_file(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message_id: Uuid,
        file_name: &str,
        file_type: &str,
        storage_url: &str,
    ) -> Result<StoredFile> {
        Repository::create_file(
            self,
            user_id,
            conversation_id,
            message_id,
            file_name,
            file_type,
            storage_url,
        )
        .await
    }
}

// ===== ORCHESTRATOR =====

pub struct TurnOrchestrator {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn ModelGateway>,
    memory: Arc<dyn MemoryStore>,
    vectors: Arc<dyn VectorIndex>,
    registry: Arc<ToolRegistry>,
    strategy: ResponseStrategy,
    assembler: HistoryAssembler,
    prompts: PromptsConfig,
    config: OrchestratorConfig,
    memory_update_window: Duration,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn ModelGateway>,
        memory: Arc<dyn MemoryStore>,
        vectors: Arc<dyn VectorIndex>,
        registry: Arc<ToolRegistry>,
        strategy: ResponseStrategy,
        prompts: PromptsConfig,
        config: OrchestratorConfig,
        memory_update_window_seconds: i64,
    ) -> Self {
        let assembler = HistoryAssembler::new(config.max_history_entries);
        Self {
            store,
            gateway,
            memory,
            vectors,
            registry,
            strategy,
            assembler,
            prompts,
            config,
            memory_update_window: Duration::seconds(memory_update_window_seconds),
        }
    }

    /// Run a new-query turn. Everything up to the model invocation happens
    /// before this returns, so pre-model failures surface as a plain error
    /// response and never leave a half-announced stream. The returned
    /// receiver yields the client-facing events; the producing task keeps
    /// running even if the receiver is dropped, so a disconnecting client
    /// never cancels persistence.
    pub async fn run_query(
        self: Arc<Self>,
        user_id: &str,
        conversation: Conversation,
        query: String,
        is_first_query: bool,
        attachments: Vec<FileAttachment>,
    ) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
        if query.trim().is_empty() && attachments.is_empty() {
            return Err(ApiError::BadRequest(
                "Either content or files must be provided".to_string(),
            ));
        }

        let turn_started_at = Utc::now();
        let conversation_id = conversation.id;

        // Durable turn structures first: the turn must survive a failed
        // stream.
        let (group, user_message, assistant_message) = self
            .store
            .create_turn_slot(conversation_id, user_id, &query)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        info!(phase = ?TurnPhase::Created, %conversation_id, group_id = %group.id, "Turn slot created");

        let user_files = self
            .attach_files(user_id, conversation_id, user_message.id, &attachments)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        // Independent reads, issued together.
        let (memories, groups) = tokio::join!(
            self.memory.search(&query, user_id),
            self.store
                .lookback(conversation_id, self.config.query_lookback_groups, None),
        );
        let memories = memories.map_err(|e| ApiError::InternalError(e.to_string()))?;
        let groups = groups.map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let memories_excerpt = memories_to_excerpt(&memories);
        let history = self.assembler.assemble(
            &groups,
            Some(conversation.history_summary.as_str()),
            Some(memories_excerpt.as_str()),
            None,
        );
        let history_len = history.len();

        let system = self
            .prompts
            .system_prompt
            .replace("{memories}", &memories_excerpt);

        let mut messages = history.clone();
        messages.push(user_turn_message(&query, &attachments));

        let snapshot = group_snapshot(
            &group,
            vec![(user_message.clone(), user_files), (assistant_message.clone(), vec![])],
        );

        let (tx, rx) = mpsc::channel(64);
        let orchestrator = self.clone();
        let previous_summary = conversation.history_summary.clone();
        let assistant_id = assistant_message.id;
        let user_message_id = user_message.id;
        let group_id = group.id;

        tokio::spawn(async move {
            let _ = tx.send(StreamEvent::Vg { data: snapshot }).await;

            info!(phase = ?TurnPhase::AwaitingModel, %conversation_id, "Invoking model gateway");

            let result = run_chat_loop(
                orchestrator.gateway.as_ref(),
                &orchestrator.registry,
                orchestrator.strategy,
                &orchestrator.prompts.tool_suggestion_prompt,
                &tx,
                assistant_id,
                messages,
                system,
                ToolContext { conversation_id },
                orchestrator.config.max_tool_rounds,
            )
            .await;

            let full_text = match result {
                Ok(text) => text,
                Err(e) => {
                    error!(phase = ?TurnPhase::Failed, %conversation_id, "Turn failed during streaming: {:#}", e);
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: format!("Failed to process your request: {}", e),
                        })
                        .await;
                    return;
                }
            };

            info!(phase = ?TurnPhase::Finalizing, %conversation_id, chars = full_text.len(), "Stream complete");

            if let Err(e) = orchestrator
                .finalize_turn(conversation_id, group_id, user_message_id, assistant_id, &full_text)
                .await
            {
                error!(phase = ?TurnPhase::Failed, %conversation_id, "Failed to persist turn: {:#}", e);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: "Failed to persist the response".to_string(),
                    })
                    .await;
                return;
            }

            info!(phase = ?TurnPhase::Completed, %conversation_id, "Turn persisted");

            let regenerate_summary = history_len >= orchestrator.config.summary_threshold;
            orchestrator.spawn_side_effects(SideEffectInput {
                user_id: user_message.sender.clone(),
                conversation_id,
                query,
                answer: full_text,
                anchor: turn_started_at,
                generate_title: is_first_query,
                regenerate_summary,
                previous_summary,
                history,
                index_vectors: true,
            });
        });

        Ok(rx)
    }

    /// Run an edit turn: branch a new user+assistant pair off the edited
    /// message's version group, using only the history (and memories) that
    /// existed before that group was created.
    pub async fn run_edit(
        self: Arc<Self>,
        user_id: &str,
        conversation: Conversation,
        message_id: Uuid,
        edited_query: String,
        attachments: Vec<FileAttachment>,
    ) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
        if edited_query.trim().is_empty() && attachments.is_empty() {
            return Err(ApiError::BadRequest(
                "Either content or files must be provided".to_string(),
            ));
        }

        let conversation_id = conversation.id;

        let target = self
            .store
            .get_message(message_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::BadRequest("No original message found".to_string()))?;

        if target.role != "user" {
            return Err(ApiError::BadRequest(
                "Only user messages can be edited".to_string(),
            ));
        }

        let group = self
            .store
            .find_group_containing_message(conversation_id, message_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::BadRequest("No original message found".to_string()))?;

        let cutoff = group.created_at;

        let (groups, memories) = tokio::join!(
            self.store.lookback(
                conversation_id,
                self.config.edit_lookback_groups,
                Some(cutoff)
            ),
            self.memory.search(&edited_query, user_id),
        );
        let groups = groups.map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        let memories = memories.map_err(|e| ApiError::InternalError(e.to_string()))?;

        // Only memories that predate the edited turn: the branch must not
        // see facts learned in its own future.
        let memories = filter_memories_before(memories, cutoff);
        let memories_excerpt = memories_to_excerpt(&memories);

        let history = self.assembler.assemble(&groups, None, None, Some(cutoff));

        let system = self
            .prompts
            .system_prompt
            .replace("{memories}", &memories_excerpt);

        let user_message = self
            .store
            .create_message(conversation_id, group.id, "user", user_id, &edited_query)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        let assistant_message = self
            .store
            .create_message(conversation_id, group.id, "assistant", "assistant", "")
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let user_files = self
            .attach_files(user_id, conversation_id, user_message.id, &attachments)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let mut messages = history;
        messages.push(user_turn_message(&edited_query, &attachments));

        let snapshot = group_snapshot(
            &group,
            vec![(user_message.clone(), user_files), (assistant_message.clone(), vec![])],
        );

        let (tx, rx) = mpsc::channel(64);
        let orchestrator = self.clone();
        let assistant_id = assistant_message.id;
        let user_message_id = user_message.id;
        let group_id = group.id;
        let owner = user_id.to_string();

        tokio::spawn(async move {
            let _ = tx.send(StreamEvent::Vg { data: snapshot }).await;

            info!(phase = ?TurnPhase::AwaitingModel, %conversation_id, group_id = %group_id, "Regenerating edited turn");

            let result = run_chat_loop(
                orchestrator.gateway.as_ref(),
                &orchestrator.registry,
                orchestrator.strategy,
                &orchestrator.prompts.tool_suggestion_prompt,
                &tx,
                assistant_id,
                messages,
                system,
                ToolContext { conversation_id },
                orchestrator.config.max_tool_rounds,
            )
            .await;

            let full_text = match result {
                Ok(text) => text,
                Err(e) => {
                    error!(phase = ?TurnPhase::Failed, %conversation_id, "Edit turn failed during streaming: {:#}", e);
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: format!("Failed to process your request: {}", e),
                        })
                        .await;
                    return;
                }
            };

            if let Err(e) = orchestrator
                .finalize_turn(conversation_id, group_id, user_message_id, assistant_id, &full_text)
                .await
            {
                error!(phase = ?TurnPhase::Failed, %conversation_id, "Failed to persist edited turn: {:#}", e);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: "Failed to persist the response".to_string(),
                    })
                    .await;
                return;
            }

            info!(phase = ?TurnPhase::Completed, %conversation_id, "Edited turn persisted");

            orchestrator.spawn_side_effects(SideEffectInput {
                user_id: owner,
                conversation_id,
                query: edited_query,
                answer: full_text,
                anchor: cutoff,
                generate_title: false,
                regenerate_summary: false,
                previous_summary: String::new(),
                history: vec![],
                index_vectors: false,
            });
        });

        Ok(rx)
    }

    async fn attach_files(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message_id: Uuid,
        attachments: &[FileAttachment],
    ) -> Result<Vec<StoredFile>> {
        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            stored.push(
                self.store
                    .create_file(
                        user_id,
                        conversation_id,
                        message_id,
                        &attachment.file_name,
                        &attachment.file_type,
                        &attachment.storage_url,
                    )
                    .await?,
            );
        }
        Ok(stored)
    }

    async fn finalize_turn(
        &self,
        conversation_id: Uuid,
        group_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
        full_text: &str,
    ) -> Result<()> {
        self.store
            .update_message_content(assistant_message_id, full_text)
            .await
            .context("Failed to store assistant content")?;

        self.store
            .append_version_pair(group_id, user_message_id, assistant_message_id)
            .await
            .context("Failed to append version pair")?;

        self.store
            .touch_conversation(conversation_id)
            .await
            .context("Failed to touch conversation")?;

        Ok(())
    }

    /// Launch the post-completion side effects. Each runs detached in its
    /// own failure boundary; none may fail the user-visible turn.
    fn spawn_side_effects(self: Arc<Self>, input: SideEffectInput) {
        let orchestrator = self;
        let SideEffectInput {
            user_id,
            conversation_id,
            query,
            answer,
            anchor,
            generate_title,
            regenerate_summary,
            previous_summary,
            history,
            index_vectors,
        } = input;

        {
            let orchestrator = orchestrator.clone();
            let (user_id, query, answer) = (user_id.clone(), query.clone(), answer.clone());
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .write_memory(&user_id, &query, &answer, anchor)
                    .await
                {
                    warn!("Memory update failed: {:#}", e);
                }
            });
        }

        if index_vectors {
            let orchestrator = orchestrator.clone();
            let (query, answer) = (query.clone(), answer.clone());
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .vectors
                    .add_documents(conversation_id, vec![query, answer])
                    .await
                {
                    warn!("Vector indexing failed: {:#}", e);
                }
            });
        }

        if generate_title {
            let orchestrator = orchestrator.clone();
            let (query, answer) = (query.clone(), answer.clone());
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .generate_title(conversation_id, &query, &answer)
                    .await
                {
                    warn!("Title generation failed: {:#}", e);
                }
            });
        }

        if regenerate_summary {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .generate_summary(conversation_id, &previous_summary, history)
                    .await
                {
                    warn!("Summary regeneration failed: {:#}", e);
                }
            });
        }
    }

    /// Write the turn into long-term memory. A memory created inside the
    /// update window after the turn's anchor is refreshed in place instead
    /// of duplicated (repeated edits of the same turn collapse to one
    /// entry).
    async fn write_memory(
        &self,
        user_id: &str,
        query: &str,
        answer: &str,
        anchor: DateTime<Utc>,
    ) -> Result<()> {
        let previous = self
            .memory
            .get_all_in_window(user_id, anchor, anchor + self.memory_update_window)
            .await?;

        match previous.first() {
            Some(entry) => self.memory.update(&entry.id, answer).await,
            None => {
                self.memory
                    .add(
                        vec![ChatMessage::user(query), ChatMessage::assistant(answer)],
                        user_id,
                    )
                    .await
            }
        }
    }

    async fn generate_title(
        &self,
        conversation_id: Uuid,
        query: &str,
        answer: &str,
    ) -> Result<()> {
        let messages = vec![
            ChatMessage::user(query),
            ChatMessage::assistant(answer),
            ChatMessage::user(self.prompts.title_prompt.clone()),
        ];

        let title = self.gateway.generate(messages, None).await?;
        let title = title.trim();
        if title.is_empty() {
            anyhow::bail!("Model returned an empty title");
        }

        self.store
            .update_conversation_title(conversation_id, title)
            .await?;

        debug!(%conversation_id, title, "Conversation titled");
        Ok(())
    }

    async fn generate_summary(
        &self,
        conversation_id: Uuid,
        previous_summary: &str,
        history: Vec<ChatMessage>,
    ) -> Result<()> {
        #[derive(Deserialize)]
        struct SummaryOut {
            summary: String,
        }

        let budget = self.config.summary_word_budget;
        let system = self
            .prompts
            .summary_prompt
            .replace("{summary}", previous_summary)
            .replace("{budget}", &budget.to_string());

        let raw = self.gateway.generate(history, Some(system)).await?;
        let json_str = extract_first_json_object(&raw).unwrap_or(raw.as_str());
        let parsed: SummaryOut =
            serde_json::from_str(json_str).context("Summary output was not valid JSON")?;

        let mut summary = parsed.summary.trim().to_string();
        if summary.is_empty() {
            anyhow::bail!("Model returned an empty summary");
        }

        let words: Vec<&str> = summary.split_whitespace().collect();
        let word_count = words.len();
        if word_count > budget {
            let truncated = words[..budget].join(" ");
            drop(words);
            summary = truncated;
        }

        self.store
            .update_conversation_summary(conversation_id, &summary)
            .await?;

        debug!(%conversation_id, words = word_count.min(budget), "Rolling summary updated");
        Ok(())
    }
}

struct SideEffectInput {
    user_id: String,
    conversation_id: Uuid,
    query: String,
    answer: String,
    anchor: DateTime<Utc>,
    generate_title: bool,
    regenerate_summary: bool,
    previous_summary: String,
    history: Vec<ChatMessage>,
    index_vectors: bool,
}

fn user_turn_message(query: &str, attachments: &[FileAttachment]) -> ChatMessage {
    if attachments.is_empty() {
        return ChatMessage::user(query);
    }

    let mut parts = vec![ContentPart::text(query)];
    for attachment in attachments {
        parts.push(ContentPart::file(
            attachment.file_name.clone(),
            &attachment.file_type,
            &attachment.bytes,
        ));
    }
    ChatMessage::user_with_parts(parts)
}

fn group_snapshot(
    group: &VersionGroup,
    messages: Vec<(Message, Vec<StoredFile>)>,
) -> VersionGroupView {
    VersionGroupView {
        id: group.id,
        conversation_id: group.conversation_id,
        versions: group.versions.clone(),
        index: group.index,
        created_at: group.created_at,
        messages: messages
            .into_iter()
            .map(|(message, files)| MessageView::from_message(message, files))
            .collect(),
    }
}

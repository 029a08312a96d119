//! End-to-end turn pipeline tests against in-memory collaborators: the
//! durable store, the model gateway, the memory store, and the vector index
//! are all swapped for scripted fakes so the full orchestration path runs
//! without a database or network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{OrchestratorConfig, PromptsConfig};
use crate::database::models::{
    Conversation, GroupWithMessages, Message, StoredFile, VersionGroup,
};
use crate::models::chat::{
    ChatMessage, ContentPart, FileAttachment, MessageContent, StreamEvent, ToolSpec,
};
use crate::services::conversation::history::MemoryEntry;
use crate::services::conversation::orchestrator::{
    ConversationStore, MemoryStore, ModelEvent, ModelEventStream, ModelGateway, TurnOrchestrator,
    VectorIndex,
};
use crate::services::conversation::versioning;
use crate::services::conversation::{ResponseStrategy, ToolRegistry};

// ===== IN-MEMORY CONVERSATION STORE =====

#[derive(Default)]
struct StoreState {
    conversations: HashMap<Uuid, Conversation>,
    groups: HashMap<Uuid, VersionGroup>,
    messages: HashMap<Uuid, Message>,
    files: Vec<StoredFile>,
}

struct InMemoryStore {
    state: Mutex<StoreState>,
    base: DateTime<Utc>,
    clock: AtomicI64,
}

impl InMemoryStore {
    fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            base: Utc::now() - ChronoDuration::hours(1),
            clock: AtomicI64::new(0),
        }
    }

    /// Strictly increasing timestamps so creation order is unambiguous.
    fn tick(&self) -> DateTime<Utc> {
        self.base + ChronoDuration::milliseconds(self.clock.fetch_add(1, Ordering::SeqCst))
    }

    fn seed_conversation(&self, user_id: &str) -> Conversation {
        let now = self.tick();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: None,
            model: None,
            history_summary: String::new(),
            created_at: now,
            updated_at: now,
            last_activity_at: None,
        };
        self.state
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.id, conversation.clone());
        conversation
    }

    fn conversation(&self, id: Uuid) -> Conversation {
        self.state.lock().unwrap().conversations[&id].clone()
    }

    fn group(&self, id: Uuid) -> VersionGroup {
        self.state.lock().unwrap().groups[&id].clone()
    }

    fn groups_of(&self, conversation_id: Uuid) -> Vec<VersionGroup> {
        let mut groups: Vec<VersionGroup> = self
            .state
            .lock()
            .unwrap()
            .groups
            .values()
            .filter(|g| g.conversation_id == conversation_id)
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.created_at);
        groups
    }

    fn message(&self, id: Uuid) -> Message {
        self.state.lock().unwrap().messages[&id].clone()
    }

    fn files_of(&self, message_id: Uuid) -> Vec<StoredFile> {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .filter(|f| f.message_id == message_id)
            .cloned()
            .collect()
    }

    fn new_message(
        &self,
        conversation_id: Uuid,
        group_id: Uuid,
        role: &str,
        sender: &str,
        content: &str,
    ) -> Message {
        let now = self.tick();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            version_group_id: group_id,
            role: role.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(message.id, message.clone());
        message
    }

    /// Seed one completed turn: group + pair, versions appended.
    async fn seed_turn(&self, conversation_id: Uuid, query: &str, answer: &str) -> VersionGroup {
        let (group, user_message, assistant_message) = ConversationStore::create_turn_slot(
            self,
            conversation_id,
            "user_1",
            query,
        )
        .await
        .unwrap();
        ConversationStore::update_message_content(self, assistant_message.id, answer)
            .await
            .unwrap();
        ConversationStore::append_version_pair(
            self,
            group.id,
            user_message.id,
            assistant_message.id,
        )
        .await
        .unwrap()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self.state.lock().unwrap().messages.get(&message_id).cloned())
    }

    async fn create_turn_slot(
        &self,
        conversation_id: Uuid,
        sender: &str,
        query: &str,
    ) -> Result<(VersionGroup, Message, Message)> {
        let group = VersionGroup {
            id: Uuid::new_v4(),
            conversation_id,
            versions: vec![],
            index: 0,
            created_at: self.tick(),
        };
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(group.id, group.clone());

        let user = self.new_message(conversation_id, group.id, "user", sender, query);
        let assistant = self.new_message(conversation_id, group.id, "assistant", "assistant", "");
        Ok((group, user, assistant))
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        version_group_id: Uuid,
        role: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message> {
        Ok(self.new_message(conversation_id, version_group_id, role, sender, content))
    }

    async fn update_message_content(&self, message_id: Uuid, content: &str) -> Result<Message> {
        let mut state = self.state.lock().unwrap();
        let message = state
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| anyhow!("message not found"))?;
        message.content = content.to_string();
        Ok(message.clone())
    }

    async fn append_version_pair(
        &self,
        group_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    ) -> Result<VersionGroup> {
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| anyhow!("group not found"))?;
        group.index = group.versions.len() as i32;
        group.versions.push(user_message_id);
        group.versions.push(assistant_message_id);
        Ok(group.clone())
    }

    async fn lookback(
        &self,
        conversation_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<GroupWithMessages>> {
        let state = self.state.lock().unwrap();
        let mut groups: Vec<VersionGroup> = state
            .groups
            .values()
            .filter(|g| g.conversation_id == conversation_id)
            .filter(|g| before.is_none_or(|cutoff| g.created_at < cutoff))
            .cloned()
            .collect();
        groups.sort_by_key(|g| std::cmp::Reverse(g.created_at));
        groups.truncate(limit as usize);

        Ok(groups
            .into_iter()
            .map(|group| {
                let mut messages: Vec<Message> = state
                    .messages
                    .values()
                    .filter(|m| m.version_group_id == group.id)
                    .cloned()
                    .collect();
                messages.sort_by_key(|m| m.created_at);
                GroupWithMessages { group, messages }
            })
            .collect())
    }

    async fn find_group_containing_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<VersionGroup>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .values()
            .find(|g| g.conversation_id == conversation_id && g.versions.contains(&message_id))
            .cloned())
    }

    async fn touch_conversation(&self, conversation_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
            conversation.last_activity_at = Some(Utc::now());
            conversation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_conversation_title(&self, conversation_id: Uuid, title: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
            conversation.title = Some(title.to_string());
        }
        Ok(())
    }

    async fn update_conversation_summary(
        &self,
        conversation_id: Uuid,
        summary: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
            conversation.history_summary = summary.to_string();
        }
        Ok(())
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
        let file = StoredFile {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            conversation_id: Some(conversation_id),
            message_id,
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            storage_url: storage_url.to_string(),
            created_at: self.tick(),
        };
        self.state.lock().unwrap().files.push(file.clone());
        Ok(file)
    }
}

// ===== SCRIPTED GATEWAY =====

struct ScriptedGateway {
    rounds: Mutex<VecDeque<Vec<ModelEvent>>>,
    replies: Mutex<VecDeque<String>>,
    streamed: Mutex<Vec<(Vec<ChatMessage>, Option<String>)>>,
}

impl ScriptedGateway {
    fn new(rounds: Vec<Vec<ModelEvent>>, replies: Vec<String>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            replies: Mutex::new(replies.into()),
            streamed: Mutex::new(vec![]),
        }
    }

    fn content(parts: &[&str]) -> Vec<ModelEvent> {
        parts
            .iter()
            .map(|p| ModelEvent::Content(p.to_string()))
            .collect()
    }

    fn streamed_calls(&self) -> Vec<(Vec<ChatMessage>, Option<String>)> {
        self.streamed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        system: Option<String>,
        _tools: Option<Vec<ToolSpec>>,
    ) -> Result<ModelEventStream> {
        self.streamed.lock().unwrap().push((messages, system));
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("gateway failure"))?;
        Ok(Box::pin(futures::stream::iter(
            round.into_iter().map(Ok::<ModelEvent, anyhow::Error>),
        )))
    }

    async fn generate(
        &self,
        _messages: Vec<ChatMessage>,
        _system: Option<String>,
    ) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply"))
    }
}

// ===== RECORDING MEMORY / VECTORS =====

#[derive(Default)]
struct RecordingMemory {
    search_results: Mutex<Vec<MemoryEntry>>,
    window_results: Mutex<Vec<MemoryEntry>>,
    adds: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    updates: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MemoryStore for RecordingMemory {
    async fn search(&self, _query: &str, _user_id: &str) -> Result<Vec<MemoryEntry>> {
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn add(&self, messages: Vec<ChatMessage>, user_id: &str) -> Result<()> {
        self.adds
            .lock()
            .unwrap()
            .push((user_id.to_string(), messages));
        Ok(())
    }

    async fn update(&self, memory_id: &str, text: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((memory_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn get_all_in_window(
        &self,
        _user_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>> {
        Ok(self.window_results.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct RecordingVectors {
    adds: Mutex<Vec<(Uuid, Vec<String>)>>,
}

#[async_trait]
impl VectorIndex for RecordingVectors {
    async fn add_documents(&self, conversation_id: Uuid, contents: Vec<String>) -> Result<()> {
        self.adds.lock().unwrap().push((conversation_id, contents));
        Ok(())
    }

    async fn retrieve(
        &self,
        _query: &str,
        _conversation_id: Uuid,
        _top_k: i64,
    ) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

// ===== HARNESS =====

struct Harness {
    store: Arc<InMemoryStore>,
    gateway: Arc<ScriptedGateway>,
    memory: Arc<RecordingMemory>,
    vectors: Arc<RecordingVectors>,
    orchestrator: Arc<TurnOrchestrator>,
}

fn harness(gateway: ScriptedGateway, memory: RecordingMemory) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(gateway);
    let memory = Arc::new(memory);
    let vectors = Arc::new(RecordingVectors::default());

    let config = OrchestratorConfig {
        strategy: "no_tools".to_string(),
        query_lookback_groups: 25,
        edit_lookback_groups: 5,
        max_history_entries: 15,
        summary_threshold: 15,
        summary_word_budget: 400,
        max_tool_rounds: 4,
        vector_top_k: 3,
    };

    let orchestrator = Arc::new(TurnOrchestrator::new(
        store.clone(),
        gateway.clone(),
        memory.clone(),
        vectors.clone(),
        Arc::new(ToolRegistry::new()),
        ResponseStrategy::NoTools,
        PromptsConfig::default(),
        config,
        30,
    ));

    Harness {
        store,
        gateway,
        memory,
        vectors,
        orchestrator,
    }
}

async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = vec![];
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Stream { data, .. } => Some(data.as_str()),
            _ => None,
        })
        .collect()
}

/// Poll until `check` passes or the timeout elapses; side effects are
/// detached tasks, so assertions on their results must wait for them.
async fn eventually<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

// ===== TESTS =====

#[tokio::test]
async fn first_turn_persists_pair_and_round_trips_streamed_text() {
    let h = harness(
        ScriptedGateway::new(
            vec![ScriptedGateway::content(&["The ", "answer ", "is 4"])],
            vec!["Simple Math".to_string()], // title
        ),
        RecordingMemory::default(),
    );
    let conversation = h.store.seed_conversation("user_1");

    let rx = h
        .orchestrator
        .clone()
        .run_query(
            "user_1",
            conversation.clone(),
            "2+2".to_string(),
            true,
            vec![],
        )
        .await
        .unwrap();
    let events = drain(rx).await;

    // First event is the group snapshot with the placeholder pair.
    let StreamEvent::Vg { data } = &events[0] else {
        panic!("first event must be the version group snapshot");
    };
    assert_eq!(data.index, 0);
    assert!(data.versions.is_empty());
    assert_eq!(data.messages.len(), 2);
    assert_eq!(data.messages[0].content, "2+2");
    assert_eq!(data.messages[1].content, "");

    let streamed = streamed_text(&events);
    assert_eq!(streamed, "The answer is 4");

    // Persisted state: versions = [userId, assistantId], index = 0, and the
    // assistant content equals the streamed concatenation exactly.
    let group = h.store.group(data.id);
    assert_eq!(group.versions.len(), 2);
    assert_eq!(group.index, 0);
    assert_eq!(group.versions[0], data.messages[0].id);
    assert_eq!(group.versions[1], data.messages[1].id);
    assert_eq!(h.store.message(group.versions[1]).content, streamed);

    // The next turn's assembled history includes this pair.
    let groups = h
        .store
        .lookback(conversation.id, 25, None)
        .await
        .unwrap();
    let assembler = crate::services::conversation::HistoryAssembler::new(15);
    let history = assembler.assemble(&groups, None, None, None);
    let contents: Vec<String> = history.iter().map(|m| m.content.as_text()).collect();
    assert_eq!(contents, vec!["2+2", "The answer is 4"]);

    // Fire-and-forget enrichment lands without being on the stream path.
    eventually(
        || h.store.conversation(conversation.id).title.as_deref() == Some("Simple Math"),
        "title generation",
    )
    .await;
    eventually(
        || !h.vectors.adds.lock().unwrap().is_empty(),
        "vector indexing",
    )
    .await;
    let adds = h.vectors.adds.lock().unwrap();
    assert_eq!(adds[0].1, vec!["2+2".to_string(), "The answer is 4".to_string()]);
    eventually(
        || !h.memory.adds.lock().unwrap().is_empty(),
        "memory write",
    )
    .await;
}

#[tokio::test]
async fn attachments_link_to_the_user_message_and_reach_the_model() {
    let h = harness(
        ScriptedGateway::new(
            vec![ScriptedGateway::content(&["noted"])],
            vec![],
        ),
        RecordingMemory::default(),
    );
    let conversation = h.store.seed_conversation("user_1");

    let attachment = FileAttachment {
        file_name: "notes.txt".to_string(),
        file_type: "text/plain".to_string(),
        storage_url: "http://blob/notes.txt".to_string(),
        bytes: b"remember this".to_vec(),
    };

    let rx = h
        .orchestrator
        .clone()
        .run_query(
            "user_1",
            conversation.clone(),
            "summarize my notes".to_string(),
            false,
            vec![attachment],
        )
        .await
        .unwrap();
    let events = drain(rx).await;

    // The snapshot carries the file record on the user message.
    let StreamEvent::Vg { data } = &events[0] else {
        panic!("first event must be the version group snapshot");
    };
    assert_eq!(data.messages[0].files.len(), 1);
    assert_eq!(data.messages[0].files[0].file_name, "notes.txt");
    assert_eq!(h.store.files_of(data.messages[0].id).len(), 1);

    // The model request carried the file part alongside the text.
    let calls = h.gateway.streamed_calls();
    let (messages, _) = calls.last().unwrap();
    let user_message = messages.last().unwrap();
    match &user_message.content {
        MessageContent::Parts(parts) => {
            assert_eq!(parts.len(), 2);
            assert!(matches!(parts[0], ContentPart::Text { .. }));
            assert!(matches!(parts[1], ContentPart::File { .. }));
        }
        MessageContent::Text(_) => panic!("expected content parts for an attachment turn"),
    }
}

#[tokio::test]
async fn edit_branches_without_deleting_and_sees_only_the_past() {
    let memory = RecordingMemory::default();
    let h = harness(
        ScriptedGateway::new(
            vec![ScriptedGateway::content(&["edited answer"])],
            vec![],
        ),
        memory,
    );
    let conversation = h.store.seed_conversation("user_1");

    // Two completed turns; the edit targets the first.
    let group_one = h
        .store
        .seed_turn(conversation.id, "first question", "first answer")
        .await;
    h.store
        .seed_turn(conversation.id, "second question", "second answer")
        .await;

    // One memory learned before the edited turn, one after.
    *h.memory.search_results.lock().unwrap() = vec![
        MemoryEntry {
            id: "m_old".to_string(),
            memory: "old fact".to_string(),
            created_at: Some(group_one.created_at - ChronoDuration::minutes(5)),
        },
        MemoryEntry {
            id: "m_new".to_string(),
            memory: "new fact".to_string(),
            created_at: Some(group_one.created_at + ChronoDuration::minutes(5)),
        },
    ];
    // An entry already exists in the update window: expect update, not add.
    *h.memory.window_results.lock().unwrap() = vec![MemoryEntry {
        id: "m_window".to_string(),
        memory: "stale".to_string(),
        created_at: Some(group_one.created_at),
    }];

    let edited_user_id = group_one.versions[0];
    let rx = h
        .orchestrator
        .clone()
        .run_edit(
            "user_1",
            conversation.clone(),
            edited_user_id,
            "edited question".to_string(),
            vec![],
        )
        .await
        .unwrap();
    let events = drain(rx).await;
    assert_eq!(streamed_text(&events), "edited answer");

    // The superseded pair is kept; exactly one pair was appended and the
    // index points at it.
    let group = h.store.group(group_one.id);
    assert_eq!(group.versions.len(), 4);
    assert_eq!(group.index, 2);
    assert_eq!(h.store.message(group.versions[0]).content, "first question");
    assert_eq!(h.store.message(group.versions[2]).content, "edited question");
    assert_eq!(h.store.message(group.versions[3]).content, "edited answer");
    assert_eq!(
        versioning::version_info(group.index, group.versions.len()),
        versioning::VersionInfo { current: 2, total: 2 }
    );

    // The regenerated branch saw neither the later turn nor the later
    // memory.
    let calls = h.gateway.streamed_calls();
    let (messages, system) = calls.last().unwrap();
    let flattened: String = messages.iter().map(|m| m.content.as_text() + "\n").collect();
    assert!(!flattened.contains("second question"));
    assert!(!flattened.contains("second answer"));
    let system = system.clone().unwrap_or_default();
    assert!(system.contains("old fact"));
    assert!(!system.contains("new fact"));

    eventually(
        || !h.memory.updates.lock().unwrap().is_empty(),
        "memory update",
    )
    .await;
    let updates = h.memory.updates.lock().unwrap();
    assert_eq!(updates[0], ("m_window".to_string(), "edited answer".to_string()));
    assert!(h.memory.adds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn summary_regenerates_past_threshold_without_blocking_the_stream() {
    let h = harness(
        ScriptedGateway::new(
            vec![ScriptedGateway::content(&["ok"])],
            vec![r#"{"summary": "condensed history"}"#.to_string()],
        ),
        RecordingMemory::default(),
    );
    let conversation = h.store.seed_conversation("user_1");

    // Eight completed turns = 16 candidate entries, capped to 15 >= the
    // summarization threshold.
    for i in 0..8 {
        h.store
            .seed_turn(
                conversation.id,
                &format!("question {}", i),
                &format!("answer {}", i),
            )
            .await;
    }

    let rx = h
        .orchestrator
        .clone()
        .run_query(
            "user_1",
            h.store.conversation(conversation.id),
            "ninth question".to_string(),
            false,
            vec![],
        )
        .await
        .unwrap();

    // The stream closes on its own; the summary write happens after.
    let events = drain(rx).await;
    assert_eq!(streamed_text(&events), "ok");

    eventually(
        || h.store.conversation(conversation.id).history_summary == "condensed history",
        "summary regeneration",
    )
    .await;
}

#[tokio::test]
async fn empty_query_without_files_is_rejected_before_any_persistence() {
    let h = harness(
        ScriptedGateway::new(vec![], vec![]),
        RecordingMemory::default(),
    );
    let conversation = h.store.seed_conversation("user_1");

    let result = h
        .orchestrator
        .clone()
        .run_query("user_1", conversation.clone(), "   ".to_string(), false, vec![])
        .await;

    assert!(result.is_err());
    assert!(h.store.groups_of(conversation.id).is_empty());
}

#[tokio::test]
async fn gateway_failure_surfaces_error_and_leaves_versions_consistent() {
    // No scripted rounds: the first stream_chat call fails.
    let h = harness(
        ScriptedGateway::new(vec![], vec![]),
        RecordingMemory::default(),
    );
    let conversation = h.store.seed_conversation("user_1");

    let rx = h
        .orchestrator
        .clone()
        .run_query(
            "user_1",
            conversation.clone(),
            "hello".to_string(),
            false,
            vec![],
        )
        .await
        .unwrap();
    let events = drain(rx).await;

    // The snapshot went out, then a terminal error; no content.
    assert!(matches!(events.first(), Some(StreamEvent::Vg { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, StreamEvent::Error { .. })));
    assert!(streamed_text(&events).is_empty());

    // The user message is durable, but no pair was appended: readers see no
    // half-finished turn.
    let groups = h.store.groups_of(conversation.id);
    assert_eq!(groups.len(), 1);
    assert!(groups[0].versions.is_empty());
    assert_eq!(groups[0].index, 0);

    // And nothing was enriched.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.vectors.adds.lock().unwrap().is_empty());
    assert!(h.memory.adds.lock().unwrap().is_empty());
}

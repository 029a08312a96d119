use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub base_url: String,
    pub api_key: String,
    /// Window (seconds) after a turn starts in which a fresh memory entry is
    /// updated in place instead of duplicated.
    pub update_window_seconds: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub folder: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrchestratorConfig {
    /// Response strategy: "no_tools" | "suggest_then_chat" | "chat_with_tools"
    pub strategy: String,
    /// Version groups fetched for the new-query lookback.
    pub query_lookback_groups: i64,
    /// Version groups fetched for the edit-flow lookback.
    pub edit_lookback_groups: i64,
    /// Assembled history is capped to this many entries (oldest dropped).
    pub max_history_entries: usize,
    /// Assembled history length at which the rolling summary is regenerated.
    pub summary_threshold: usize,
    /// Word budget for the rolling summary.
    pub summary_word_budget: usize,
    /// Upper bound on Chat -> ToolExec -> Chat rounds per turn.
    pub max_tool_rounds: usize,
    /// Vector lookup result count for the history search tool.
    pub vector_top_k: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_tool_suggestion_prompt")]
    pub tool_suggestion_prompt: String,
    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,
    #[serde(default = "default_title_prompt")]
    pub title_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            tool_suggestion_prompt: default_tool_suggestion_prompt(),
            summary_prompt: default_summary_prompt(),
            title_prompt: default_title_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful, conversational AI assistant. Respond naturally and \
     directly, matching the user's tone. Integrate any recalled memories \
     seamlessly without describing how you obtained them.\n\n\
     Relevant past memories:\n{memories}"
        .to_string()
}

fn default_tool_suggestion_prompt() -> String {
    "You are a tool suggestor. Based on the user's latest query, return which \
     of the available tools (if any) would help answer it. Use tool names \
     exactly as provided. Respond only in valid JSON: \
     {\"suggested_tools\": [<names>], \"description\": \"<short reason>\"}\n\n\
     Available tools:\n{tools}"
        .to_string()
}

fn default_summary_prompt() -> String {
    "You are an expert conversation summarizer maintaining a running summary \
     of this conversation. Merge new information with the previous summary \
     instead of repeating the whole conversation. Keep it under {budget} \
     words, preserve facts, decisions, and user preferences, and drop small \
     talk. Output valid JSON: {\"summary\": \"<updated summary>\"}\n\n\
     Previous summary:\n<summary>{summary}</summary>"
        .to_string()
}

fn default_title_prompt() -> String {
    "Generate a short and meaningful title (under 5 words) for this \
     conversation based on the user's query and the assistant's response. \
     The title should be relevant, clear, and reflect the core topic."
        .to_string()
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

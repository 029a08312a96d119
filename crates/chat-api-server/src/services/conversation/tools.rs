//! The tool set the model may call mid-turn, and the registry that
//! dispatches directives by their declared name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::orchestrator::VectorIndex;
use crate::models::chat::ToolSpec;
use crate::services::search_service::SearchService;

/// Per-turn state a tool may need.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: Uuid,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec::function(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// One line per tool, for the suggestion prompt.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch a directive by exact declared name. Failures never escape:
    /// an unknown tool or a throwing tool becomes an error-content result so
    /// the remaining calls of the turn still run.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!("Model requested unknown tool '{}'", name);
            return format!("Error: unknown tool '{}'", name);
        };

        match tool.invoke(args, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Tool '{}' failed: {:#}", name, e);
                format!("Error executing tool '{}': {}", name, e)
            }
        }
    }
}

// ===== CALCULATOR =====

/// Deterministic four-function arithmetic. Division by zero is not special
/// cased: it propagates IEEE infinity/NaN.
pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    a: f64,
    b: f64,
    operator: String,
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs multiplication, addition, division, and subtraction between two any operands."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "description": "First operand" },
                "b": { "type": "number", "description": "Second operand" },
                "operator": { "type": "string", "maxLength": 1, "description": "operator" }
            },
            "required": ["a", "b", "operator"]
        })
    }

    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: CalculatorArgs =
            serde_json::from_value(args).context("Invalid calculator arguments")?;

        let result = match args.operator.as_str() {
            "+" => args.a + args.b,
            "-" => args.a - args.b,
            "/" => args.a / args.b,
            _ => args.a * args.b,
        };

        Ok(result.to_string())
    }
}

// ===== WEB SEARCH =====

pub struct WebSearchTool {
    search: Arc<SearchService>,
}

impl WebSearchTool {
    pub fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for current information. Takes the query in parameters."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: SearchArgs = serde_json::from_value(args).context("Invalid search arguments")?;
        self.search.search(&args.query).await
    }
}

// ===== CONVERSATION VECTOR LOOKUP =====

pub struct HistoryVectorSearchTool {
    index: Arc<dyn VectorIndex>,
    top_k: i64,
}

impl HistoryVectorSearchTool {
    pub fn new(index: Arc<dyn VectorIndex>, top_k: i64) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl Tool for HistoryVectorSearchTool {
    fn name(&self) -> &str {
        "history_vector_search"
    }

    fn description(&self) -> &str {
        "Searches similar vectors from the current conversation's vector DB entries. \
         Returns the top relevant results. Takes the query in parameters."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Query to search past turns for" }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let args: SearchArgs = serde_json::from_value(args).context("Invalid search arguments")?;
        let documents = self
            .index
            .retrieve(&args.query, ctx.conversation_id, self.top_k)
            .await?;

        if documents.is_empty() {
            return Ok("No similar entries found in this conversation.".to_string());
        }

        Ok(documents.join("\n"))
    }
}

//! Conversation orchestration module
//!
//! Turns one user query into a persisted, versioned, streamed turn:
//! - History assembly over the version-group graph
//! - The turn state machine with fire-and-forget side effects
//! - Response strategies and the tool-execution loop
//! - Pure pair arithmetic for version navigation

pub mod history;
pub mod orchestrator;
pub mod strategy;
pub mod tools;
pub mod versioning;

pub use history::{HistoryAssembler, MemoryEntry};
pub use orchestrator::{
    ConversationStore, MemoryStore, ModelGateway, TurnOrchestrator, VectorIndex,
};
pub use strategy::ResponseStrategy;
pub use tools::{CalculatorTool, HistoryVectorSearchTool, ToolRegistry, WebSearchTool};

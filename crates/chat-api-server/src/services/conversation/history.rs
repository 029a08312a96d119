//! History assembly: turning the persisted version-group graph into the
//! ordered message list a model invocation should see.

use chrono::{DateTime, Utc};

use super::versioning::normalized_index;
use crate::database::models::GroupWithMessages;
use crate::models::chat::ChatMessage;

/// A retrieved long-term memory excerpt (external store, referenced only).
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub id: String,
    pub memory: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct HistoryAssembler {
    max_entries: usize,
}

impl HistoryAssembler {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Build model-facing history from a newest-first lookback window.
    ///
    /// Groups are reversed to chronological order and each contributes its
    /// active pair (two messages starting at the normalized even index).
    /// The flattened sequence is capped to `max_entries`, dropping oldest
    /// first. A rolling summary and a memory excerpt, when present, are
    /// prepended as synthetic assistant entries (memories first) and do not
    /// count against the cap.
    ///
    /// `before` re-applies the edit-flow temporal cut: groups created at or
    /// after the cutoff never contribute, even if the caller's fetch was
    /// wider than it should have been.
    pub fn assemble(
        &self,
        groups_desc: &[GroupWithMessages],
        summary: Option<&str>,
        memories_excerpt: Option<&str>,
        before: Option<DateTime<Utc>>,
    ) -> Vec<ChatMessage> {
        let mut history: Vec<ChatMessage> = groups_desc
            .iter()
            .rev()
            .filter(|entry| before.is_none_or(|cutoff| entry.group.created_at < cutoff))
            .flat_map(|entry| self.active_pair(entry))
            .collect();

        if history.len() > self.max_entries {
            history.drain(0..history.len() - self.max_entries);
        }

        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            history.insert(
                0,
                ChatMessage::assistant(format!(
                    "Here is the whole summary of our previous conversation:\n{}",
                    summary
                )),
            );
        }

        if let Some(memories) = memories_excerpt.filter(|m| !m.trim().is_empty()) {
            history.insert(
                0,
                ChatMessage::assistant(format!("Relevant past memories:\n{}", memories)),
            );
        }

        history
    }

    fn active_pair(&self, entry: &GroupWithMessages) -> Vec<ChatMessage> {
        let start = normalized_index(entry.group.index);
        entry
            .messages
            .iter()
            .skip(start)
            .take(2)
            .map(|message| ChatMessage::new(&message.role, message.content.as_str()))
            .collect()
    }
}

/// Keep only memories created strictly before the cutoff, preserving the
/// temporal causality of a regenerated branch. Entries without a timestamp
/// are dropped.
pub fn filter_memories_before(
    memories: Vec<MemoryEntry>,
    cutoff: DateTime<Utc>,
) -> Vec<MemoryEntry> {
    memories
        .into_iter()
        .filter(|entry| entry.created_at.is_some_and(|created| created < cutoff))
        .collect()
}

pub fn memories_to_excerpt(memories: &[MemoryEntry]) -> String {
    memories
        .iter()
        .map(|entry| format!("- {}", entry.memory))
        .collect::<Vec<_>>()
        .join("\n")
}

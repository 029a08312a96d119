use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::conversation::history::MemoryEntry;
use super::conversation::orchestrator::MemoryStore;
use crate::config::MemoryConfig;
use crate::models::chat::ChatMessage;

/// HTTP client for the external long-term memory store.
#[derive(Clone)]
pub struct MemoryService {
    client: Client,
    config: MemoryConfig,
}

#[derive(Debug, Deserialize)]
struct MemoryEntryRaw {
    id: String,
    memory: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<MemoryEntryRaw> for MemoryEntry {
    fn from(raw: MemoryEntryRaw) -> Self {
        MemoryEntry {
            id: raw.id,
            memory: raw.memory,
            created_at: raw.created_at,
        }
    }
}

impl MemoryService {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    async fn post_entries(&self, path: &str, body: serde_json::Value) -> Result<Vec<MemoryEntry>> {
        let response = self
            .client
            .post(format!("{}{}", self.config.base_url, path))
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .context("Failed to reach memory store")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Memory store error ({}): {}", status, text));
        }

        let entries: Vec<MemoryEntryRaw> = response
            .json()
            .await
            .context("Failed to parse memory store response")?;

        Ok(entries.into_iter().map(MemoryEntry::from).collect())
    }
}

#[async_trait]
impl MemoryStore for MemoryService {
    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryEntry>> {
        let entries = self
            .post_entries(
                "/v1/memories/search/",
                json!({ "query": query, "user_id": user_id }),
            )
            .await?;

        debug!(user_id, count = entries.len(), "Memory search complete");
        Ok(entries)
    }

    async fn add(&self, messages: Vec<ChatMessage>, user_id: &str) -> Result<()> {
        let payload: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content.as_text() }))
            .collect();

        let response = self
            .client
            .post(format!("{}/v1/memories/", self.config.base_url))
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&json!({ "messages": payload, "user_id": user_id }))
            .send()
            .await
            .context("Failed to reach memory store")?;

        if !response.status().is_success() {
            return Err(anyhow!("Memory add failed: {}", response.status()));
        }

        Ok(())
    }

    async fn update(&self, memory_id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/v1/memories/{}/", self.config.base_url, memory_id))
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("Failed to reach memory store")?;

        if !response.status().is_success() {
            return Err(anyhow!("Memory update failed: {}", response.status()));
        }

        Ok(())
    }

    async fn get_all_in_window(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>> {
        self.post_entries(
            "/v1/memories/filters/",
            json!({
                "filters": {
                    "AND": [
                        { "user_id": user_id },
                        { "created_at": { "gte": from, "lte": to } }
                    ]
                }
            }),
        )
        .await
    }
}

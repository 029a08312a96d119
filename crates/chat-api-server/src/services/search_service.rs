use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::json;

use crate::config::SearchConfig;

/// External web-search capability, consumed by the `web_search` tool.
#[derive(Clone)]
pub struct SearchService {
    client: Client,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    /// Returns the result set serialized as text for tool-result injection.
    pub async fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/search", self.config.base_url))
            .json(&json!({ "api_key": self.config.api_key, "query": query }))
            .send()
            .await
            .context("Failed to reach search service")?;

        if !response.status().is_success() {
            return Err(anyhow!("Search service error: {}", response.status()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let results = body.get("results").unwrap_or(&body);
        serde_json::to_string(results).context("Failed to serialize search results")
    }
}

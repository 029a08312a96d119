use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::EmbeddingConfig;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    content: String,
    // Some servers expect "input" instead; send both for compatibility
    input: String,
    model: String,
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Generate an embedding for a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            content: text.to_string(),
            input: text.to_string(),
            model: self.config.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embedding", self.config.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let json_value: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = Self::parse_embedding(&json_value)
            .ok_or_else(|| anyhow!("Unrecognized embedding response format"))?;

        if embedding.len() != self.config.dimension {
            return Err(anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.config.dimension,
                embedding.len()
            ));
        }

        Ok(embedding)
    }

    /// Accepts `{"embedding": [...]}`, `[{"embedding": [...]}]`, and the
    /// OpenAI-style `{"data": [{"embedding": [...]}]}`.
    fn parse_embedding(value: &serde_json::Value) -> Option<Vec<f32>> {
        let candidate = if value.is_array() {
            value.get(0)?.get("embedding")?
        } else if value.get("embedding").is_some() {
            value.get("embedding")?
        } else {
            value.get("data")?.get(0)?.get("embedding")?
        };

        let floats = candidate
            .as_array()?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Vec<f32>>();

        if floats.is_empty() {
            None
        } else {
            Some(floats)
        }
    }
}

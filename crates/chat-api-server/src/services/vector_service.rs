use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::conversation::orchestrator::VectorIndex;
use super::embedding_service::EmbeddingService;
use crate::database::Repository;

/// Conversation-scoped similarity index over pgvector.
pub struct VectorService {
    repository: Arc<Repository>,
    embeddings: Arc<EmbeddingService>,
}

impl VectorService {
    pub fn new(repository: Arc<Repository>, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            repository,
            embeddings,
        }
    }
}

#[async_trait]
impl VectorIndex for VectorService {
    async fn add_documents(&self, conversation_id: Uuid, contents: Vec<String>) -> Result<()> {
        let mut entries = Vec::with_capacity(contents.len());
        for content in contents {
            if content.trim().is_empty() {
                continue;
            }
            let embedding = self
                .embeddings
                .embed(&content)
                .await
                .context("Failed to embed document")?;
            entries.push((content, Vector::from(embedding)));
        }

        if entries.is_empty() {
            return Ok(());
        }

        let count = entries.len();
        self.repository
            .insert_conversation_vectors(conversation_id, entries)
            .await?;

        debug!(%conversation_id, count, "Indexed turn documents");
        Ok(())
    }

    async fn retrieve(
        &self,
        query: &str,
        conversation_id: Uuid,
        top_k: i64,
    ) -> Result<Vec<String>> {
        let embedding = self
            .embeddings
            .embed(query)
            .await
            .context("Failed to embed query")?;

        self.repository
            .search_conversation_vectors(conversation_id, Vector::from(embedding), top_k)
            .await
    }
}

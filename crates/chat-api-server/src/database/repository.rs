use super::models::{
    Conversation, GroupWithMessages, Message, MessageView, StoredFile, VersionGroup,
    VersionGroupView,
};
use super::DbPool;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ensure conversation tables exist. Runs at boot.
    pub async fn ensure_schema(&self, embedding_dimension: usize) -> Result<()> {
        let pool = self.pool.get_pool();

        // Needs a role allowed to install extensions; a plain role works
        // when the extension is already present.
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
        {
            warn!("Could not ensure pgvector extension: {}", e);
        }

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS conversations (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL,
                title TEXT,
                model TEXT,
                history_summary TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                last_activity_at TIMESTAMP WITH TIME ZONE
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS version_groups (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                versions UUID[] NOT NULL DEFAULT '{}',
                "index" INT NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                conversation_id UUID NOT NULL,
                version_group_id UUID NOT NULL REFERENCES version_groups(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS files (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL,
                conversation_id UUID,
                message_id UUID NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                storage_url TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS conversation_vectors (
                id BIGSERIAL PRIMARY KEY,
                conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                embedding vector({}),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )"#,
            embedding_dimension
        ))
        .execute(pool)
        .await?;

        // Indices
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user \
             ON conversations(user_id, created_at DESC)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_version_groups_conversation \
             ON version_groups(conversation_id, created_at)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_group \
             ON messages(version_group_id, created_at)",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_message ON files(message_id)")
            .execute(pool)
            .await?;
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_conversation_vectors_embedding
               ON conversation_vectors
               USING ivfflat (embedding vector_cosine_ops)
               WITH (lists = 100)"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversation_vectors_conversation \
             ON conversation_vectors(conversation_id)",
        )
        .execute(pool)
        .await?;

        debug!("Conversation schema ensured");
        Ok(())
    }

    // ============ CONVERSATIONS ============

    pub async fn create_conversation(&self, user_id: &str) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"INSERT INTO conversations (user_id) VALUES ($1) RETURNING *"#,
        )
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(conversation)
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"SELECT * FROM conversations
               WHERE user_id = $1
               ORDER BY COALESCE(last_activity_at, created_at) DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(conversations)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.get_pool())
                .await?;

        Ok(conversation)
    }

    /// Cascades to version groups, messages, files, and vector entries.
    pub async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    pub async fn update_conversation_title(&self, id: Uuid, title: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET title = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    pub async fn update_conversation_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET history_summary = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(summary)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    pub async fn touch_conversation(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET updated_at = NOW(), last_activity_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    // ============ VERSION GROUPS ============

    /// Create a fresh turn slot pre-populated with the user message and an
    /// empty assistant placeholder, in one transaction.
    pub async fn create_version_group_with_pair(
        &self,
        conversation_id: Uuid,
        sender: &str,
        query: &str,
    ) -> Result<(VersionGroup, Message, Message)> {
        let mut transaction = self.pool.get_pool().begin().await?;

        let group = sqlx::query_as::<_, VersionGroup>(
            "INSERT INTO version_groups (conversation_id) VALUES ($1) RETURNING *",
        )
        .bind(conversation_id)
        .fetch_one(&mut *transaction)
        .await?;

        let user_message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (conversation_id, version_group_id, role, sender, content)
               VALUES ($1, $2, 'user', $3, $4)
               RETURNING *"#,
        )
        .bind(conversation_id)
        .bind(group.id)
        .bind(sender)
        .bind(query)
        .fetch_one(&mut *transaction)
        .await?;

        let assistant_message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (conversation_id, version_group_id, role, sender, content)
               VALUES ($1, $2, 'assistant', 'assistant', '')
               RETURNING *"#,
        )
        .bind(conversation_id)
        .bind(group.id)
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok((group, user_message, assistant_message))
    }

    pub async fn create_message(
        &self,
        conversation_id: Uuid,
        version_group_id: Uuid,
        role: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (conversation_id, version_group_id, role, sender, content)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(conversation_id)
        .bind(version_group_id)
        .bind(role)
        .bind(sender)
        .bind(content)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(message)
    }

    pub async fn update_message_content(&self, message_id: Uuid, content: &str) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages SET content = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(message_id)
        .bind(content)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(message)
    }

    pub async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(self.pool.get_pool())
            .await?;

        Ok(message)
    }

    /// Append a user+assistant pair to a group's `versions` and point
    /// `"index"` at the new pair. A single UPDATE: the right-hand side reads
    /// the pre-update row, so `cardinality(versions)` is the offset the new
    /// pair lands on, and concurrent appends serialize on the row lock.
    pub async fn append_version_pair(
        &self,
        group_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    ) -> Result<VersionGroup> {
        let group = sqlx::query_as::<_, VersionGroup>(
            r#"UPDATE version_groups
               SET versions = versions || ARRAY[$2, $3]::uuid[],
                   "index" = cardinality(versions)
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(group_id)
        .bind(user_message_id)
        .bind(assistant_message_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(group)
    }

    /// Persist a navigation change. Returns the number of affected rows so
    /// callers can distinguish a stale group id.
    pub async fn set_group_index(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        index: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE version_groups SET "index" = $3
               WHERE id = $1 AND conversation_id = $2"#,
        )
        .bind(group_id)
        .bind(conversation_id)
        .bind(index)
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_version_group(&self, group_id: Uuid) -> Result<Option<VersionGroup>> {
        let group = sqlx::query_as::<_, VersionGroup>("SELECT * FROM version_groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(self.pool.get_pool())
            .await?;

        Ok(group)
    }

    pub async fn find_group_containing_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<VersionGroup>> {
        let group = sqlx::query_as::<_, VersionGroup>(
            r#"SELECT * FROM version_groups
               WHERE conversation_id = $1 AND $2 = ANY(versions)"#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(group)
    }

    /// Cascades to the group's messages (and their files).
    pub async fn delete_version_group(&self, group_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM version_groups WHERE id = $1")
            .bind(group_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    /// Newest-first lookback window for history assembly. `before` applies
    /// the edit-flow temporal cut (strictly earlier groups only).
    pub async fn list_groups_with_messages_desc(
        &self,
        conversation_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<GroupWithMessages>> {
        let groups = match before {
            Some(cutoff) => {
                sqlx::query_as::<_, VersionGroup>(
                    r#"SELECT * FROM version_groups
                       WHERE conversation_id = $1 AND created_at < $2
                       ORDER BY created_at DESC
                       LIMIT $3"#,
                )
                .bind(conversation_id)
                .bind(cutoff)
                .bind(limit)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, VersionGroup>(
                    r#"SELECT * FROM version_groups
                       WHERE conversation_id = $1
                       ORDER BY created_at DESC
                       LIMIT $2"#,
                )
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(self.pool.get_pool())
                .await?
            }
        };

        if groups.is_empty() {
            return Ok(vec![]);
        }

        let group_ids: Vec<Uuid> = groups.iter().map(|g| g.id).collect();
        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages
               WHERE version_group_id = ANY($1)
               ORDER BY created_at ASC"#,
        )
        .bind(&group_ids)
        .fetch_all(self.pool.get_pool())
        .await?;

        let mut by_group: HashMap<Uuid, Vec<Message>> = HashMap::new();
        for message in messages {
            by_group
                .entry(message.version_group_id)
                .or_default()
                .push(message);
        }

        Ok(groups
            .into_iter()
            .map(|group| {
                let messages = by_group.remove(&group.id).unwrap_or_default();
                GroupWithMessages { group, messages }
            })
            .collect())
    }

    /// Full conversation read: groups in creation order, messages with their
    /// file attachments.
    pub async fn list_version_groups_with_files(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<VersionGroupView>> {
        let groups = sqlx::query_as::<_, VersionGroup>(
            r#"SELECT * FROM version_groups
               WHERE conversation_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages
               WHERE conversation_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        let files = sqlx::query_as::<_, StoredFile>(
            "SELECT * FROM files WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        let mut files_by_message: HashMap<Uuid, Vec<StoredFile>> = HashMap::new();
        for file in files {
            files_by_message
                .entry(file.message_id)
                .or_default()
                .push(file);
        }

        let mut views_by_group: HashMap<Uuid, Vec<MessageView>> = HashMap::new();
        for message in messages {
            let attached = files_by_message.remove(&message.id).unwrap_or_default();
            views_by_group
                .entry(message.version_group_id)
                .or_default()
                .push(MessageView::from_message(message, attached));
        }

        Ok(groups
            .into_iter()
            .map(|group| VersionGroupView {
                id: group.id,
                conversation_id: group.conversation_id,
                versions: group.versions,
                index: group.index,
                created_at: group.created_at,
                messages: views_by_group.remove(&group.id).unwrap_or_default(),
            })
            .collect())
    }

    // ============ FILES ============

    pub async fn create_file(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        message_id: Uuid,
        file_name: &str,
        file_type: &str,
        storage_url: &str,
    ) -> Result<StoredFile> {
        let file = sqlx::query_as::<_, StoredFile>(
            r#"INSERT INTO files (user_id, conversation_id, message_id, file_name, file_type, storage_url)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(conversation_id)
        .bind(message_id)
        .bind(file_name)
        .bind(file_type)
        .bind(storage_url)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(file)
    }

    pub async fn list_files_by_ids(&self, ids: &[Uuid]) -> Result<Vec<StoredFile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let files = sqlx::query_as::<_, StoredFile>("SELECT * FROM files WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.pool.get_pool())
            .await?;

        Ok(files)
    }

    // ============ CONVERSATION VECTORS ============

    pub async fn insert_conversation_vectors(
        &self,
        conversation_id: Uuid,
        entries: Vec<(String, Vector)>,
    ) -> Result<()> {
        let mut transaction = self.pool.get_pool().begin().await?;

        for (content, embedding) in entries {
            sqlx::query(
                r#"INSERT INTO conversation_vectors (conversation_id, content, embedding)
                   VALUES ($1, $2, $3)"#,
            )
            .bind(conversation_id)
            .bind(&content)
            .bind(embedding)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        debug!("Inserted vector entries for conversation {}", conversation_id);

        Ok(())
    }

    pub async fn search_conversation_vectors(
        &self,
        conversation_id: Uuid,
        query_embedding: Vector,
        top_k: i64,
    ) -> Result<Vec<String>> {
        let contents = sqlx::query_scalar::<_, String>(
            r#"SELECT content FROM conversation_vectors
               WHERE conversation_id = $1
               ORDER BY embedding <=> $2
               LIMIT $3"#,
        )
        .bind(conversation_id)
        .bind(query_embedding)
        .bind(top_k)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(contents)
    }
}

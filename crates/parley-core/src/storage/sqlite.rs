//! SQLite-backed conversation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::database::Database;
use super::{
    merge_objects, ConversationMode, ConversationRecord, ConversationStore, MessageRole,
    MessageType, StoreError, StoredMessage,
};

pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn get_sync(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, title, mode, metadata_json, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                [conversation_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, mode, metadata_json, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let message_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;

        Ok(Some(ConversationRecord {
            id,
            title,
            mode: ConversationMode::parse(&mode).unwrap_or(ConversationMode::Simple),
            metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
            message_count: message_count as usize,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    fn create_if_missing(&self, conversation_id: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT OR IGNORE INTO conversations (id, mode, metadata_json, created_at, updated_at)
             VALUES (?1, 'simple', '{}', ?2, ?2)",
            params![conversation_id, now],
        )?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        self.get_sync(conversation_id)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT role, content, message_type, iteration, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY id",
        )?;

        let messages = stmt
            .query_map([conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages
            .into_iter()
            .filter_map(|(role, content, message_type, iteration, created_at)| {
                Some(StoredMessage {
                    role: MessageRole::parse(&role)?,
                    content,
                    created_at: parse_timestamp(&created_at),
                    message_type: message_type.as_deref().and_then(MessageType::parse),
                    iteration: iteration.map(|i| i as u32),
                })
            })
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        message_type: Option<MessageType>,
        iteration: Option<u32>,
    ) -> Result<(), StoreError> {
        self.create_if_missing(conversation_id)?;

        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, message_type, iteration, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation_id,
                role.as_str(),
                content,
                message_type.map(|t| t.as_str()),
                iteration.map(|i| i as i64),
                now
            ],
        )?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now, conversation_id],
        )?;
        Ok(())
    }

    async fn merge_metadata(
        &self,
        conversation_id: &str,
        partial: Value,
    ) -> Result<bool, StoreError> {
        let Some(record) = self.get_sync(conversation_id)? else {
            return Ok(false);
        };

        let mut partial = partial;
        let mode = partial
            .as_object_mut()
            .and_then(|map| map.remove("mode"))
            .and_then(|m| m.as_str().and_then(ConversationMode::parse));

        let mut metadata = record.metadata;
        merge_objects(&mut metadata, partial);
        let metadata_json = serde_json::to_string(&metadata)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.db.conn();
        if let Some(mode) = mode {
            conn.execute(
                "UPDATE conversations SET mode = ?1, metadata_json = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![mode.as_str(), metadata_json, now, conversation_id],
            )?;
        } else {
            conn.execute(
                "UPDATE conversations SET metadata_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![metadata_json, now, conversation_id],
            )?;
        }
        Ok(true)
    }

    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now, conversation_id],
        )?;
        Ok(())
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationRecord>, StoreError> {
        let ids: Vec<String> = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT id FROM conversations ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_sync(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
        Ok(deleted > 0)
    }
}

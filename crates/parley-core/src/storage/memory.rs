//! In-memory conversation store.
//!
//! Backs tests and zero-setup runs. Same observable semantics as the
//! SQLite store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    merge_objects, ConversationMode, ConversationRecord, ConversationStore, MessageRole,
    MessageType, StoreError, StoredMessage,
};

#[derive(Clone)]
struct Entry {
    record: ConversationRecord,
    messages: Vec<StoredMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        Ok(self.conversations.read().get(conversation_id).map(|entry| {
            let mut record = entry.record.clone();
            record.message_count = entry.messages.len();
            record
        }))
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .conversations
            .read()
            .get(conversation_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        message_type: Option<MessageType>,
        iteration: Option<u32>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut conversations = self.conversations.write();
        let entry = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Entry {
                record: ConversationRecord {
                    id: conversation_id.to_string(),
                    title: None,
                    mode: ConversationMode::Simple,
                    metadata: Value::Object(serde_json::Map::new()),
                    message_count: 0,
                    created_at: now,
                    updated_at: now,
                },
                messages: Vec::new(),
            });

        entry.messages.push(StoredMessage {
            role,
            content: content.to_string(),
            created_at: now,
            message_type,
            iteration,
        });
        entry.record.updated_at = now;
        Ok(())
    }

    async fn merge_metadata(
        &self,
        conversation_id: &str,
        partial: Value,
    ) -> Result<bool, StoreError> {
        let mut conversations = self.conversations.write();
        let Some(entry) = conversations.get_mut(conversation_id) else {
            return Ok(false);
        };

        let mut partial = partial;
        if let Some(mode) = partial
            .as_object_mut()
            .and_then(|map| map.remove("mode"))
            .and_then(|m| m.as_str().and_then(ConversationMode::parse))
        {
            entry.record.mode = mode;
        }
        merge_objects(&mut entry.record.metadata, partial);
        entry.record.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.conversations.write().get_mut(conversation_id) {
            entry.record.title = Some(title.to_string());
            entry.record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationRecord>, StoreError> {
        let mut records: Vec<ConversationRecord> = self
            .conversations
            .read()
            .values()
            .map(|entry| {
                let mut record = entry.record.clone();
                record.message_count = entry.messages.len();
                record
            })
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self.conversations.write().remove(conversation_id).is_some())
    }
}

//! Persistence layer.
//!
//! The engine and mode manager consume the [`ConversationStore`] trait and
//! treat `metadata.debate_state` as an opaque blob. Two backends:
//! SQLite for durable local storage, in-memory for tests and zero-setup runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod database;
mod memory;
mod sqlite;

pub use database::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    /// Internal debate transcript entries (moderator analyses, expert
    /// answers, critic reviews). Never shown as conversation history.
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

/// What a stored message represents within a debate turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserQuery,
    FinalAnswer,
    ModeratorInit,
    ModeratorSynthesize,
    ExpertAnswer,
    CriticReview,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::UserQuery => "user_query",
            MessageType::FinalAnswer => "final_answer",
            MessageType::ModeratorInit => "moderator_init",
            MessageType::ModeratorSynthesize => "moderator_synthesize",
            MessageType::ExpertAnswer => "expert_answer",
            MessageType::CriticReview => "critic_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_query" => Some(MessageType::UserQuery),
            "final_answer" => Some(MessageType::FinalAnswer),
            "moderator_init" => Some(MessageType::ModeratorInit),
            "moderator_synthesize" => Some(MessageType::ModeratorSynthesize),
            "expert_answer" => Some(MessageType::ExpertAnswer),
            "critic_review" => Some(MessageType::CriticReview),
            _ => None,
        }
    }
}

/// Conversation processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    Simple,
    Debate,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Simple => "simple",
            ConversationMode::Debate => "debate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(ConversationMode::Simple),
            "debate" => Some(ConversationMode::Debate),
            _ => None,
        }
    }
}

/// Conversation metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub title: Option<String>,
    pub mode: ConversationMode,
    /// Opaque to the store; the engine reads/writes `debate_state` here.
    pub metadata: Value,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored message, chronological order by insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

/// Durable key-value record of messages and metadata.
///
/// Implementations must be safe for concurrent use across conversations;
/// serialization of turns within one conversation is the boundary layer's
/// job, not the store's.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch conversation metadata. `None` if unknown.
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError>;

    /// All messages in chronological order.
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Append a message, creating the conversation (simple mode, empty
    /// metadata) if it does not exist yet.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        message_type: Option<MessageType>,
        iteration: Option<u32>,
    ) -> Result<(), StoreError>;

    /// Shallow-merge `partial` into the conversation's metadata object in a
    /// single write. A `"mode"` key in `partial` updates the conversation
    /// mode instead of landing in metadata. Returns false if the
    /// conversation does not exist.
    async fn merge_metadata(
        &self,
        conversation_id: &str,
        partial: Value,
    ) -> Result<bool, StoreError>;

    /// Set the conversation title.
    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<(), StoreError>;

    /// List conversations, most recently updated first.
    async fn list(&self, limit: usize, offset: usize)
        -> Result<Vec<ConversationRecord>, StoreError>;

    /// Delete a conversation and its messages. Returns false if unknown.
    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError>;
}

/// Shallow-merge `partial` into `base`, both JSON objects.
pub(crate) fn merge_objects(base: &mut Value, partial: Value) {
    if !base.is_object() {
        *base = Value::Object(serde_json::Map::new());
    }
    if let (Some(base_map), Value::Object(partial_map)) = (base.as_object_mut(), partial) {
        for (key, value) in partial_map {
            base_map.insert(key, value);
        }
    }
}

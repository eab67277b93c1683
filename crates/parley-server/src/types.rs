//! Request/response DTOs for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_core::storage::{ConversationMode, ConversationRecord, StoredMessage};

/// Body for the simple (single-model) chat endpoint.
#[derive(Debug, Deserialize)]
pub struct SimpleChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimpleChatResponse {
    pub conversation_id: String,
    pub response: String,
}

/// Per-role model overrides. Unset roles fall back to the server default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebateModels {
    pub moderator: Option<String>,
    pub expert: Option<String>,
    pub critic: Option<String>,
}

/// Body for both the blocking and streaming debate endpoints.
#[derive(Debug, Deserialize)]
pub struct DebateChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub models: DebateModels,
    pub max_iterations: Option<u32>,
    pub score_threshold: Option<f64>,
}

/// Blocking debate response.
#[derive(Debug, Serialize)]
pub struct DebateChatResponse {
    pub conversation_id: String,
    pub final_answer: String,
    pub was_direct_answer: bool,
    pub termination_reason: String,
    pub total_iterations: u32,
}

#[derive(Debug, Deserialize)]
pub struct ModeSwitchRequest {
    pub mode: ConversationMode,
    pub model_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub mode: ConversationMode,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversationRecord> for ConversationSummary {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            mode: record.mode,
            message_count: record.message_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationHistoryResponse {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for MessageView {
    fn from(message: StoredMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content,
            message_type: message.message_type.map(|t| t.as_str().to_string()),
            iteration: message.iteration,
            created_at: message.created_at,
        }
    }
}

//! Conversation mode switching.
//!
//! Conversations run in `simple` or `debate` mode. Switching to debate
//! seeds the metadata with a compressed transcript so the first debate turn
//! has context; switching back clears the model configuration but keeps the
//! debate history, marked inactive.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::storage::{ConversationMode, ConversationStore, StoreError};

use super::compress::{self, DEFAULT_EXCHANGE_LIMIT};

#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("model_config is required when switching to debate mode")]
    MissingDebateConfig,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a mode switch request.
#[derive(Debug, Clone, Serialize)]
pub struct ModeSwitch {
    pub success: bool,
    pub conversation_id: String,
    pub mode: ConversationMode,
    pub message: String,
}

pub struct ModeManager {
    store: Arc<dyn ConversationStore>,
}

impl ModeManager {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Switch a conversation's mode.
    ///
    /// A switch on a conversation that does not exist yet is deferred: the
    /// request succeeds and the mode applies when the first message creates
    /// the conversation. Switching to the current mode is a no-op.
    pub async fn switch_mode(
        &self,
        conversation_id: &str,
        target_mode: ConversationMode,
        model_config: Option<Value>,
    ) -> Result<ModeSwitch, ModeError> {
        let Some(record) = self.store.get(conversation_id).await? else {
            info!(conversation_id, ?target_mode, "mode switch deferred until first message");
            return Ok(ModeSwitch {
                success: true,
                conversation_id: conversation_id.to_string(),
                mode: target_mode,
                message: format!("Mode set to {} (will apply on first message)", target_mode.as_str()),
            });
        };

        if record.mode == target_mode {
            return Ok(ModeSwitch {
                success: true,
                conversation_id: conversation_id.to_string(),
                mode: target_mode,
                message: format!("Already in {} mode", target_mode.as_str()),
            });
        }

        let (partial, message) = match target_mode {
            ConversationMode::Debate => {
                let Some(model_config) = model_config else {
                    return Err(ModeError::MissingDebateConfig);
                };
                let mut partial = json!({
                    "mode": target_mode.as_str(),
                    "model_config": model_config,
                });
                let context = self.prepare_debate_context(conversation_id).await?;
                if !context.is_empty() {
                    partial["debate_state"] = json!({
                        "conversation_context": context,
                        "previous_summary": "",
                        "last_iteration": 0,
                    });
                }
                (
                    partial,
                    "Switched to debate mode. Previous conversation context prepared.".to_string(),
                )
            }
            ConversationMode::Simple => {
                let mut partial = json!({
                    "mode": target_mode.as_str(),
                    "model_config": Value::Null,
                });
                // Keep the debate history around, marked inactive.
                if let Some(mut debate_state) = record.metadata.get("debate_state").cloned() {
                    if let Some(map) = debate_state.as_object_mut() {
                        map.insert("active".to_string(), Value::Bool(false));
                    }
                    partial["debate_state"] = debate_state;
                }
                (
                    partial,
                    "Switched to simple mode. Debate configuration cleared.".to_string(),
                )
            }
        };

        self.store.merge_metadata(conversation_id, partial).await?;
        info!(
            conversation_id,
            from = record.mode.as_str(),
            to = target_mode.as_str(),
            "conversation mode switched"
        );

        Ok(ModeSwitch {
            success: true,
            conversation_id: conversation_id.to_string(),
            mode: target_mode,
            message,
        })
    }

    /// Compressed transcript handed to the first debate turn.
    async fn prepare_debate_context(&self, conversation_id: &str) -> Result<String, StoreError> {
        let messages = self.store.get_messages(conversation_id).await?;
        let transcript = compress::compress(&messages, DEFAULT_EXCHANGE_LIMIT);
        if transcript.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("Previous conversation:\n{transcript}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MessageRole, MessageType};

    fn manager() -> (ModeManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ModeManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_switch_on_missing_conversation_is_deferred() {
        let (manager, _store) = manager();
        let result = manager
            .switch_mode("ghost", ConversationMode::Debate, Some(json!({"m": "x"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.mode, ConversationMode::Debate);
        assert!(result.message.contains("will apply on first message"));
    }

    #[tokio::test]
    async fn test_switch_to_current_mode_is_noop() {
        let (manager, store) = manager();
        store
            .append_message("c", MessageRole::User, "hi", None, None)
            .await
            .unwrap();

        let result = manager
            .switch_mode("c", ConversationMode::Simple, None)
            .await
            .unwrap();
        assert!(result.message.contains("Already in simple mode"));
    }

    #[tokio::test]
    async fn test_debate_switch_requires_model_config() {
        let (manager, store) = manager();
        store
            .append_message("c", MessageRole::User, "hi", None, None)
            .await
            .unwrap();

        let err = manager
            .switch_mode("c", ConversationMode::Debate, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModeError::MissingDebateConfig));
    }

    #[tokio::test]
    async fn test_debate_switch_seeds_context() {
        let (manager, store) = manager();
        store
            .append_message("c", MessageRole::User, "what is rust?", None, None)
            .await
            .unwrap();
        store
            .append_message("c", MessageRole::Assistant, "a language", None, None)
            .await
            .unwrap();

        manager
            .switch_mode("c", ConversationMode::Debate, Some(json!({"expert_model": "m1"})))
            .await
            .unwrap();

        let record = store.get("c").await.unwrap().unwrap();
        assert_eq!(record.mode, ConversationMode::Debate);
        assert_eq!(
            record.metadata.pointer("/model_config/expert_model").unwrap(),
            "m1"
        );
        let context = record
            .metadata
            .pointer("/debate_state/conversation_context")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(context.starts_with("Previous conversation:"));
        assert!(context.contains("User: what is rust?"));
        assert_eq!(
            record.metadata.pointer("/debate_state/last_iteration").unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_debate_switch_context_keeps_last_five_pairs() {
        let (manager, store) = manager();
        for i in 1..=6 {
            store
                .append_message("c", MessageRole::User, &format!("question {i}"), None, None)
                .await
                .unwrap();
            store
                .append_message("c", MessageRole::Assistant, &format!("answer {i}"), None, None)
                .await
                .unwrap();
        }

        manager
            .switch_mode("c", ConversationMode::Debate, Some(json!({"expert_model": "m1"})))
            .await
            .unwrap();

        let record = store.get("c").await.unwrap().unwrap();
        let context = record
            .metadata
            .pointer("/debate_state/conversation_context")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(!context.contains("question 1\n"));
        assert!(context.contains("question 2"));
        assert!(context.contains("answer 6"));
        let lines = context
            .lines()
            .filter(|l| l.starts_with("User:") || l.starts_with("Assistant:"))
            .count();
        assert_eq!(lines, 10);
    }

    #[tokio::test]
    async fn test_simple_switch_clears_config_and_keeps_history() {
        let (manager, store) = manager();
        store
            .append_message("c", MessageRole::User, "q", Some(MessageType::UserQuery), None)
            .await
            .unwrap();
        store
            .append_message(
                "c",
                MessageRole::Assistant,
                "a",
                Some(MessageType::FinalAnswer),
                None,
            )
            .await
            .unwrap();

        manager
            .switch_mode("c", ConversationMode::Debate, Some(json!({"expert_model": "m1"})))
            .await
            .unwrap();
        let result = manager
            .switch_mode("c", ConversationMode::Simple, None)
            .await
            .unwrap();
        assert!(result.message.contains("Switched to simple mode"));

        let record = store.get("c").await.unwrap().unwrap();
        assert_eq!(record.mode, ConversationMode::Simple);
        assert!(record
            .metadata
            .get("model_config")
            .map(|v| v.is_null())
            .unwrap_or(true));
        assert_eq!(
            record.metadata.pointer("/debate_state/active").unwrap(),
            false
        );
        assert!(record
            .metadata
            .pointer("/debate_state/conversation_context")
            .is_some());
    }
}

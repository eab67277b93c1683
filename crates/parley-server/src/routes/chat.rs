//! Simple single-model chat endpoint.
//!
//! The non-debate path: one model call over the compressed conversation
//! history. Messages land in the same store the debate engine uses, so a
//! conversation keeps its history across mode switches.

use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use parley_core::debate::compress::{self, DEFAULT_EXCHANGE_LIMIT};
use parley_core::storage::{ConversationStore, MessageRole};
use parley_core::ModelCaller;

use crate::error::AppError;
use crate::types::{SimpleChatRequest, SimpleChatResponse};
use crate::AppState;

const TITLE_CHAR_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(simple_chat))
}

async fn simple_chat(
    State(state): State<AppState>,
    Json(request): Json<SimpleChatRequest>,
) -> Result<Json<SimpleChatResponse>, AppError> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }
    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let model = request
        .model
        .unwrap_or_else(|| state.settings.default_model.clone());
    let caller = state.clients.get(&model).await?;

    let response =
        run_simple_turn(state.store.as_ref(), caller.as_ref(), &conversation_id, &message).await?;

    Ok(Json(SimpleChatResponse {
        conversation_id,
        response,
    }))
}

/// One simple-mode exchange: prompt from compressed history, then persist
/// both sides. The user message is stored before the model call so it
/// survives a transport failure.
async fn run_simple_turn(
    store: &dyn ConversationStore,
    caller: &dyn ModelCaller,
    conversation_id: &str,
    message: &str,
) -> Result<String, AppError> {
    let is_new = store.get(conversation_id).await?.is_none();
    let history = store.get_messages(conversation_id).await?;
    let context = compress::compress(&history, DEFAULT_EXCHANGE_LIMIT);

    store
        .append_message(conversation_id, MessageRole::User, message, None, None)
        .await?;
    if is_new {
        store.set_title(conversation_id, &derive_title(message)).await?;
    }

    let reply = caller.invoke(&build_prompt(&context, message)).await?;

    store
        .append_message(conversation_id, MessageRole::Assistant, &reply, None, None)
        .await?;
    info!(
        conversation_id,
        model = caller.model_id(),
        "simple chat turn complete"
    );
    Ok(reply)
}

fn build_prompt(context: &str, message: &str) -> String {
    if context.is_empty() {
        message.to_string()
    } else {
        format!(
            "Previous conversation:\n{context}\n\nUser: {message}\n\nReply to the latest user message."
        )
    }
}

fn derive_title(message: &str) -> String {
    if message.chars().count() > TITLE_CHAR_LIMIT {
        let mut title: String = message.chars().take(TITLE_CHAR_LIMIT).collect();
        title.push_str("...");
        title
    } else {
        message.to_string()
    }
}

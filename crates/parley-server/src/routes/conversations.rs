//! Conversation management endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use parley_core::ModeManager;

use crate::error::AppError;
use crate::types::{
    ConversationHistoryResponse, ConversationSummary, ListConversationsQuery, MessageView,
    ModeSwitchRequest,
};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_conversations))
        .route(
            "/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/:id/mode", post(switch_mode))
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let records = state
        .store
        .list(
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationHistoryResponse>, AppError> {
    let record = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", id)))?;
    let messages = state.store.get_messages(&id).await?;

    Ok(Json(ConversationHistoryResponse {
        conversation: record.into(),
        messages: messages.into_iter().map(MessageView::from).collect(),
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.store.delete(&id).await? {
        return Err(AppError::NotFound(format!("Conversation {} not found", id)));
    }
    Ok(Json(json!({"success": true})))
}

async fn switch_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ModeSwitchRequest>,
) -> Result<Json<parley_core::debate::mode::ModeSwitch>, AppError> {
    let manager = ModeManager::new(state.store.clone());
    let result = manager
        .switch_mode(&id, request.mode, request.model_config)
        .await?;
    Ok(Json(result))
}

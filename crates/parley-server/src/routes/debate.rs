//! Debate chat endpoints: blocking and SSE streaming.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use parley_core::debate::events::DebateEvent;
use parley_core::{DebateConfig, DebateEngine, EngineInput, RoleCallers};

use crate::error::AppError;
use crate::types::{DebateChatRequest, DebateChatResponse};
use crate::AppState;

const SSE_CHANNEL_BUFFER: usize = 256;
const TURN_LOCK_MAX_ENTRIES: usize = 1000;
const TURN_LOCK_MAX_AGE: Duration = Duration::from_secs(3600);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(debate_chat))
        .route("/stream", post(debate_chat_stream))
}

struct TurnContext {
    engine: DebateEngine,
    question: String,
    conversation_id: String,
    guard: OwnedMutexGuard<()>,
}

/// Validate the request, resolve models, and take the per-conversation
/// turn lock. A conversation already running a turn yields 409.
async fn setup_turn(
    state: &AppState,
    request: DebateChatRequest,
) -> Result<TurnContext, AppError> {
    let question = request.message.trim().to_string();
    if question.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let default_model = &state.settings.default_model;
    let mut config = DebateConfig::new(
        request.models.moderator.as_deref().unwrap_or(default_model),
        request.models.expert.as_deref().unwrap_or(default_model),
        request.models.critic.as_deref().unwrap_or(default_model),
    );
    config.max_iterations = request
        .max_iterations
        .unwrap_or(state.settings.max_iterations);
    config.score_threshold = request
        .score_threshold
        .unwrap_or(state.settings.score_threshold);
    config.validate().map_err(AppError::BadRequest)?;

    let turn_lock = {
        let mut locks = state.turn_locks.write().await;
        if locks.len() > TURN_LOCK_MAX_ENTRIES {
            locks.retain(|_, (lock, created_at)| {
                created_at.elapsed() < TURN_LOCK_MAX_AGE || Arc::strong_count(lock) > 1
            });
        }
        let (lock, _) = locks
            .entry(conversation_id.clone())
            .or_insert_with(|| (Arc::new(Mutex::new(())), Instant::now()));
        lock.clone()
    };
    let guard = turn_lock.try_lock_owned().map_err(|_| {
        AppError::Conflict(format!(
            "Conversation {} already has a debate in progress",
            conversation_id
        ))
    })?;

    let callers = RoleCallers {
        moderator: state.clients.get(&config.moderator_model).await?,
        expert: state.clients.get(&config.expert_model).await?,
        critic: state.clients.get(&config.critic_model).await?,
    };
    let engine = DebateEngine::new(callers, state.store.clone(), config);

    Ok(TurnContext {
        engine,
        question,
        conversation_id,
        guard,
    })
}

/// Run a full debate turn and return only the final result.
async fn debate_chat(
    State(state): State<AppState>,
    Json(request): Json<DebateChatRequest>,
) -> Result<Json<DebateChatResponse>, AppError> {
    let ctx = setup_turn(&state, request).await?;
    let _guard = ctx.guard;

    let (mut events, _input) = ctx
        .engine
        .run(ctx.question, Some(ctx.conversation_id.clone()));

    while let Some(event) = events.recv().await {
        match event {
            DebateEvent::Done {
                final_answer,
                was_direct_answer,
                termination_reason,
                total_iterations,
            } => {
                let reason = serde_json::to_string(&termination_reason)
                    .unwrap_or_default()
                    .trim_matches('"')
                    .to_string();
                return Ok(Json(DebateChatResponse {
                    conversation_id: ctx.conversation_id,
                    final_answer,
                    was_direct_answer,
                    termination_reason: reason,
                    total_iterations,
                }));
            }
            DebateEvent::Error { error } => {
                return Err(AppError::Internal(error));
            }
            _ => {}
        }
    }

    Err(AppError::Internal(
        "Debate ended without a terminal event".to_string(),
    ))
}

/// Stream debate events as SSE. Client disconnect cancels the turn at the
/// next phase boundary.
async fn debate_chat_stream(
    State(state): State<AppState>,
    Json(request): Json<DebateChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = setup_turn(&state, request).await?;
    let conversation_id = ctx.conversation_id.clone();

    let (sse_tx, sse_rx) =
        mpsc::channel::<Result<Event, Infallible>>(SSE_CHANNEL_BUFFER);

    tokio::spawn(async move {
        // Holds the turn lock for the lifetime of the stream.
        let _guard = ctx.guard;
        let (mut events, input) = ctx
            .engine
            .run(ctx.question, Some(ctx.conversation_id));

        while let Some(event) = events.recv().await {
            let sse_event = match Event::default().json_data(&event) {
                Ok(e) => e,
                Err(error) => {
                    debug!(%error, "failed to serialize debate event");
                    continue;
                }
            };
            if sse_tx.send(Ok(sse_event)).await.is_err() {
                // Client went away; stop the engine at the next boundary.
                let _ = input.send(EngineInput::Cancel);
                break;
            }
        }
    });

    let stream: ReceiverStream<Result<Event, Infallible>> = ReceiverStream::new(sse_rx);
    let sse = sse_with_keepalive(stream);
    Ok(([("x-conversation-id", conversation_id)], sse))
}

fn sse_with_keepalive<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::default())
}

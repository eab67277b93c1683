//! API routes

use axum::Router;

use crate::AppState;

mod chat;
mod conversations;
mod debate;

/// Build the API router with all endpoints
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router().nest("/debate", debate::router()))
        .nest("/conversations", conversations::router())
}

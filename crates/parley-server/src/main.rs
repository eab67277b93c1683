//! Parley Server
//!
//! HTTP API for multi-role debate chat: blocking and SSE debate endpoints
//! plus conversation management.

use std::net::SocketAddr;
use std::sync::Arc;

use parley_core::storage::Database;
use parley_core::SqliteStore;

use parley_server::{build_router, AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = Settings::load();
    if settings.provider.api_key.is_empty() {
        tracing::warn!("PARLEY_API_KEY is not set; debate endpoints will fail until it is");
    }

    let db = Database::new(&settings.db_path)?;
    let store = Arc::new(SqliteStore::new(db));

    let port = settings.port;
    let state = AppState::new(store, settings);
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    tracing::info!("Starting parley-server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Parley API server library.
//!
//! Thin presentation layer over `parley_core::DebateEngine`: routes map
//! HTTP requests onto engine runs and store queries, and forward debate
//! events as SSE.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use parley_core::ai::ApiFormat;
use parley_core::ConversationStore;

pub mod error;
pub mod pool;
pub mod routes;
pub mod types;

use pool::{ClientPool, ProviderSettings};

/// Optional settings file (`config.toml` in the parley config directory).
/// Every field can be overridden by a `PARLEY_*` environment variable.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FileSettings {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_format: Option<String>,
    pub temperature: Option<f32>,
    pub max_iterations: Option<u32>,
    pub score_threshold: Option<f64>,
}

impl FileSettings {
    fn read() -> Self {
        let path = std::env::var("PARLEY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("parley")
                    .join("config.toml")
            });
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                Self::default()
            }
        }
    }
}

/// Resolved server settings: environment over config file over defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub db_path: PathBuf,
    pub default_model: String,
    pub provider: ProviderSettings,
    pub max_iterations: u32,
    pub score_threshold: f64,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Settings {
    pub fn load() -> Self {
        Self::resolve(FileSettings::read())
    }

    fn resolve(file: FileSettings) -> Self {
        let api_format = match env_var("PARLEY_API_FORMAT")
            .or(file.api_format)
            .as_deref()
        {
            Some("anthropic") => ApiFormat::Anthropic,
            _ => ApiFormat::OpenAi,
        };
        Self {
            port: env_var("PARLEY_PORT")
                .and_then(|p| p.parse().ok())
                .or(file.port)
                .unwrap_or(3000),
            db_path: env_var("PARLEY_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or_else(|| {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("parley")
                        .join("parley.db")
                }),
            default_model: env_var("PARLEY_DEFAULT_MODEL")
                .or(file.default_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            provider: ProviderSettings {
                base_url: env_var("PARLEY_BASE_URL")
                    .or(file.base_url)
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                api_key: env_var("PARLEY_API_KEY").or(file.api_key).unwrap_or_default(),
                api_format,
                temperature: env_var("PARLEY_TEMPERATURE")
                    .and_then(|t| t.parse().ok())
                    .or(file.temperature),
            },
            max_iterations: env_var("PARLEY_MAX_ITERATIONS")
                .and_then(|v| v.parse().ok())
                .or(file.max_iterations)
                .unwrap_or(parley_core::config::DEFAULT_MAX_ITERATIONS),
            score_threshold: env_var("PARLEY_SCORE_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .or(file.score_threshold)
                .unwrap_or(parley_core::config::DEFAULT_SCORE_THRESHOLD),
        }
    }
}

/// Per-conversation turn locks: one debate turn at a time per conversation.
pub type TurnLocks = Arc<RwLock<HashMap<String, (Arc<Mutex<()>>, Instant)>>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub clients: Arc<ClientPool>,
    pub turn_locks: TurnLocks,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Arc<dyn ConversationStore>, settings: Settings) -> Self {
        Self {
            store,
            clients: Arc::new(ClientPool::new(settings.provider.clone())),
            turn_locks: Arc::new(RwLock::new(HashMap::new())),
            settings: Arc::new(settings),
        }
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Parley Server"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_settings_parse() {
        let file: FileSettings = toml::from_str(
            r#"
            port = 8080
            default_model = "claude-sonnet-4-5"
            api_format = "anthropic"
            score_threshold = 85.0
            "#,
        )
        .unwrap();
        assert_eq!(file.port, Some(8080));
        assert_eq!(file.api_format.as_deref(), Some("anthropic"));
        assert_eq!(file.score_threshold, Some(85.0));
        assert!(file.api_key.is_none());
    }

    #[test]
    fn test_resolve_prefers_file_over_defaults() {
        let settings = Settings::resolve(FileSettings {
            port: Some(4000),
            api_format: Some("anthropic".to_string()),
            max_iterations: Some(5),
            ..Default::default()
        });
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.provider.api_format, ApiFormat::Anthropic);
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(
            settings.score_threshold,
            parley_core::config::DEFAULT_SCORE_THRESHOLD
        );
    }
}

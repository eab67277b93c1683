//! Parley core library.
//!
//! Everything the debate workflow needs, minus the transport:
//! - `ai` — the Model Caller abstraction and its HTTP implementation
//! - `debate` — state machine, parser, compressor, events, mode manager
//! - `storage` — the Conversation Store trait with SQLite and in-memory backends
//! - `config` — debate configuration shared by all consumers
//!
//! The HTTP server in `parley-server` is a thin presentation layer over
//! `DebateEngine::run()`; nothing in this crate knows about HTTP routing.

pub mod ai;
pub mod config;
pub mod debate;
pub mod storage;

pub use ai::caller::{CallerError, ModelCaller};
pub use config::DebateConfig;
pub use debate::engine::{DebateEngine, EngineInput, RoleCallers};
pub use debate::events::DebateEvent;
pub use debate::mode::ModeManager;
pub use debate::state::DebateState;
pub use storage::{ConversationStore, MemoryStore, SqliteStore, StoreError};

//! Model caller abstraction and HTTP client.
//!
//! The debate engine talks to models exclusively through the [`ModelCaller`]
//! trait so each role (moderator/expert/critic) can be backed by a different
//! model or provider. [`client::ModelClient`] is the production
//! implementation speaking Anthropic- and OpenAI-format chat APIs.

pub mod caller;
pub mod client;
pub mod streaming;

pub use caller::{CallerError, ModelCaller};
pub use client::{ApiFormat, ModelClient, ModelConfig};
pub use streaming::{collect_stream, StreamPart};

//! The Model Caller contract consumed by the debate engine.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::streaming::{collect_stream, StreamPart};

/// Transport-level failure from a model backend.
///
/// These are always fatal for the current debate turn — the engine never
/// retries them and never confuses them with malformed-but-present output
/// (which is recovered per phase instead).
#[derive(Debug, thiserror::Error)]
pub enum CallerError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("model stream error: {0}")]
    Stream(String),
}

/// A model backend for one debate role.
///
/// Implementations must be safe for concurrent use across conversations.
/// `stream` yields text increments as they arrive; `invoke` blocks until the
/// full response text is assembled. The engine only parses complete text,
/// so streaming is purely a transport-level concern.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Model identifier, used for logging and message attribution.
    fn model_id(&self) -> &str;

    /// Stream the response to `prompt` as text increments.
    ///
    /// The channel closes when the response is complete. A
    /// [`StreamPart::Error`] part signals a mid-stream transport failure.
    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, CallerError>;

    /// Invoke the model and wait for the full response text.
    async fn invoke(&self, prompt: &str) -> Result<String, CallerError> {
        let rx = self.stream(prompt).await?;
        collect_stream(rx).await
    }
}

//! Stream parts emitted by model callers.

use tokio::sync::mpsc;

use super::caller::CallerError;

/// One increment of a streaming model response.
#[derive(Debug, Clone)]
pub enum StreamPart {
    /// Text content delta.
    TextDelta { delta: String },

    /// Transport failure mid-stream. Terminal.
    Error { error: String },
}

/// Accumulate a stream into the full response text.
///
/// Returns an error if the stream reported a mid-stream failure — a
/// partially received response is never handed to the parser.
pub async fn collect_stream(
    mut rx: mpsc::UnboundedReceiver<StreamPart>,
) -> Result<String, CallerError> {
    let mut text = String::new();

    while let Some(part) = rx.recv().await {
        match part {
            StreamPart::TextDelta { delta } => text.push_str(&delta),
            StreamPart::Error { error } => return Err(CallerError::Stream(error)),
        }
    }

    Ok(text)
}

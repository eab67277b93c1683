//! HTTP model client.
//!
//! Speaks two wire formats: Anthropic messages (`/v1/messages`) and
//! OpenAI chat completions (`/v1/chat/completions`). Both support SSE
//! streaming; `invoke` is the blocking path that collects the stream.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::caller::{CallerError, ModelCaller};
use super::streaming::StreamPart;

const DEFAULT_MAX_TOKENS: usize = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Wire format for a model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    Anthropic,
    OpenAi,
}

/// Configuration for one model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub api_format: ApiFormat,
    /// Base URL without the endpoint path, e.g. `https://api.anthropic.com`.
    pub base_url: String,
    pub api_key: String,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    /// Per-call timeout. Turn deadlines are a boundary concern, so this is
    /// the only timeout in the core.
    pub timeout_secs: u64,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>, api_format: ApiFormat, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_format,
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    fn api_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.api_format {
            ApiFormat::Anthropic => format!("{}/v1/messages", base),
            ApiFormat::OpenAi => format!("{}/v1/chat/completions", base),
        }
    }
}

/// HTTP implementation of [`ModelCaller`].
pub struct ModelClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl ModelClient {
    /// Errors if the underlying HTTP client cannot be built; a silently
    /// degraded client would lose the configured timeout.
    pub fn new(config: ModelConfig) -> Result<Self, CallerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_request(&self, body: &Value) -> reqwest::RequestBuilder {
        let request = self.http.post(self.config.api_url()).json(body);
        match self.config.api_format {
            ApiFormat::Anthropic => request
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01"),
            ApiFormat::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
        }
    }

    fn build_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = match self.config.api_format {
            ApiFormat::Anthropic => serde_json::json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
                "stream": stream,
            }),
            ApiFormat::OpenAi => serde_json::json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
                "stream": stream,
            }),
        };

        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CallerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!("API error: {} - {}", status, message);
        Err(CallerError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Extract the text delta from one SSE data payload, if any.
    fn delta_from_sse_data(&self, data: &str) -> Option<String> {
        if data == "[DONE]" {
            return None;
        }
        let json: Value = serde_json::from_str(data).ok()?;

        match self.config.api_format {
            ApiFormat::Anthropic => {
                // content_block_delta carries {"delta": {"type": "text_delta", "text": ...}}
                if json.get("type").and_then(|t| t.as_str()) != Some("content_block_delta") {
                    return None;
                }
                json.pointer("/delta/text")
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
            }
            ApiFormat::OpenAi => json
                .pointer("/choices/0/delta/content")
                .and_then(|t| t.as_str())
                .map(str::to_string),
        }
    }
}

#[async_trait]
impl ModelCaller for ModelClient {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, CallerError> {
        let call_start = Instant::now();
        info!(
            model = %self.config.model,
            format = ?self.config.api_format,
            "Sending streaming model request"
        );

        let body = self.build_body(prompt, true);
        let response = self.build_request(&body).send().await?;
        let response = Self::ensure_success(response).await?;
        debug!(
            model = %self.config.model,
            "Model response headers in {:?}",
            call_start.elapsed()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let format = self.config.api_format;
        let model = self.config.model.clone();
        let parse_delta = {
            let client = ModelClient {
                http: self.http.clone(),
                config: self.config.clone(),
            };
            move |data: &str| client.delta_from_sse_data(data)
        };

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            // SSE events can split across chunks; buffer until newline.
            let mut line_buffer = String::new();
            let mut chunk_count: u64 = 0;

            while let Some(chunk) = stream.next().await {
                chunk_count += 1;
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(model = %model, "Stream read error at chunk #{}: {}", chunk_count, e);
                        let _ = tx.send(StreamPart::Error {
                            error: format!("stream read error: {}", e),
                        });
                        return;
                    }
                };

                line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = line_buffer.find('\n') {
                    let line = line_buffer[..pos].trim_end_matches('\r').to_string();
                    line_buffer.drain(..=pos);

                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Some(delta) = parse_delta(data) {
                            let _ = tx.send(StreamPart::TextDelta { delta });
                        }
                    }
                }
            }

            debug!(
                model = %model,
                format = ?format,
                "Stream ended after {} chunks in {:?}",
                chunk_count,
                call_start.elapsed()
            );
        });

        Ok(rx)
    }

    /// Non-streaming call. Cheaper than collecting a stream when the caller
    /// only wants the final text.
    async fn invoke(&self, prompt: &str) -> Result<String, CallerError> {
        let body = self.build_body(prompt, false);
        let response = self.build_request(&body).send().await?;
        let response = Self::ensure_success(response).await?;
        let json: Value = response.json().await?;

        let text = match self.config.api_format {
            ApiFormat::Anthropic => json
                .get("content")
                .and_then(|c| c.as_array())
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                        .collect::<String>()
                })
                .unwrap_or_default(),
            ApiFormat::OpenAi => json
                .pointer("/choices/0/message/content")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        };

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(format: ApiFormat) -> ModelClient {
        ModelClient::new(ModelConfig::new(
            "test-model",
            format,
            "https://example.invalid",
            "key",
        ))
        .unwrap()
    }

    #[test]
    fn test_api_url_per_format() {
        assert_eq!(
            client(ApiFormat::Anthropic).config().api_url(),
            "https://example.invalid/v1/messages"
        );
        assert_eq!(
            client(ApiFormat::OpenAi).config().api_url(),
            "https://example.invalid/v1/chat/completions"
        );
    }

    #[test]
    fn test_anthropic_delta_extraction() {
        let c = client(ApiFormat::Anthropic);
        let data = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}"#;
        assert_eq!(c.delta_from_sse_data(data).as_deref(), Some("hi"));
        assert_eq!(c.delta_from_sse_data(r#"{"type":"message_start"}"#), None);
        assert_eq!(c.delta_from_sse_data("[DONE]"), None);
    }

    #[test]
    fn test_openai_delta_extraction() {
        let c = client(ApiFormat::OpenAi);
        let data = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        assert_eq!(c.delta_from_sse_data(data).as_deref(), Some("hi"));
        assert_eq!(c.delta_from_sse_data(r#"{"choices":[{"delta":{}}]}"#), None);
    }
}

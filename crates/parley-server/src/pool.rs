//! Model client pool.
//!
//! Debate turns reference up to three models; repeated turns with the same
//! models reuse one HTTP client per model id instead of rebuilding
//! connections per request.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use parley_core::ai::{ApiFormat, ModelClient, ModelConfig};
use parley_core::CallerError;

const MAX_POOLED_CLIENTS: usize = 64;

/// Provider settings shared by every pooled client.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_format: ApiFormat,
    pub temperature: Option<f32>,
}

pub struct ClientPool {
    provider: ProviderSettings,
    clients: RwLock<HashMap<String, Arc<ModelClient>>>,
}

impl ClientPool {
    pub fn new(provider: ProviderSettings) -> Self {
        Self {
            provider,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch or build the client for a model id.
    pub async fn get(&self, model: &str) -> Result<Arc<ModelClient>, CallerError> {
        if let Some(client) = self.clients.read().await.get(model) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(model) {
            return Ok(client.clone());
        }
        // Drop idle clients once the pool grows past its cap.
        if clients.len() >= MAX_POOLED_CLIENTS {
            clients.retain(|_, client| Arc::strong_count(client) > 1);
        }
        let mut config = ModelConfig::new(
            model,
            self.provider.api_format,
            &self.provider.base_url,
            &self.provider.api_key,
        );
        config.temperature = self.provider.temperature;
        let client = Arc::new(ModelClient::new(config)?);
        clients.insert(model.to_string(), client.clone());
        Ok(client)
    }
}

mod gemini;
mod ollama;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ModelBackend, ModelConfig};

/// The external text-generation service.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateFailure>;
}

#[derive(Debug, Error)]
pub enum GenerateFailure {
    #[error("generation API failed ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("failed to reach generation API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid generation response: {0}")]
    Decode(String),
}

impl GenerateFailure {
    /// Lowers the failure to the untyped shape the error classifier reads.
    /// API bodies are passed through as parsed JSON when possible.
    pub fn raw(&self) -> Value {
        match self {
            GenerateFailure::Api { status, body } => serde_json::from_str::<Value>(body)
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::String(format!("[{status}] {body}"))),
            GenerateFailure::Transport(error) => json!({
                "name": "TransportError",
                "description": error.to_string(),
            }),
            GenerateFailure::Decode(message) => Value::String(message.clone()),
        }
    }
}

pub fn build_client(model: &ModelConfig, api_key: &str) -> Result<Arc<dyn GenerativeClient>> {
    let client: Arc<dyn GenerativeClient> = match model.backend {
        ModelBackend::Gemini => Arc::new(GeminiClient::new(model.clone(), api_key)?),
        ModelBackend::Ollama => Arc::new(OllamaClient::new(model.clone())?),
    };
    Ok(client)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_json_body_passes_through() {
        let failure = GenerateFailure::Api {
            status: 400,
            body: r#"{"error":{"code":400,"status":"INVALID_ARGUMENT"}}"#.to_string(),
        };
        assert_eq!(failure.raw()["error"]["status"], "INVALID_ARGUMENT");
    }

    #[test]
    fn non_json_body_keeps_status_in_message() {
        let failure = GenerateFailure::Api {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(failure.raw(), Value::String("[429] slow down".to_string()));
    }

    #[test]
    fn builds_configured_backend() {
        let model = ModelConfig::default();
        assert!(build_client(&model, "key").is_ok());
        assert!(build_client(&model, "  ").is_err());

        let ollama = ModelConfig {
            backend: ModelBackend::Ollama,
            ..ModelConfig::default()
        };
        assert!(build_client(&ollama, "").is_err());
    }
}

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::generator::{GenerateFailure, GenerativeClient};

const SYSTEM_PROMPT: &str =
    "You explain words and passages to a reader. Answer in plain text without markdown.";

pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.ollama_model.trim().is_empty() {
            return Err(anyhow!(
                "model.backend is ollama but model.ollama_model is empty"
            ));
        }
        if config.ollama_host.trim().is_empty() {
            return Err(anyhow!(
                "model.backend is ollama but model.ollama_host is empty"
            ));
        }

        Ok(Self {
            base_url: config.ollama_host.trim_end_matches('/').to_string(),
            model: config.ollama_model,
            temperature: config.temperature,
            top_p: config.top_p,
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }

    async fn run_ollama(&self, prompt: &str) -> Result<String, GenerateFailure> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let payload = OllamaChatRequest {
            model: self.model.clone(),
            stream: false,
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            options: OllamaOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        };

        let response = self.client.post(endpoint).json(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GenerateFailure::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|error| GenerateFailure::Decode(format!("invalid ollama response: {error}")))?;
        Ok(parsed.message.content)
    }
}

fn sanitize_output(raw: &str) -> String {
    raw.trim().trim_matches('`').trim_matches('"').trim().to_string()
}

#[async_trait]
impl GenerativeClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateFailure> {
        let raw = self.run_ollama(prompt).await?;
        Ok(sanitize_output(&raw))
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    stream: bool,
    messages: Vec<OllamaMessage>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

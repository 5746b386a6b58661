use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::generator::{GenerateFailure, GenerativeClient};

pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    top_p: f32,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: ModelConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!("gemini backend requires a non-empty API key"));
        }
        if config.gemini_model.trim().is_empty() {
            return Err(anyhow!(
                "model.backend is gemini but model.gemini_model is empty"
            ));
        }

        Ok(Self {
            base_url: config.gemini_endpoint.trim_end_matches('/').to_string(),
            model: config.gemini_model,
            api_key: api_key.trim().to_string(),
            temperature: config.temperature,
            top_p: config.top_p,
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }

    async fn run_gemini(&self, prompt: &str) -> Result<String, GenerateFailure> {
        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        };

        let response = self
            .client
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerateFailure::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|error| GenerateFailure::Decode(format!("invalid gemini response: {error}")))?;
        Ok(parsed.text())
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateFailure> {
        let text = self.run_gemini(prompt).await?;
        Ok(text.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate; empty when the model
    /// returned nothing usable.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

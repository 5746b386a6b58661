use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lexilight_core::{StaleGuard, WhitespacePolicy};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub startup: StartupConfig,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            let parsed: DaemonConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()))?;
            return Ok(parsed);
        }

        Ok(DaemonConfig::default())
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("LEXILIGHT_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("lexilight").join("config.toml");
    }

    Path::new("/tmp/lexilight.toml").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    Path::new("/tmp/lexilight.sock").to_path_buf()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_backend")]
    pub backend: ModelBackend,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_endpoint")]
    pub gemini_endpoint: String,
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    #[serde(default)]
    pub ollama_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            gemini_model: default_gemini_model(),
            gemini_endpoint: default_gemini_endpoint(),
            ollama_host: default_ollama_host(),
            ollama_model: String::new(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Gemini,
    Ollama,
}

fn default_backend() -> ModelBackend {
    ModelBackend::Gemini
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_top_p() -> f32 {
    0.9
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightConfig {
    #[serde(default = "default_hover_delay_ms")]
    pub hover_delay_ms: u64,
    #[serde(default = "default_selection_delay_ms")]
    pub selection_delay_ms: u64,
    #[serde(default = "default_mutation_delay_ms")]
    pub mutation_delay_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_context_key_chars")]
    pub context_key_chars: usize,
    #[serde(default = "default_prompt_context_chars")]
    pub prompt_context_chars: usize,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default)]
    pub whitespace: WhitespacePolicy,
    #[serde(default)]
    pub stale_guard: StaleGuard,
}

impl HighlightConfig {
    pub fn hover_delay(&self) -> Duration {
        Duration::from_millis(self.hover_delay_ms)
    }

    pub fn selection_delay(&self) -> Duration {
        Duration::from_millis(self.selection_delay_ms)
    }

    pub fn mutation_delay(&self) -> Duration {
        Duration::from_millis(self.mutation_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            hover_delay_ms: default_hover_delay_ms(),
            selection_delay_ms: default_selection_delay_ms(),
            mutation_delay_ms: default_mutation_delay_ms(),
            cache_capacity: default_cache_capacity(),
            context_key_chars: default_context_key_chars(),
            prompt_context_chars: default_prompt_context_chars(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            whitespace: WhitespacePolicy::default(),
            stale_guard: StaleGuard::default(),
        }
    }
}

fn default_hover_delay_ms() -> u64 {
    300
}

fn default_selection_delay_ms() -> u64 {
    500
}

fn default_mutation_delay_ms() -> u64 {
    500
}

fn default_cache_capacity() -> usize {
    100
}

fn default_context_key_chars() -> usize {
    100
}

fn default_prompt_context_chars() -> usize {
    500
}

fn default_rate_limit_requests() -> u32 {
    30
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

/// State the host store holds before the first command arrives.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub highlighting_enabled: bool,
    #[serde(default = "default_auto_highlight")]
    pub auto_highlight: bool,
}

impl StartupConfig {
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            highlighting_enabled: false,
            auto_highlight: default_auto_highlight(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_auto_highlight() -> bool {
    true
}

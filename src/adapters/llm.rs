use crate::core::prompt::ReviewPrompt;
use crate::error::{ReviewError, ReviewResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which model API shape a run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local text-completion endpoint (`/api/generate`), one response.
    Ollama,
    /// Hosted chat API (Anthropic Messages), one response.
    Anthropic,
    /// Local chat endpoint (`/api/chat`), streamed as NDJSON fragments.
    OllamaChat,
}

impl BackendKind {
    /// Picks a backend when none is configured explicitly.
    ///
    /// A URL wins over an API key; a URL ending in `/api/chat` selects the
    /// streaming chat variant.
    pub fn infer(url: Option<&str>, api_key: Option<&str>) -> Option<Self> {
        match (url, api_key) {
            (Some(url), _) if url.trim_end_matches('/').ends_with("/api/chat") => {
                Some(BackendKind::OllamaChat)
            }
            (Some(_), _) => Some(BackendKind::Ollama),
            (None, Some(_)) => Some(BackendKind::Anthropic),
            (None, None) => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Anthropic => "anthropic",
            BackendKind::OllamaChat => "ollama-chat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub backend: BackendKind,
    pub model_name: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub context_window: usize,
    pub max_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub prompt: ReviewPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> ReviewResult<LLMResponse>;
    fn model_name(&self) -> &str;
}

pub fn create_adapter(config: &ModelConfig) -> ReviewResult<Box<dyn LLMAdapter>> {
    match config.backend {
        BackendKind::Ollama => Ok(Box::new(crate::adapters::OllamaAdapter::new(
            config.clone(),
        )?)),
        BackendKind::Anthropic => Ok(Box::new(crate::adapters::AnthropicAdapter::new(
            config.clone(),
        )?)),
        BackendKind::OllamaChat => Ok(Box::new(crate::adapters::OllamaChatAdapter::new(
            config.clone(),
        )?)),
    }
}

/// Turns a non-2xx backend response into a `ReviewError::Backend`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    backend: &str,
) -> ReviewResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReviewError::Backend(format!(
        "{} API error ({}): {}",
        backend,
        status,
        body.trim()
    )))
}

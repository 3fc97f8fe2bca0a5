use crate::adapters::llm::{ensure_success, LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage};
use crate::error::{ReviewError, ReviewResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Text-completion client for a local inference server (`/api/generate`).
pub struct OllamaAdapter {
    client: Client,
    config: ModelConfig,
    url: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Serialize)]
pub(crate) struct OllamaOptions {
    pub num_ctx: usize,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

impl OllamaAdapter {
    pub fn new(config: ModelConfig) -> ReviewResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ReviewError::Config("url is required for the ollama backend".into()))?;

        let client = Client::builder()
            .build()
            .map_err(|e| ReviewError::Backend(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            url,
        })
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    async fn complete(&self, request: LLMRequest) -> ReviewResult<LLMResponse> {
        let ollama_request = OllamaRequest {
            model: &self.config.model_name,
            prompt: request.prompt.to_flat_prompt(),
            options: OllamaOptions {
                num_ctx: self.config.context_window,
            },
            stream: false,
        };

        debug!("Sending generate request to {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| ReviewError::Backend(format!("request to {} failed: {e}", self.url)))?;
        let response = ensure_success(response, "Ollama").await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Backend(format!("failed to parse Ollama response: {e}")))?;

        if ollama_response.response.trim().is_empty() {
            return Err(ReviewError::Backend(
                "Ollama response contained no review text".into(),
            ));
        }

        let usage = match (ollama_response.prompt_eval_count, ollama_response.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage {
                prompt_tokens: prompt.unwrap_or(0),
                completion_tokens: completion.unwrap_or(0),
            }),
        };

        Ok(LLMResponse {
            content: ollama_response.response,
            model: ollama_response
                .model
                .unwrap_or_else(|| self.config.model_name.clone()),
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

use crate::adapters::llm::{ensure_success, LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage};
use crate::core::prompt::ChatTurn;
use crate::error::{ReviewError, ReviewResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    url: String,
    api_version: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    system: String,
    messages: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

impl AnthropicAdapter {
    pub fn new(config: ModelConfig) -> ReviewResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ReviewError::Config("api-key is required for the anthropic backend".into())
        })?;

        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let api_version = config
            .api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let client = Client::builder()
            .build()
            .map_err(|e| ReviewError::Backend(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            api_key,
            url,
            api_version,
        })
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn complete(&self, request: LLMRequest) -> ReviewResult<LLMResponse> {
        let anthropic_request = AnthropicRequest {
            model: &self.config.model_name,
            max_tokens: self.config.max_tokens,
            messages: request.prompt.user_turns(),
            system: request.prompt.persona,
        };

        debug!(
            "Sending {} messages to {}",
            anthropic_request.messages.len(),
            self.url
        );
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| ReviewError::Backend(format!("request to {} failed: {e}", self.url)))?;
        let response = ensure_success(response, "Anthropic").await?;

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            ReviewError::Backend(format!("failed to parse Anthropic response: {e}"))
        })?;

        let texts: Vec<String> = anthropic_response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect();
        if texts.is_empty() {
            return Err(ReviewError::Backend(
                "Anthropic response contained no text content".into(),
            ));
        }

        Ok(LLMResponse {
            content: texts.concat(),
            model: anthropic_response
                .model
                .unwrap_or_else(|| self.config.model_name.clone()),
            usage: anthropic_response.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

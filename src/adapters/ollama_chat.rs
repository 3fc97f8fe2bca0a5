use crate::adapters::llm::{ensure_success, LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage};
use crate::adapters::ollama::OllamaOptions;
use crate::core::prompt::ChatTurn;
use crate::error::{ReviewError, ReviewResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Streaming chat client for a local inference server (`/api/chat`).
///
/// The server answers with newline-delimited JSON objects, each carrying one
/// fragment of the reply. Fragments are concatenated in arrival order until a
/// line with `"done": true` arrives or the body ends.
pub struct OllamaChatAdapter {
    client: Client,
    config: ModelConfig,
    url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Splits a byte stream into complete lines, holding back any partial tail.
#[derive(Default)]
pub(crate) struct NdjsonBuffer {
    pending: Vec<u8>,
}

impl NdjsonBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> ReviewResult<Vec<String>> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1])?);
        }
        Ok(lines)
    }

    /// Returns the unterminated tail left when the body ended.
    pub(crate) fn finish(self) -> ReviewResult<Option<String>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        decode_line(&self.pending).map(Some)
    }
}

fn decode_line(bytes: &[u8]) -> ReviewResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ReviewError::Backend(format!("stream line is not valid UTF-8: {e}")))
}

/// Ordered concatenation of streamed fragments.
#[derive(Default)]
pub(crate) struct FragmentAccumulator {
    text: String,
    done: bool,
    model: Option<String>,
    usage: Option<Usage>,
}

impl FragmentAccumulator {
    /// Applies one NDJSON line; returns `true` once the backend signals the end.
    pub(crate) fn apply(&mut self, line: &str) -> ReviewResult<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(self.done);
        }

        let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| {
            ReviewError::Backend(format!("failed to parse stream fragment: {e}"))
        })?;
        if let Some(error) = chunk.error {
            return Err(ReviewError::Backend(format!("Ollama stream error: {error}")));
        }
        if let Some(message) = chunk.message {
            self.text.push_str(&message.content);
        }
        if chunk.model.is_some() {
            self.model = chunk.model;
        }
        if chunk.done {
            self.done = true;
            if chunk.prompt_eval_count.is_some() || chunk.eval_count.is_some() {
                self.usage = Some(Usage {
                    prompt_tokens: chunk.prompt_eval_count.unwrap_or(0),
                    completion_tokens: chunk.eval_count.unwrap_or(0),
                });
            }
        }
        Ok(self.done)
    }
}

impl OllamaChatAdapter {
    pub fn new(config: ModelConfig) -> ReviewResult<Self> {
        let url = config.url.clone().ok_or_else(|| {
            ReviewError::Config("url is required for the ollama-chat backend".into())
        })?;

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
impl LLMAdapter for OllamaChatAdapter {
    async fn complete(&self, request: LLMRequest) -> ReviewResult<LLMResponse> {
        let chat_request = ChatRequest {
            model: &self.config.model_name,
            messages: request.prompt.chat_messages(),
            options: OllamaOptions {
                num_ctx: self.config.context_window,
            },
            stream: true,
        };

        debug!(
            "Streaming {} messages to {}",
            chat_request.messages.len(),
            self.url
        );
        let response = self
            .client
            .post(&self.url)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| ReviewError::Backend(format!("request to {} failed: {e}", self.url)))?;
        let mut response = ensure_success(response, "Ollama").await?;

        let mut buffer = NdjsonBuffer::default();
        let mut accumulator = FragmentAccumulator::default();
        'stream: while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ReviewError::Backend(format!("stream interrupted: {e}")))?
        {
            for line in buffer.push(&chunk)? {
                if accumulator.apply(&line)? {
                    break 'stream;
                }
            }
        }
        if !accumulator.done {
            if let Some(tail) = buffer.finish()? {
                accumulator.apply(&tail)?;
            }
        }
        if accumulator.text.trim().is_empty() {
            return Err(ReviewError::Backend(
                "Ollama chat stream contained no review text".into(),
            ));
        }
        if !accumulator.done {
            warn!(
                "Ollama chat stream ended without a done marker; using the {} bytes received",
                accumulator.text.len()
            );
        }

        Ok(LLMResponse {
            content: accumulator.text,
            model: accumulator
                .model
                .unwrap_or_else(|| self.config.model_name.clone()),
            usage: accumulator.usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

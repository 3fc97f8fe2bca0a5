pub mod anthropic;
pub mod llm;
pub mod ollama;
pub mod ollama_chat;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use ollama_chat::OllamaChatAdapter;

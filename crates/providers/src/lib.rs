pub mod anthropic;
pub mod client;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse};
use nupi_adapter_core::Result;
use serde_json::Value;

/// Text generation backend.
///
/// `tools` are OpenAI-style function declarations. When `response_schema` is
/// set the model is asked to answer with a JSON object matching it; a tool
/// call request is still a valid answer when tools are offered.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        response_schema: Option<&Value>,
    ) -> Result<LLMResponse>;
}

/// Vector embedding backend. One vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub use anthropic::AnthropicProvider;
pub use factory::{
    create_embedding_provider, create_provider, HttpProviderFactory, ProviderFactory, ProviderKind,
};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

use nupi_adapter_core::{Error, Result, TaskConfig};
use std::sync::Arc;
use tracing::debug;

use crate::client::resolve_api_key;
use crate::{
    AnthropicProvider, EmbeddingProvider, GeminiProvider, OllamaProvider, OpenAIProvider, Provider,
};

/// The backends a task may name. Anything unrecognized is a generic
/// OpenAI-protocol endpoint and must bring its own base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Google,
    Ollama,
    Compatible { name: String, base_url: String },
}

impl ProviderKind {
    pub fn from_task(task: &TaskConfig) -> Result<Self> {
        let name = task.provider.trim().to_lowercase();
        match name.as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "google" | "gemini" => Ok(Self::Google),
            "ollama" => Ok(Self::Ollama),
            _ => match task.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                Some(base_url) => Ok(Self::Compatible {
                    name,
                    base_url: base_url.to_string(),
                }),
                None => Err(Error::Config(format!(
                    "Unknown provider \"{}\". For custom providers, set base_url.",
                    name
                ))),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Google => "google",
            Self::Ollama => "ollama",
            Self::Compatible { name, .. } => name,
        }
    }

    /// Environment variables consulted when the task has no `api_key`.
    fn key_env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::OpenAI => &["OPENAI_API_KEY"],
            Self::Google => &["GOOGLE_GENERATIVE_AI_API_KEY", "GEMINI_API_KEY"],
            Self::Ollama | Self::Compatible { .. } => &[],
        }
    }

    fn require_api_key(&self, task: &TaskConfig) -> Result<String> {
        resolve_api_key(task.api_key.as_deref(), self.key_env_vars()).ok_or_else(|| {
            Error::Config(format!(
                "Provider \"{}\" requires an API key: set api_key on the task or {}",
                self.name(),
                self.key_env_vars().join(" / ")
            ))
        })
    }
}

/// Construct a generation backend for a task profile.
pub fn create_provider(task: &TaskConfig) -> Result<Arc<dyn Provider>> {
    let kind = ProviderKind::from_task(task)?;
    debug!(provider = %kind.name(), model = %task.model, "Creating provider");
    let base_url = task.base_url.as_deref();

    let provider: Arc<dyn Provider> = match &kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            &kind.require_api_key(task)?,
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(
            &kind.require_api_key(task)?,
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Google => Arc::new(GeminiProvider::new(
            &kind.require_api_key(task)?,
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Compatible { name, base_url } => Arc::new(OpenAIProvider::compatible(
            name,
            task.api_key.as_deref().unwrap_or(""),
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
    };

    Ok(provider)
}

/// Construct an embedding backend. Anthropic has no embedding API.
pub fn create_embedding_provider(task: &TaskConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let kind = ProviderKind::from_task(task)?;
    debug!(provider = %kind.name(), model = %task.model, "Creating embedding provider");
    let base_url = task.base_url.as_deref();

    let provider: Arc<dyn EmbeddingProvider> = match &kind {
        ProviderKind::Anthropic => {
            return Err(Error::UnsupportedCapability {
                provider: kind.name().to_string(),
                capability: "embeddings".to_string(),
            })
        }
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(
            &kind.require_api_key(task)?,
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Google => Arc::new(GeminiProvider::new(
            &kind.require_api_key(task)?,
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
        ProviderKind::Compatible { name, base_url } => Arc::new(OpenAIProvider::compatible(
            name,
            task.api_key.as_deref().unwrap_or(""),
            base_url,
            &task.model,
            task.max_tokens,
            task.temperature,
        )),
    };

    Ok(provider)
}

/// Seam between routing and backend construction.
pub trait ProviderFactory: Send + Sync {
    fn chat_provider(&self, task: &TaskConfig) -> Result<Arc<dyn Provider>>;
    fn embedding_provider(&self, task: &TaskConfig) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// Builds the HTTP-backed providers in this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn chat_provider(&self, task: &TaskConfig) -> Result<Arc<dyn Provider>> {
        create_provider(task)
    }

    fn embedding_provider(&self, task: &TaskConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        create_embedding_provider(task)
    }
}

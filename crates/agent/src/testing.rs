//! Scripted providers for unit tests.

use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse};
use nupi_adapter_core::{Error, Result, TaskConfig};
use nupi_adapter_providers::{EmbeddingProvider, Provider, ProviderFactory};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a provider saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub schema: Option<Value>,
}

/// Replays queued responses in order; an empty queue yields an error.
pub struct MockProvider {
    responses: Mutex<Vec<Result<LLMResponse>>>,
    pub calls: Mutex<Vec<RecordedCall>>,
    embeddings: Mutex<Option<Result<Vec<Vec<f32>>>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Result<LLMResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
            embeddings: Mutex::new(None),
        }
    }

    pub fn replying(response: LLMResponse) -> Self {
        Self::new(vec![Ok(response)])
    }

    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(Error::Provider(message.to_string()))])
    }

    pub fn with_embeddings(self, result: Result<Vec<Vec<f32>>>) -> Self {
        *self.embeddings.lock().unwrap() = Some(result);
        self
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls.lock().unwrap().last().cloned().expect("provider was not called")
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        response_schema: Option<&Value>,
    ) -> Result<LLMResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            schema: response_schema.cloned(),
        });
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::Provider("mock has no scripted response".to_string()));
        }
        responses.remove(0)
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-embed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.embeddings.lock().unwrap().take() {
            Some(result) => result,
            None => Ok(texts.iter().map(|t| vec![t.len() as f32]).collect()),
        }
    }
}

/// Hands out one shared provider and counts constructions.
pub struct MockFactory {
    pub provider: Arc<MockProvider>,
    pub chat_builds: AtomicUsize,
    pub embedding_builds: AtomicUsize,
    pub fail_chat: AtomicBool,
}

impl MockFactory {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            chat_builds: AtomicUsize::new(0),
            embedding_builds: AtomicUsize::new(0),
            fail_chat: AtomicBool::new(false),
        }
    }
}

impl ProviderFactory for MockFactory {
    fn chat_provider(&self, _task: &TaskConfig) -> Result<Arc<dyn Provider>> {
        self.chat_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(Error::Config("mock construction failure".to_string()));
        }
        Ok(self.provider.clone())
    }

    fn embedding_provider(&self, task: &TaskConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        self.embedding_builds.fetch_add(1, Ordering::SeqCst);
        if task.provider == "anthropic" {
            return Err(Error::UnsupportedCapability {
                provider: task.provider.clone(),
                capability: "embeddings".to_string(),
            });
        }
        Ok(self.provider.clone())
    }
}

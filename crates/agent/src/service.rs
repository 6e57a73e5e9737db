use nupi_adapter_core::protocol::{
    event_type_to_task_key, Embedding, EmbeddingRequest, EmbeddingResponse, ResolveIntentRequest,
    ResolveIntentResponse,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::intent::{resolve_intent, FailureKind, IntentResult};
use crate::router::TaskRouter;

const TRANSCRIPT_LOG_CHARS: usize = 100;

/// Transport-level failure of an intent request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The request names a task the operator never configured.
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("{0}")]
    Internal(String),
}

impl Status {
    pub fn code(&self) -> &'static str {
        match self {
            Status::FailedPrecondition(_) => "FAILED_PRECONDITION",
            Status::Internal(_) => "INTERNAL",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Status::FailedPrecondition(m) | Status::Internal(m) => m,
        }
    }
}

fn transcript_preview(transcript: &str) -> String {
    match transcript.char_indices().nth(TRANSCRIPT_LOG_CHARS) {
        Some((cut, _)) => format!("{}...", &transcript[..cut]),
        None => transcript.to_string(),
    }
}

/// The request boundary: routes, resolves, and maps outcomes to either a
/// response or a [`Status`].
#[derive(Clone)]
pub struct IntentService {
    router: Arc<TaskRouter>,
}

impl IntentService {
    pub fn new(router: Arc<TaskRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub async fn resolve_intent(
        &self,
        request: ResolveIntentRequest,
    ) -> std::result::Result<ResolveIntentResponse, Status> {
        let task_key = event_type_to_task_key(&request.event_type);
        let event_type = if task_key.is_empty() {
            "(unspecified)"
        } else {
            task_key.as_str()
        };
        info!(
            prompt_id = %request.prompt_id,
            event_type = %event_type,
            transcript = %transcript_preview(&request.transcript),
            "ResolveIntent"
        );

        let result = resolve_intent(&self.router, &request).await;
        match result {
            IntentResult::Failed {
                kind: FailureKind::MissingTaskConfig,
                message,
            } => {
                error!(prompt_id = %request.prompt_id, error = %message, "ResolveIntent failed precondition");
                Err(Status::FailedPrecondition(message))
            }
            IntentResult::Failed {
                kind: FailureKind::Routing,
                message,
            } => {
                error!(prompt_id = %request.prompt_id, error = %message, "ResolveIntent error");
                Err(Status::Internal(message))
            }
            result => {
                let response = result.into_response(&request.prompt_id);
                let action = response
                    .actions
                    .first()
                    .map(|a| a.kind.as_str())
                    .unwrap_or("none");
                info!(
                    prompt_id = %response.prompt_id,
                    action = %action,
                    confidence = response.confidence,
                    "ResolveIntent response"
                );
                Ok(response)
            }
        }
    }

    /// Embed texts with the `embedding` task. Every failure is reported in
    /// `error_message`, never as a [`Status`].
    pub async fn embed(&self, request: EmbeddingRequest) -> EmbeddingResponse {
        let route = match self.router.resolve_embedding() {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "Embedding route unavailable");
                return EmbeddingResponse::error(e.to_string());
            }
        };

        let model = route.task.model.clone();
        if request.texts.is_empty() {
            return EmbeddingResponse {
                model,
                ..Default::default()
            };
        }

        info!(model = %model, inputs = request.texts.len(), "GenerateEmbeddings");
        match route.provider.embed(&request.texts).await {
            Ok(vectors) if vectors.len() == request.texts.len() => EmbeddingResponse {
                embeddings: vectors.into_iter().map(|values| Embedding { values }).collect(),
                model,
                error_message: String::new(),
            },
            Ok(vectors) => {
                let message = format!(
                    "Embedding provider returned {} vectors for {} inputs",
                    vectors.len(),
                    request.texts.len()
                );
                error!(model = %model, "{}", message);
                EmbeddingResponse {
                    model,
                    ..EmbeddingResponse::error(message)
                }
            }
            Err(e) => {
                error!(model = %model, error = %e, "Embedding generation error");
                EmbeddingResponse {
                    model,
                    ..EmbeddingResponse::error(e.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFactory, MockProvider};
    use nupi_adapter_core::protocol::ActionType;
    use nupi_adapter_core::types::LLMResponse;
    use nupi_adapter_core::{Config, Error};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const CONFIG: &str = r#"{"tasks": {
        "user_intent": {"provider": "openai", "model": "gpt-4o-mini"},
        "embedding": {"provider": "openai", "model": "text-embedding-3-small"}
    }}"#;

    fn service_with(json: &str, provider: MockProvider) -> (IntentService, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::new(provider));
        let config = Arc::new(Config::from_json_str(json).unwrap());
        let router = Arc::new(TaskRouter::with_factory(config, factory.clone()));
        (IntentService::new(router), factory)
    }

    fn request(event_type: &str) -> ResolveIntentRequest {
        ResolveIntentRequest {
            prompt_id: "p42".to_string(),
            transcript: "open the logs".to_string(),
            event_type: event_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_transcript_preview() {
        assert_eq!(transcript_preview("short"), "short");
        let long = "ą".repeat(150);
        let preview = transcript_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
        assert_eq!(transcript_preview(&"x".repeat(100)), "x".repeat(100));
    }

    #[test]
    fn test_status_codes() {
        let s = Status::FailedPrecondition("missing".to_string());
        assert_eq!(s.code(), "FAILED_PRECONDITION");
        assert_eq!(s.message(), "missing");
        assert_eq!(Status::Internal("x".to_string()).code(), "INTERNAL");
        assert_eq!(s.to_string(), "missing");
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let provider = MockProvider::replying(LLMResponse::text(
            &json!({"action": "command", "command": "tail -f app.log", "reasoning": "logs", "confidence": 0.9})
                .to_string(),
        ));
        let (service, _) = service_with(CONFIG, provider);

        let response = service.resolve_intent(request("EVENT_TYPE_USER_INTENT")).await.unwrap();
        assert_eq!(response.prompt_id, "p42");
        assert_eq!(response.actions[0].kind, ActionType::Command);
        assert_eq!(response.actions[0].command, "tail -f app.log");
        assert!(response.error_message.is_empty());
    }

    #[tokio::test]
    async fn test_missing_task_is_failed_precondition() {
        let (service, _) = service_with(CONFIG, MockProvider::new(vec![]));
        let status = service
            .resolve_intent(request("EVENT_TYPE_SESSION_OUTPUT"))
            .await
            .unwrap_err();
        match status {
            Status::FailedPrecondition(message) => {
                assert!(message.contains("session_output"));
                assert!(message.contains("[embedding, user_intent]"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_construction_failure_is_internal() {
        let (service, factory) = service_with(CONFIG, MockProvider::new(vec![]));
        factory.fail_chat.store(true, Ordering::SeqCst);
        let status = service.resolve_intent(request("")).await.unwrap_err();
        assert_eq!(status.code(), "INTERNAL");
    }

    #[tokio::test]
    async fn test_generation_failure_is_soft() {
        let (service, _) = service_with(CONFIG, MockProvider::failing("upstream 503"));
        let response = service.resolve_intent(request("")).await.unwrap();
        assert!(response.actions.is_empty());
        assert_eq!(response.confidence, 0.0);
        assert!(response.error_message.contains("upstream 503"));
    }

    #[tokio::test]
    async fn test_embed_success() {
        let provider =
            MockProvider::new(vec![]).with_embeddings(Ok(vec![vec![0.1, 0.2], vec![0.3, 0.4]]));
        let (service, _) = service_with(CONFIG, provider);
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["a".to_string(), "b".to_string()],
                ..Default::default()
            })
            .await;
        assert!(response.error_message.is_empty());
        assert_eq!(response.model, "text-embedding-3-small");
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_embed_empty_texts() {
        let (service, _) = service_with(CONFIG, MockProvider::new(vec![]));
        let response = service.embed(EmbeddingRequest::default()).await;
        assert!(response.embeddings.is_empty());
        assert!(response.error_message.is_empty());
    }

    #[tokio::test]
    async fn test_embed_without_task_is_soft_error() {
        let (service, _) = service_with(
            r#"{"tasks": {"user_intent": {"provider": "openai", "model": "m"}}}"#,
            MockProvider::new(vec![]),
        );
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["a".to_string()],
                ..Default::default()
            })
            .await;
        assert!(response.embeddings.is_empty());
        assert!(response.error_message.contains("embedding"));
    }

    #[tokio::test]
    async fn test_embed_unsupported_provider_is_soft_error() {
        let (service, _) = service_with(
            r#"{"tasks": {"embedding": {"provider": "anthropic", "model": "claude"}}}"#,
            MockProvider::new(vec![]),
        );
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["a".to_string()],
                ..Default::default()
            })
            .await;
        assert!(response.embeddings.is_empty());
        assert!(response.error_message.contains("anthropic"));
    }

    #[tokio::test]
    async fn test_embed_provider_failure_is_soft_error() {
        let provider = MockProvider::new(vec![])
            .with_embeddings(Err(Error::Provider("quota exceeded".to_string())));
        let (service, _) = service_with(CONFIG, provider);
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["a".to_string()],
                ..Default::default()
            })
            .await;
        assert!(response.embeddings.is_empty());
        assert_eq!(response.model, "text-embedding-3-small");
        assert!(response.error_message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_soft_error() {
        let provider = MockProvider::new(vec![]).with_embeddings(Ok(vec![vec![1.0]]));
        let (service, _) = service_with(CONFIG, provider);
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["a".to_string(), "b".to_string()],
                ..Default::default()
            })
            .await;
        assert!(response.embeddings.is_empty());
        assert!(response.error_message.contains("1 vectors for 2 inputs"));
    }
}

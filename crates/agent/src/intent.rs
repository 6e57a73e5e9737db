//! Intent resolution: prompt assembly, one model call, and classification of
//! the answer into a single outcome.

use nupi_adapter_core::protocol::{
    event_type_to_task_key, Action, ActionType, ResolveIntentRequest, ResolveIntentResponse,
    ToolCall,
};
use nupi_adapter_core::types::{ChatMessage, LLMResponse};
use nupi_adapter_core::{Config, TaskConfig};
use nupi_adapter_providers::Provider;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::conversation::build_messages;
use crate::prompt::{compose_system_prompt, user_prompt};
use crate::router::TaskRouter;
use crate::tools::{convert_tool_definitions, function_schemas};

pub const FALLBACK_TEXT: &str = "I could not determine an action.";
pub const FALLBACK_REASONING: &str = "Fallback: model returned unstructured text";
pub const FALLBACK_CONFIDENCE: f32 = 0.3;
pub const TOOL_USE_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntentAction {
    Command,
    Speak,
    Clarify,
    Noop,
}

/// The structured answer the model is asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentObject {
    pub action: IntentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub reasoning: String,
    #[schemars(range(min = 0, max = 1))]
    pub confidence: f64,
}

static INTENT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<IntentObject>();
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
});

/// JSON Schema for [`IntentObject`], without the `$schema` marker.
pub fn intent_schema() -> &'static Value {
    &INTENT_SCHEMA
}

/// What the model actually sent back. Looser than [`IntentObject`] so an
/// unknown action still resolves (to noop) instead of falling back.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecodedIntent {
    #[serde(default)]
    action: Option<String>,
    #[serde(default, alias = "session_ref")]
    session_ref: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\n?(.*?)```").expect("valid fence regex")
});

/// Pull the JSON object out of a model reply: the whole reply when it already
/// is one, then a fenced block, then the outermost braces.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed);
    }
    if let Some(caps) = CODE_FENCE.captures(trimmed) {
        return caps.get(1).map(|m| m.as_str().trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// A decoded intent, or `None` when the reply does not conform: not JSON,
/// no reasoning, or confidence missing or outside [0, 1].
fn decode_intent(text: &str) -> Option<DecodedIntent> {
    let raw = extract_json_object(text)?;
    let decoded: DecodedIntent = match serde_json::from_str(raw) {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, "Model reply is not a valid intent object");
            return None;
        }
    };
    let confidence = decoded.confidence?;
    if !(0.0..=1.0).contains(&confidence) || decoded.reasoning.is_none() {
        debug!(confidence, "Model reply violates the intent schema");
        return None;
    }
    Some(decoded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No task profile for the request's event type.
    MissingTaskConfig,
    /// The task exists but its backend could not be built.
    Routing,
    /// The model call itself failed.
    Generation,
}

/// Exactly one outcome per request.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentResult {
    ToolUseRequested(Vec<ToolCall>),
    ActionResolved {
        action: ActionType,
        session_ref: String,
        command: String,
        text: String,
        reasoning: String,
        confidence: f32,
    },
    Fallback {
        text: String,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl IntentResult {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Classify a model reply: tool calls, then a conforming intent object,
    /// then free text.
    pub fn classify(response: LLMResponse, request: &ResolveIntentRequest) -> Self {
        if response.has_tool_calls() {
            let calls = response
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    call_id: tc.id,
                    tool_name: tc.name,
                    arguments_json: tc.arguments.to_string(),
                })
                .collect();
            return Self::ToolUseRequested(calls);
        }

        let text = response.content.unwrap_or_default();
        match decode_intent(&text) {
            Some(intent) => Self::ActionResolved {
                action: ActionType::from_intent(intent.action.as_deref().unwrap_or_default()),
                session_ref: intent
                    .session_ref
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| request.session_id.clone()),
                command: intent.command.unwrap_or_default(),
                text: intent.text.unwrap_or_default(),
                reasoning: intent.reasoning.unwrap_or_default(),
                confidence: intent.confidence.unwrap_or_default() as f32,
            },
            None => {
                warn!(
                    content_len = text.len(),
                    "Model returned no structured intent, using fallback"
                );
                Self::Fallback {
                    text: text.trim().to_string(),
                }
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::ToolUseRequested(_) => "tool_use",
            Self::ActionResolved { .. } => "action",
            Self::Fallback { .. } => "fallback",
            Self::Failed { .. } => "failed",
        }
    }

    /// Map onto the response contract.
    pub fn into_response(self, prompt_id: &str) -> ResolveIntentResponse {
        let mut response = ResolveIntentResponse {
            prompt_id: prompt_id.to_string(),
            ..Default::default()
        };

        match self {
            Self::ToolUseRequested(calls) => {
                response.actions = vec![Action {
                    kind: ActionType::ToolUse,
                    ..Default::default()
                }];
                response.tool_calls = calls;
                response.confidence = TOOL_USE_CONFIDENCE;
            }
            Self::ActionResolved {
                action,
                session_ref,
                command,
                text,
                reasoning,
                confidence,
            } => {
                response.actions = vec![Action {
                    kind: action,
                    session_ref,
                    command,
                    text,
                    ..Default::default()
                }];
                response.reasoning = reasoning;
                response.confidence = confidence;
            }
            Self::Fallback { text } => {
                let text = if text.is_empty() {
                    FALLBACK_TEXT.to_string()
                } else {
                    text
                };
                response.actions = vec![Action {
                    kind: ActionType::Speak,
                    text,
                    ..Default::default()
                }];
                response.reasoning = FALLBACK_REASONING.to_string();
                response.confidence = FALLBACK_CONFIDENCE;
            }
            Self::Failed { message, .. } => {
                response.error_message = message;
            }
        }

        response
    }
}

/// Run one resolution against an already-routed model.
///
/// Never returns an error: a failed model call becomes
/// [`IntentResult::Failed`] with [`FailureKind::Generation`].
pub async fn resolve_with_model(
    provider: &dyn Provider,
    request: &ResolveIntentRequest,
    config: &Config,
    task: &TaskConfig,
) -> IntentResult {
    let system_prompt = compose_system_prompt(request, &config.language);
    let prompt = user_prompt(request);

    let tools = function_schemas(&convert_tool_definitions(&request.available_tools));

    let messages = if request.tool_history.is_empty() {
        vec![ChatMessage::system(&system_prompt), ChatMessage::user(prompt)]
    } else {
        build_messages(&system_prompt, prompt, &request.tool_history)
    };

    debug!(
        provider = %provider.name(),
        model = %task.model,
        messages = messages.len(),
        tools = tools.len(),
        "Invoking model for intent"
    );

    match provider.chat(&messages, &tools, Some(intent_schema())).await {
        Ok(response) => IntentResult::classify(response, request),
        Err(e) => {
            error!(provider = %provider.name(), error = %e, "AI generation error");
            IntentResult::failed(FailureKind::Generation, e.to_string())
        }
    }
}

/// Route the request by its event type, then resolve.
pub async fn resolve_intent(router: &TaskRouter, request: &ResolveIntentRequest) -> IntentResult {
    let key = event_type_to_task_key(&request.event_type);
    let route = match router.resolve(&key) {
        Ok(route) => route,
        Err(e) => {
            let kind = if e.is_missing_task_config() {
                FailureKind::MissingTaskConfig
            } else {
                FailureKind::Routing
            };
            return IntentResult::failed(kind, e.to_string());
        }
    };

    let result = resolve_with_model(route.provider.as_ref(), request, router.config(), &route.task).await;
    info!(
        prompt_id = %request.prompt_id,
        outcome = result.kind_label(),
        "Intent resolved"
    );
    result
}

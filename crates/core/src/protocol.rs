//! Request and response contract exchanged with the upstream orchestrator.
//!
//! Every field defaults when absent, matching protobuf semantics: an empty
//! string means "not supplied".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EVENT_TYPE_PREFIX: &str = "EVENT_TYPE_";

/// Map a wire event type (`EVENT_TYPE_USER_INTENT`) to its task key
/// (`user_intent`). The unspecified sentinel and anything unrecognized map
/// to the empty string, which the router treats as the default task.
pub fn event_type_to_task_key(event_type: &str) -> String {
    match event_type.strip_prefix(EVENT_TYPE_PREFIX) {
        Some(rest) if !rest.is_empty() && !rest.eq_ignore_ascii_case("unspecified") => {
            rest.to_lowercase()
        }
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionInfo {
    pub id: String,
    pub command: String,
    pub work_dir: String,
    pub status: String,
}

/// A tool the orchestrator can execute, as declared by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_json: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments_json: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub result_json: String,
    pub is_error: bool,
}

/// A past tool invocation and its outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolInteraction {
    pub call: Option<ToolCallRecord>,
    pub result: Option<ToolResultRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveIntentRequest {
    pub prompt_id: String,
    pub transcript: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub session_id: String,
    pub current_tool: String,
    pub available_sessions: Vec<SessionInfo>,
    pub event_type: String,
    pub available_tools: Vec<ToolDescriptor>,
    pub tool_history: Vec<ToolInteraction>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionType {
    #[default]
    #[serde(rename = "ACTION_TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "ACTION_TYPE_COMMAND")]
    Command,
    #[serde(rename = "ACTION_TYPE_SPEAK")]
    Speak,
    #[serde(rename = "ACTION_TYPE_CLARIFY")]
    Clarify,
    #[serde(rename = "ACTION_TYPE_NOOP")]
    Noop,
    /// Marker action: the payload is in `toolCalls`.
    #[serde(rename = "ACTION_TYPE_TOOL_USE")]
    ToolUse,
}

impl ActionType {
    /// Map a model-chosen action name. Unknown names become `Noop`.
    pub fn from_intent(action: &str) -> Self {
        match action {
            "command" => Self::Command,
            "speak" => Self::Speak,
            "clarify" => Self::Clarify,
            _ => Self::Noop,
        }
    }

    /// Wire name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "ACTION_TYPE_UNSPECIFIED",
            Self::Command => "ACTION_TYPE_COMMAND",
            Self::Speak => "ACTION_TYPE_SPEAK",
            Self::Clarify => "ACTION_TYPE_CLARIFY",
            Self::Noop => "ACTION_TYPE_NOOP",
            Self::ToolUse => "ACTION_TYPE_TOOL_USE",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub session_ref: String,
    pub command: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments_json: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveIntentResponse {
    pub prompt_id: String,
    pub actions: Vec<Action>,
    pub reasoning: String,
    pub confidence: f32,
    pub metadata: HashMap<String, String>,
    pub error_message: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Embedding {
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Embedding>,
    pub model: String,
    pub error_message: String,
}

impl EmbeddingResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_to_task_key() {
        assert_eq!(event_type_to_task_key("EVENT_TYPE_USER_INTENT"), "user_intent");
        assert_eq!(event_type_to_task_key("EVENT_TYPE_SESSION_OUTPUT"), "session_output");
        assert_eq!(event_type_to_task_key("EVENT_TYPE_UNSPECIFIED"), "");
        assert_eq!(event_type_to_task_key(""), "");
        assert_eq!(event_type_to_task_key("USER_INTENT"), "");
        assert_eq!(event_type_to_task_key("EVENT_TYPE_"), "");
    }

    #[test]
    fn test_request_fields_default_when_absent() {
        let req: ResolveIntentRequest = serde_json::from_str(
            r#"{"promptId": "p1", "transcript": "list files",
                "toolHistory": [{"call": {"callId": "c1", "toolName": "ls"}}]}"#,
        )
        .unwrap();
        assert_eq!(req.prompt_id, "p1");
        assert!(req.system_prompt.is_empty());
        assert!(req.available_sessions.is_empty());
        assert_eq!(req.tool_history.len(), 1);
        let call = req.tool_history[0].call.as_ref().unwrap();
        assert!(call.arguments_json.is_empty());
        assert!(req.tool_history[0].result.is_none());
    }

    #[test]
    fn test_action_type_wire_names() {
        let action = Action {
            kind: ActionType::Command,
            command: "ls".to_string(),
            ..Default::default()
        };
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "ACTION_TYPE_COMMAND");
        assert_eq!(v["sessionRef"], "");
    }

    #[test]
    fn test_action_type_from_intent() {
        assert_eq!(ActionType::from_intent("speak"), ActionType::Speak);
        assert_eq!(ActionType::from_intent("clarify"), ActionType::Clarify);
        assert_eq!(ActionType::from_intent("dance"), ActionType::Noop);
        assert_eq!(ActionType::from_intent(""), ActionType::Noop);
    }

    #[test]
    fn test_action_type_as_str_matches_serde() {
        for kind in [ActionType::Speak, ActionType::ToolUse, ActionType::Unspecified] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }
}

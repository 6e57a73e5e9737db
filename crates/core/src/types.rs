use serde::Serialize;
use serde_json::Value;

/// A tool call request that serializes to the OpenAI-compatible format:
/// `{id, type: "function", function: {name, arguments}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl Serialize for ToolCallRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry(
            "function",
            &serde_json::json!({
                "name": self.name,
                "arguments": self.arguments.to_string()
            }),
        )?;
        map.end()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
    pub usage: Value,
}

impl LLMResponse {
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            finish_reason: "stop".to_string(),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One turn of a conversation handed to a provider.
///
/// `content` is a JSON value so a tool result can carry the parsed document
/// rather than its text; providers flatten it to whatever their wire format
/// accepts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: Value) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain("system", Value::String(content.to_string()))
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", Value::String(content.to_string()))
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain("assistant", Value::String(content.to_string()))
    }

    /// Assistant turn that requested a single tool call.
    pub fn assistant_tool_call(call: ToolCallRequest) -> Self {
        let mut msg = Self::assistant("");
        msg.tool_calls = Some(vec![call]);
        msg
    }

    pub fn tool_result(tool_call_id: &str, tool_name: &str, output: Value) -> Self {
        let mut msg = Self::plain("tool", output);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg.name = Some(tool_name.to_string());
        msg
    }

    /// Content as plain text. Non-string documents are serialized.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

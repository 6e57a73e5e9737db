use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use nupi_adapter_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::client::{
    build_http_client, normalize_base, preview, with_schema_instruction, DEFAULT_TIMEOUT,
};
use crate::Provider;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API. Has no embedding endpoint.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: build_http_client(DEFAULT_TIMEOUT),
            api_key: api_key.to_string(),
            api_base: normalize_base(api_base, ANTHROPIC_API_BASE),
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    /// OpenAI: { type: "function", function: { name, description, parameters } }
    /// Anthropic: { name, description, input_schema }
    fn convert_tools(tools: &[Value]) -> Vec<Value> {
        tools
            .iter()
            .filter_map(|tool| {
                let func = tool.get("function")?;
                let name = func.get("name")?.as_str()?;
                let description = func.get("description").and_then(|v| v.as_str()).unwrap_or("");
                let parameters = func
                    .get("parameters")
                    .cloned()
                    .unwrap_or(serde_json::json!({"type": "object"}));

                Some(serde_json::json!({
                    "name": name,
                    "description": description,
                    "input_schema": parameters,
                }))
            })
            .collect()
    }

    /// System text goes to the top-level `system` field; tool results are
    /// user turns made of `tool_result` blocks.
    fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_text: Option<String> = None;
        let mut anthropic_messages: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role.as_str() {
                "system" => {
                    let text = msg.content_text();
                    system_text = Some(match system_text {
                        Some(existing) => format!("{}\n\n{}", existing, text),
                        None => text,
                    });
                }
                "assistant" => {
                    let mut content_blocks: Vec<Value> = Vec::new();

                    let text = msg.content_text();
                    if !text.is_empty() {
                        content_blocks.push(serde_json::json!({"type": "text", "text": text}));
                    }

                    for tc in msg.tool_calls.iter().flatten() {
                        content_blocks.push(serde_json::json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments,
                        }));
                    }

                    if content_blocks.is_empty() {
                        content_blocks.push(serde_json::json!({"type": "text", "text": ""}));
                    }

                    anthropic_messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": content_blocks,
                    }));
                }
                "tool" => {
                    anthropic_messages.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id.as_deref().unwrap_or(""),
                            "content": msg.content_text(),
                        }],
                    }));
                }
                _ => {
                    anthropic_messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.content_text(),
                    }));
                }
            }
        }

        (system_text, Self::merge_consecutive_roles(anthropic_messages))
    }

    /// Anthropic requires alternating user/assistant turns.
    fn merge_consecutive_roles(messages: Vec<Value>) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(|v| v.as_str()).unwrap_or("");
            let same_role = result
                .last()
                .and_then(|v| v.get("role"))
                .and_then(|v| v.as_str())
                == Some(role);

            match result.last_mut() {
                Some(last) if same_role => {
                    let last_content = last.get("content").cloned().unwrap_or(Value::Null);
                    let new_content = msg.get("content").cloned().unwrap_or(Value::Null);
                    last["content"] = match (last_content, new_content) {
                        (Value::Array(mut a), Value::Array(b)) => {
                            a.extend(b);
                            Value::Array(a)
                        }
                        (Value::Array(mut a), Value::String(s)) => {
                            a.push(serde_json::json!({"type": "text", "text": s}));
                            Value::Array(a)
                        }
                        (Value::String(s1), Value::String(s2)) => {
                            Value::String(format!("{}\n\n{}", s1, s2))
                        }
                        (Value::String(s), Value::Array(a)) => {
                            let mut blocks = vec![serde_json::json!({"type": "text", "text": s})];
                            blocks.extend(a);
                            Value::Array(blocks)
                        }
                        (existing, _) => existing,
                    };
                }
                _ => result.push(msg),
            }
        }

        result
    }

    /// Config may store "anthropic/claude-..." but the API expects the bare id.
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("anthropic/").unwrap_or(model)
    }

    fn parse_response(resp: AnthropicResponse) -> LLMResponse {
        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for block in resp.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(text) = block.text.filter(|t| !t.is_empty()) {
                        text_parts.push(text);
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name)) = (block.id, block.name) {
                        tool_calls.push(ToolCallRequest {
                            id,
                            name,
                            arguments: block
                                .input
                                .unwrap_or(Value::Object(serde_json::Map::new())),
                        });
                    }
                }
                _ => {}
            }
        }

        let finish_reason = match resp.stop_reason.as_deref() {
            Some("end_turn") | None => "stop".to_string(),
            Some("tool_use") => "tool_calls".to_string(),
            Some("max_tokens") => "length".to_string(),
            Some(other) => other.to_string(),
        };

        let usage = serde_json::json!({
            "prompt_tokens": resp.usage.as_ref().and_then(|u| u.input_tokens),
            "completion_tokens": resp.usage.as_ref().and_then(|u| u.output_tokens),
        });

        LLMResponse {
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            tool_calls,
            finish_reason,
            usage,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        response_schema: Option<&Value>,
    ) -> Result<LLMResponse> {
        let url = format!("{}/messages", self.api_base);
        let model = Self::normalize_model(&self.model);

        let prepared = with_schema_instruction(messages, response_schema);
        let (system, anthropic_messages) = Self::convert_messages(&prepared);
        let anthropic_tools = Self::convert_tools(tools);

        let mut request = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": anthropic_messages,
        });

        if let Some(sys) = system {
            request["system"] = Value::String(sys);
        }

        if !anthropic_tools.is_empty() {
            request["tools"] = Value::Array(anthropic_tools);
        }

        info!(
            url = %url,
            model = %model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling Anthropic API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Anthropic API error");
            return Err(Error::Provider(format!(
                "Anthropic API error {}: {}",
                status, raw_body
            )));
        }

        debug!(body_len = raw_body.len(), "Anthropic raw response");

        let resp: AnthropicResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Anthropic response: {}. Body: {}",
                e,
                preview(&raw_body, 500)
            ))
        })?;

        let parsed = Self::parse_response(resp);
        info!(
            content_len = parsed.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls_count = parsed.tool_calls.len(),
            finish_reason = %parsed.finish_reason,
            "Anthropic response parsed"
        );

        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_tools() {
        let tools = vec![json!({
            "type": "function",
            "function": {
                "name": "open_file",
                "description": "Open a file in the editor",
                "parameters": {"type": "object", "properties": {"path": {"type": "string"}}}
            }
        })];

        let converted = AnthropicProvider::convert_tools(&tools);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["name"], "open_file");
        assert!(converted[0]["input_schema"].is_object());
    }

    #[test]
    fn test_convert_history_pairs() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("open readme"),
            ChatMessage::assistant_tool_call(ToolCallRequest {
                id: "tc_1".to_string(),
                name: "open_file".to_string(),
                arguments: json!({"path": "README.md"}),
            }),
            ChatMessage::tool_result("tc_1", "open_file", json!({"opened": true})),
            ChatMessage::assistant_tool_call(ToolCallRequest {
                id: "tc_2".to_string(),
                name: "scroll".to_string(),
                arguments: json!({}),
            }),
            ChatMessage::tool_result("tc_2", "scroll", json!({})),
        ];

        let (system, msgs) = AnthropicProvider::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("sys"));
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[1]["content"][0]["type"], "tool_use");
        assert_eq!(msgs[1]["content"][0]["input"]["path"], "README.md");
        assert_eq!(msgs[2]["role"], "user");
        assert_eq!(msgs[2]["content"][0]["type"], "tool_result");
        assert_eq!(msgs[2]["content"][0]["tool_use_id"], "tc_1");
        assert_eq!(msgs[2]["content"][0]["content"], "{\"opened\":true}");
    }

    #[test]
    fn test_merge_consecutive_roles() {
        let messages = vec![
            json!({"role": "user", "content": "hello"}),
            json!({"role": "user", "content": "world"}),
            json!({"role": "assistant", "content": "hi"}),
        ];

        let merged = AnthropicProvider::merge_consecutive_roles(messages);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["content"], "hello\n\nworld");
    }

    #[test]
    fn test_normalize_model() {
        assert_eq!(
            AnthropicProvider::normalize_model("anthropic/claude-3-5-haiku-latest"),
            "claude-3-5-haiku-latest"
        );
        assert_eq!(AnthropicProvider::normalize_model("claude-sonnet-4-0"), "claude-sonnet-4-0");
    }

    #[test]
    fn test_parse_response() {
        let raw = r#"{
            "id": "msg_123",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "list_sessions", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 100, "output_tokens": 50}
        }"#;

        let resp: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let parsed = AnthropicProvider::parse_response(resp);
        assert_eq!(parsed.content.as_deref(), Some("Checking."));
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "list_sessions");
        assert_eq!(parsed.finish_reason, "tool_calls");
        assert_eq!(parsed.usage["prompt_tokens"], 100);
    }
}

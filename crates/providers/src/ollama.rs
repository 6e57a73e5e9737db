use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use nupi_adapter_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::client::{
    build_http_client, normalize_base, preview, synthesize_call_id, with_schema_instruction,
    LOCAL_TIMEOUT,
};
use crate::{EmbeddingProvider, Provider};

pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

/// Native Ollama API (`/api/chat`, `/api/embed`). No credentials.
pub struct OllamaProvider {
    client: Client,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(api_base: Option<&str>, model: &str, max_tokens: u32, temperature: f32) -> Self {
        // Operators often configure the OpenAI-compatible `/v1` root; the
        // native API lives one level up.
        let base = normalize_base(api_base, DEFAULT_OLLAMA_BASE);
        let base = base.strip_suffix("/v1").unwrap_or(&base).to_string();
        Self {
            client: build_http_client(LOCAL_TIMEOUT),
            api_base: base,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Config may store "ollama/llama3" but the API expects "llama3".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("ollama/").unwrap_or(model)
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| {
                let tool_calls = msg.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "function": {"name": tc.name, "arguments": tc.arguments}
                            })
                        })
                        .collect()
                });
                OllamaMessage {
                    role: msg.role.clone(),
                    content: msg.content_text(),
                    tool_calls,
                    tool_name: if msg.role == "tool" { msg.name.clone() } else { None },
                }
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        response_schema: Option<&Value>,
    ) -> Value {
        let prepared = with_schema_instruction(messages, response_schema);
        let mut request = serde_json::json!({
            "model": Self::normalize_model(&self.model),
            "messages": Self::convert_messages(&prepared),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        });

        if !tools.is_empty() {
            // Ollama uses the same format as OpenAI for tools.
            request["tools"] = Value::Array(tools.to_vec());
        } else if let Some(schema) = response_schema {
            request["format"] = schema.clone();
        }

        request
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::Provider(format!(
                "Ollama API error {}: {}",
                status, raw_body
            )));
        }

        Ok(raw_body)
    }

    fn parse_response(raw_body: &str) -> Result<LLMResponse> {
        let resp: OllamaChatResponse = serde_json::from_str(raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Ollama response: {}. Body: {}",
                e,
                preview(raw_body, 500)
            ))
        })?;

        let tool_calls: Vec<ToolCallRequest> = resp
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| tc.function)
            .map(|func| ToolCallRequest {
                id: synthesize_call_id("ollama"),
                name: func.name,
                arguments: func.arguments,
            })
            .collect();

        let finish_reason = if !tool_calls.is_empty() {
            "tool_calls".to_string()
        } else if resp.done.unwrap_or(true) {
            "stop".to_string()
        } else {
            "length".to_string()
        };

        let content = resp.message.content;
        Ok(LLMResponse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
            finish_reason,
            usage: serde_json::json!({
                "prompt_tokens": resp.prompt_eval_count,
                "completion_tokens": resp.eval_count,
            }),
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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
        let url = format!("{}/api/chat", self.api_base);
        let request = self.build_request(messages, tools, response_schema);

        info!(
            url = %url,
            model = %Self::normalize_model(&self.model),
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling Ollama API"
        );

        let raw_body = self.post_json(&url, &request).await?;
        debug!(body_len = raw_body.len(), "Ollama raw response");

        let parsed = Self::parse_response(&raw_body)?;
        info!(
            content_len = parsed.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls_count = parsed.tool_calls.len(),
            finish_reason = %parsed.finish_reason,
            "Ollama response parsed"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.api_base);
        let request = serde_json::json!({
            "model": Self::normalize_model(&self.model),
            "input": texts,
        });

        info!(url = %url, inputs = texts.len(), "Calling Ollama embed API");

        let raw_body = self.post_json(&url, &request).await?;
        let resp: OllamaEmbedResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Ollama embed response: {}. Body: {}",
                e,
                preview(&raw_body, 500)
            ))
        })?;
        Ok(resp.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: Option<OllamaFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_strips_openai_suffix() {
        assert_eq!(OllamaProvider::new(None, "llama3", 1, 0.0).api_base(), "http://localhost:11434");
        assert_eq!(
            OllamaProvider::new(Some("http://gpu-box:11434/v1/"), "llama3", 1, 0.0).api_base(),
            "http://gpu-box:11434"
        );
    }

    #[test]
    fn test_normalize_model() {
        assert_eq!(OllamaProvider::normalize_model("ollama/llama3"), "llama3");
        assert_eq!(OllamaProvider::normalize_model("qwen2.5:7b"), "qwen2.5:7b");
    }

    #[test]
    fn test_convert_messages_with_tool_history() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::assistant_tool_call(ToolCallRequest {
                id: "c1".to_string(),
                name: "ls".to_string(),
                arguments: json!({"dir": "."}),
            }),
            ChatMessage::tool_result("c1", "ls", json!(["a", "b"])),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].tool_calls.as_ref().unwrap()[0]["function"]["name"], "ls");
        assert_eq!(converted[2].content, "[\"a\",\"b\"]");
        assert_eq!(converted[2].tool_name.as_deref(), Some("ls"));
        assert!(converted[0].tool_name.is_none());
    }

    #[test]
    fn test_format_set_only_without_tools() {
        let p = OllamaProvider::new(None, "llama3", 256, 0.2);
        let schema = json!({"type": "object"});
        let req = p.build_request(&[ChatMessage::user("hi")], &[], Some(&schema));
        assert_eq!(req["format"], schema);
        assert_eq!(req["options"]["num_predict"], 256);

        let tools = vec![json!({"type": "function", "function": {"name": "ls"}})];
        let req = p.build_request(&[ChatMessage::user("hi")], &tools, Some(&schema));
        assert!(req.get("format").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = r#"{
            "model": "llama3",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "read_file", "arguments": {"path": "/tmp/test"}}}]
            },
            "done": true
        }"#;

        let resp = OllamaProvider::parse_response(raw).unwrap();
        assert!(resp.content.is_none());
        assert!(resp.tool_calls[0].id.starts_with("ollama_call_"));
        let again = OllamaProvider::parse_response(raw).unwrap();
        assert_ne!(again.tool_calls[0].id, resp.tool_calls[0].id);
        assert_eq!(resp.tool_calls[0].arguments["path"], "/tmp/test");
        assert_eq!(resp.finish_reason, "tool_calls");
    }

    #[test]
    fn test_parse_response_text() {
        let raw = r#"{"message": {"role": "assistant", "content": "hello"}, "done": true, "eval_count": 3}"#;
        let resp = OllamaProvider::parse_response(raw).unwrap();
        assert_eq!(resp.content.as_deref(), Some("hello"));
        assert_eq!(resp.usage["completion_tokens"], 3);
    }
}

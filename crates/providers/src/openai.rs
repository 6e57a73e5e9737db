use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use nupi_adapter_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{
    build_http_client, normalize_base, preview, with_schema_instruction, DEFAULT_TIMEOUT,
};
use crate::{EmbeddingProvider, Provider};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat completions, also used for any endpoint speaking the same
/// protocol (vLLM, LM Studio, OpenRouter and friends).
pub struct OpenAIProvider {
    client: Client,
    name: String,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    /// Send `response_format: json_schema`. Only the first-party API is
    /// known to accept it; compatible servers get the prompt instruction.
    native_json_schema: bool,
}

impl OpenAIProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: build_http_client(DEFAULT_TIMEOUT),
            name: "openai".to_string(),
            api_key: api_key.to_string(),
            api_base: normalize_base(api_base, OPENAI_API_BASE),
            model: model.to_string(),
            max_tokens,
            temperature,
            native_json_schema: true,
        }
    }

    /// A generic OpenAI-protocol endpoint registered under `name`.
    pub fn compatible(
        name: &str,
        api_key: &str,
        api_base: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        let mut provider = Self::new(api_key, Some(api_base), model, max_tokens, temperature);
        provider.name = name.to_string();
        provider.native_json_schema = false;
        provider
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Serialize messages for the wire. Tool results must be strings.
    fn convert_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut value = serde_json::to_value(msg).unwrap_or_else(|_| {
                    serde_json::json!({"role": msg.role, "content": msg.content_text()})
                });
                if msg.role == "tool" {
                    value["content"] = Value::String(msg.content_text());
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove("name");
                    }
                }
                value
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
            "model": self.model,
            "messages": Self::convert_messages(&prepared),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        if !tools.is_empty() {
            request["tools"] = Value::Array(tools.to_vec());
            request["tool_choice"] = Value::String("auto".to_string());
        } else if let (Some(schema), true) = (response_schema, self.native_json_schema) {
            request["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "schema": schema,
                }
            });
        }

        request
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String> {
        let mut builder = self.client.post(url).header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("{} request failed: {}", self.name, e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(provider = %self.name, status = %status, body = %raw_body, "LLM API error");
            return Err(Error::Provider(format!(
                "{} API error {}: {}",
                self.name, status, raw_body
            )));
        }

        Ok(raw_body)
    }

    fn parse_chat_response(raw_body: &str) -> Result<LLMResponse> {
        let chat_response: ChatResponse = serde_json::from_str(raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                preview(raw_body, 500)
            ))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = if tc.function.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                        warn!(error = %e, raw = %tc.function.arguments, "Failed to parse tool call arguments as JSON, using empty object");
                        Value::Object(serde_json::Map::new())
                    })
                };
                ToolCallRequest {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        let content = choice.message.content.filter(|c| !c.is_empty());

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: chat_response.usage.unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
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
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(messages, tools, response_schema);

        info!(
            url = %url,
            provider = %self.name,
            model = %self.model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            structured = response_schema.is_some(),
            "Calling LLM"
        );

        let raw_body = self.post_json(&url, &request).await?;
        debug!(body_len = raw_body.len(), preview = %preview(&raw_body, 500), "LLM raw response");

        let response = Self::parse_chat_response(&raw_body)?;
        info!(
            content_len = response.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls_count = response.tool_calls.len(),
            finish_reason = %response.finish_reason,
            "LLM response parsed"
        );
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);
        let request = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        info!(url = %url, provider = %self.name, model = %self.model, inputs = texts.len(), "Calling embeddings API");

        let raw_body = self.post_json(&url, &request).await?;
        let mut resp: EmbeddingsResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse embeddings response: {}. Body: {}",
                e,
                preview(&raw_body, 500)
            ))
        })?;

        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

use async_trait::async_trait;
use nupi_adapter_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use nupi_adapter_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::client::{
    build_http_client, normalize_base, preview, synthesize_call_id, with_schema_instruction,
    DEFAULT_TIMEOUT,
};
use crate::{EmbeddingProvider, Provider};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiProvider {
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
            api_base: normalize_base(api_base, GEMINI_API_BASE),
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    /// Config may store "gemini/gemini-2.0-flash" or "models/..." but the
    /// URL path wants the bare id.
    fn normalize_model(model: &str) -> &str {
        let model = model.strip_prefix("gemini/").unwrap_or(model);
        model.strip_prefix("models/").unwrap_or(model)
    }

    /// Gemini uses `role: "user"/"model"`, with system instruction as a separate field.
    fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_text: Option<String> = None;
        let mut gemini_contents: Vec<Value> = Vec::new();

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
                    let mut parts: Vec<Value> = Vec::new();

                    let text = msg.content_text();
                    if !text.is_empty() {
                        parts.push(serde_json::json!({"text": text}));
                    }

                    for tc in msg.tool_calls.iter().flatten() {
                        parts.push(serde_json::json!({
                            "functionCall": {
                                "name": tc.name,
                                "args": tc.arguments,
                            }
                        }));
                    }

                    if parts.is_empty() {
                        parts.push(serde_json::json!({"text": ""}));
                    }

                    gemini_contents.push(serde_json::json!({
                        "role": "model",
                        "parts": parts,
                    }));
                }
                "tool" => {
                    // functionResponse is matched by function name, not call id.
                    let name = msg
                        .name
                        .as_deref()
                        .or(msg.tool_call_id.as_deref())
                        .unwrap_or("");
                    let response_value = match &msg.content {
                        Value::Object(_) => msg.content.clone(),
                        other => serde_json::json!({"result": other}),
                    };

                    let func_response = serde_json::json!({
                        "functionResponse": {
                            "name": name,
                            "response": response_value,
                        }
                    });

                    if let Some(arr) = gemini_contents
                        .last_mut()
                        .filter(|last| last.get("role").and_then(|v| v.as_str()) == Some("user"))
                        .and_then(|last| last.get_mut("parts"))
                        .and_then(|parts| parts.as_array_mut())
                        .filter(|arr| arr.first().and_then(|v| v.get("functionResponse")).is_some())
                    {
                        arr.push(func_response);
                        continue;
                    }

                    gemini_contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [func_response],
                    }));
                }
                _ => {
                    gemini_contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{"text": msg.content_text()}],
                    }));
                }
            }
        }

        (system_text, gemini_contents)
    }

    /// Convert OpenAI-style tool schemas to Gemini function declarations.
    fn convert_tools(tools: &[Value]) -> Vec<Value> {
        let declarations: Vec<Value> = tools
            .iter()
            .filter_map(|tool| {
                let func = tool.get("function")?;
                let name = func.get("name")?.as_str()?;
                let description = func
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let parameters = func
                    .get("parameters")
                    .cloned()
                    .unwrap_or(serde_json::json!({"type": "object"}));

                Some(serde_json::json!({
                    "name": name,
                    "description": description,
                    "parameters": parameters,
                }))
            })
            .collect();

        if declarations.is_empty() {
            vec![]
        } else {
            vec![serde_json::json!({"functionDeclarations": declarations})]
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        response_schema: Option<&Value>,
    ) -> Value {
        let prepared = with_schema_instruction(messages, response_schema);
        let (system_instruction, contents) = Self::convert_messages(&prepared);
        let gemini_tools = Self::convert_tools(tools);

        let mut request = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            }
        });

        if let Some(sys) = &system_instruction {
            request["systemInstruction"] = serde_json::json!({"parts": [{"text": sys}]});
        }

        if !gemini_tools.is_empty() {
            request["tools"] = Value::Array(gemini_tools);
        } else if response_schema.is_some() {
            // JSON mode cannot be combined with function calling.
            request["generationConfig"]["responseMimeType"] =
                Value::String("application/json".to_string());
        }

        request
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Gemini API error");
            return Err(Error::Provider(format!(
                "Gemini API error {}: {}",
                status, raw_body
            )));
        }

        Ok(raw_body)
    }

    fn parse_response(raw_body: &str) -> Result<LLMResponse> {
        let resp: GeminiResponse = serde_json::from_str(raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Gemini response: {}. Body: {}",
                e,
                preview(raw_body, 500)
            ))
        })?;

        let candidate = resp
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| Error::Provider("No candidates in Gemini response".to_string()))?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                text_parts.push(text);
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCallRequest {
                    id: synthesize_call_id("gemini"),
                    name: fc.name,
                    arguments: fc.args.unwrap_or(Value::Object(serde_json::Map::new())),
                });
            }
        }

        let finish_reason = match candidate.finish_reason.as_deref() {
            _ if !tool_calls.is_empty() => "tool_calls".to_string(),
            Some("STOP") | None => "stop".to_string(),
            Some("MAX_TOKENS") => "length".to_string(),
            Some("SAFETY") => "content_filter".to_string(),
            Some(other) => other.to_lowercase(),
        };

        let usage = match &resp.usage_metadata {
            Some(meta) => serde_json::json!({
                "prompt_tokens": meta.prompt_token_count,
                "completion_tokens": meta.candidates_token_count,
            }),
            None => Value::Null,
        };

        Ok(LLMResponse {
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "google"
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
        let model = Self::normalize_model(&self.model);
        let url = format!("{}/models/{}:generateContent", self.api_base, model);
        let request = self.build_request(messages, tools, response_schema);

        info!(
            model = %model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling Gemini API"
        );

        let raw_body = self.post_json(&url, &request).await?;
        debug!(body_len = raw_body.len(), "Gemini raw response");

        let parsed = Self::parse_response(&raw_body)?;
        info!(
            content_len = parsed.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls_count = parsed.tool_calls.len(),
            finish_reason = %parsed.finish_reason,
            "Gemini response parsed"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Self::normalize_model(&self.model);
        let url = format!("{}/models/{}:batchEmbedContents", self.api_base, model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", model),
                    "content": {"parts": [{"text": text}]},
                })
            })
            .collect();

        info!(model = %model, inputs = texts.len(), "Calling Gemini embeddings API");

        let raw_body = self.post_json(&url, &serde_json::json!({"requests": requests})).await?;
        let resp: GeminiEmbeddingResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Gemini embeddings response: {}. Body: {}",
                e,
                preview(&raw_body, 500)
            ))
        })?;

        Ok(resp.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

use nupi_adapter_core::types::ChatMessage;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Cloud providers answer well within this; local inference gets longer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the HTTP client used by one provider instance.
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with timeout, using default");
        Client::new()
    })
}

/// Find the largest byte index <= `max_bytes` that is a valid char boundary.
pub fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// First `max_bytes` of a response body, for error messages and logs.
pub fn preview(body: &str, max_bytes: usize) -> &str {
    &body[..truncate_at_char_boundary(body, max_bytes)]
}

pub fn normalize_base(api_base: Option<&str>, default_base: &str) -> String {
    api_base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(default_base)
        .trim_end_matches('/')
        .to_string()
}

/// Instruction appended to the system prompt when a structured answer is
/// expected. Providers without native JSON output rely on it alone.
pub fn schema_instruction(schema: &Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Respond with a single JSON object that conforms to this JSON Schema, with no surrounding text:\n{}",
        pretty
    )
}

/// Append the schema instruction to the first system message, or prepend a
/// system message when there is none.
pub fn with_schema_instruction(messages: &[ChatMessage], schema: Option<&Value>) -> Vec<ChatMessage> {
    let mut result = messages.to_vec();
    let Some(schema) = schema else {
        return result;
    };
    let instruction = schema_instruction(schema);

    if let Some(sys_msg) = result.iter_mut().find(|m| m.role == "system") {
        let text = sys_msg.content_text();
        sys_msg.content = Value::String(if text.is_empty() {
            instruction
        } else {
            format!("{}\n\n{}", text, instruction)
        });
        return result;
    }

    result.insert(0, ChatMessage::system(&instruction));
    result
}

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(0);

/// Call id for backends that do not assign one. Unique for the process
/// lifetime, so ids never repeat across turns of a tool loop.
pub fn synthesize_call_id(prefix: &str) -> String {
    format!("{}_call_{}", prefix, NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
}

/// Resolve a credential: the explicit task key wins, then the first
/// non-empty environment variable.
pub fn resolve_api_key(explicit: Option<&str>, env_vars: &[&str]) -> Option<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    env_vars
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_synthesized_call_ids_never_repeat() {
        let first = synthesize_call_id("gemini");
        let second = synthesize_call_id("gemini");
        assert!(first.starts_with("gemini_call_"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        let s = "zażółć";
        let end = truncate_at_char_boundary(s, 3);
        assert!(s.is_char_boundary(end));
        assert_eq!(preview("hello", 100), "hello");
        assert_eq!(preview("hello", 2), "he");
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base(None, "https://api.openai.com/v1"), "https://api.openai.com/v1");
        assert_eq!(normalize_base(Some("http://x:8000/v1/"), "d"), "http://x:8000/v1");
        assert_eq!(normalize_base(Some("  "), "d"), "d");
    }

    #[test]
    fn test_schema_instruction_appended_to_system() {
        let messages = vec![ChatMessage::system("You are helpful"), ChatMessage::user("hi")];
        let schema = json!({"type": "object"});
        let out = with_schema_instruction(&messages, Some(&schema));
        assert_eq!(out.len(), 2);
        let sys = out[0].content_text();
        assert!(sys.starts_with("You are helpful\n\n"));
        assert!(sys.contains("JSON Schema"));
        assert_eq!(out[1], messages[1]);
    }

    #[test]
    fn test_schema_instruction_prepends_system_when_missing() {
        let messages = vec![ChatMessage::user("hi")];
        let schema = json!({"type": "object"});
        let out = with_schema_instruction(&messages, Some(&schema));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "system");

        let untouched = with_schema_instruction(&messages, None);
        assert_eq!(untouched, messages);
    }

    #[test]
    fn test_resolve_api_key_explicit_wins() {
        assert_eq!(
            resolve_api_key(Some("sk-explicit"), &["NUPI_ADAPTER_TEST_UNSET_KEY"]),
            Some("sk-explicit".to_string())
        );
        assert_eq!(resolve_api_key(Some("  "), &["NUPI_ADAPTER_TEST_UNSET_KEY"]), None);
    }
}

//! Rebuilds a multi-turn conversation from the flat tool history a request
//! carries.

use nupi_adapter_core::protocol::ToolInteraction;
use nupi_adapter_core::types::{ChatMessage, ToolCallRequest};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

/// Outcome of converting one history entry.
enum HistoryItem {
    Kept {
        call: ChatMessage,
        result: ChatMessage,
    },
    Dropped(DropReason),
}

enum DropReason {
    Incomplete,
    MalformedArguments(serde_json::Error),
    MalformedResult(serde_json::Error),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Incomplete => write!(f, "missing call or result"),
            DropReason::MalformedArguments(e) => write!(f, "invalid arguments JSON: {}", e),
            DropReason::MalformedResult(e) => write!(f, "invalid result JSON: {}", e),
        }
    }
}

/// Empty text is an empty document, not an error.
fn parse_document(text: &str) -> serde_json::Result<Value> {
    if text.is_empty() {
        Ok(json!({}))
    } else {
        serde_json::from_str(text)
    }
}

fn convert_interaction(interaction: &ToolInteraction) -> HistoryItem {
    let (call, result) = match (&interaction.call, &interaction.result) {
        (Some(call), Some(result)) => (call, result),
        _ => return HistoryItem::Dropped(DropReason::Incomplete),
    };

    let arguments = match parse_document(&call.arguments_json) {
        Ok(v) => v,
        Err(e) => return HistoryItem::Dropped(DropReason::MalformedArguments(e)),
    };
    let parsed_result = match parse_document(&result.result_json) {
        Ok(v) => v,
        Err(e) => return HistoryItem::Dropped(DropReason::MalformedResult(e)),
    };

    let output = if result.is_error {
        json!({"error": true, "message": parsed_result})
    } else {
        parsed_result
    };

    // Both halves carry the call's id so providers can pair them.
    HistoryItem::Kept {
        call: ChatMessage::assistant_tool_call(ToolCallRequest {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            arguments,
        }),
        result: ChatMessage::tool_result(&call.call_id, &call.tool_name, output),
    }
}

/// Build `[system, user, (assistant tool call, tool result)*]`.
///
/// Never fails: incomplete or unparseable entries are skipped and the rest
/// of the history is still used.
pub fn build_messages(
    system_prompt: &str,
    user_prompt: &str,
    history: &[ToolInteraction],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.push(ChatMessage::user(user_prompt));

    for (index, interaction) in history.iter().enumerate() {
        match convert_interaction(interaction) {
            HistoryItem::Kept { call, result } => {
                messages.push(call);
                messages.push(result);
            }
            HistoryItem::Dropped(DropReason::Incomplete) => {
                debug!(index, "Skipping incomplete tool interaction");
            }
            HistoryItem::Dropped(reason) => {
                let call_id = interaction.call.as_ref().map(|c| c.call_id.as_str()).unwrap_or("");
                warn!(index, call_id = %call_id, reason = %reason, "Skipping malformed tool interaction");
            }
        }
    }

    messages
}

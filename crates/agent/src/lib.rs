pub mod conversation;
pub mod intent;
pub mod language;
pub mod prompt;
pub mod router;
pub mod service;
pub mod tools;

#[cfg(test)]
mod testing;

pub use conversation::build_messages;
pub use intent::{intent_schema, resolve_intent, resolve_with_model, FailureKind, IntentObject, IntentResult};
pub use language::{resolve_language_instruction, LanguageMode};
pub use router::{Route, TaskRouter};
pub use service::{IntentService, Status};
pub use tools::{convert_tool_definitions, ToolDefinition};

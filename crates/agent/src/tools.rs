use nupi_adapter_core::protocol::ToolDescriptor;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// A tool offered to the model, with its parameters as a parsed JSON Schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// OpenAI function-calling shape. Providers with other native formats
    /// convert from this.
    pub fn to_function_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Convert declared tools into model-facing definitions keyed by name.
///
/// Nameless tools and tools with unparseable schemas are skipped. An empty
/// schema means "no parameters"; whitespace alone is not a schema. When two tools share a name the later one
/// wins.
pub fn convert_tool_definitions(descriptors: &[ToolDescriptor]) -> BTreeMap<String, ToolDefinition> {
    let mut tools = BTreeMap::new();

    for descriptor in descriptors {
        if descriptor.name.is_empty() {
            warn!("Skipping tool with empty name");
            continue;
        }

        let parameters = if descriptor.parameters_json.is_empty() {
            json!({"type": "object"})
        } else {
            match serde_json::from_str::<Value>(&descriptor.parameters_json) {
                Ok(schema) => schema,
                Err(e) => {
                    warn!(tool = %descriptor.name, error = %e, "Skipping tool with malformed parameters schema");
                    continue;
                }
            }
        };

        tools.insert(
            descriptor.name.clone(),
            ToolDefinition {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters,
            },
        );
    }

    tools
}

/// Function schemas for a converted tool set, in name order.
pub fn function_schemas(tools: &BTreeMap<String, ToolDefinition>) -> Vec<Value> {
    tools.values().map(ToolDefinition::to_function_schema).collect()
}

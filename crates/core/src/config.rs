use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Environment variable holding the JSON configuration document.
pub const CONFIG_ENV_VAR: &str = "NUPI_ADAPTER_CONFIG";

/// Task key used when a request carries no (or an unspecified) event type.
pub const DEFAULT_TASK_KEY: &str = "user_intent";

/// Reserved task key for the embedding capability.
pub const EMBEDDING_TASK_KEY: &str = "embedding";

pub const LANGUAGE_CLIENT: &str = "client";
pub const LANGUAGE_AUTO: &str = "auto";

/// Model profile for one logical task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

fn default_language() -> String {
    LANGUAGE_CLIENT.to_string()
}

impl TaskConfig {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Raw shape of a task entry before validation. Absent and `null` fields both
/// land as `None` so defaults only apply to missing values, never to an
/// explicit `0`.
#[derive(Debug, Deserialize)]
struct RawTaskConfig {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub tasks: HashMap<String, TaskConfig>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut tasks = HashMap::new();
        tasks.insert(
            DEFAULT_TASK_KEY.to_string(),
            TaskConfig::new("openai", "gpt-4o-mini"),
        );
        Self {
            tasks,
            language: default_language(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(raw)?;

        let raw_tasks = match json.get("tasks") {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(Error::Config(
                    "AI adapter config: \"tasks\" map is required".to_string(),
                ))
            }
        };

        let mut tasks = HashMap::with_capacity(raw_tasks.len());
        for (key, raw_task) in raw_tasks {
            let parsed: RawTaskConfig = serde_json::from_value(raw_task.clone()).map_err(|e| {
                Error::Config(format!("AI adapter config: task \"{}\" is malformed: {}", key, e))
            })?;

            let (provider, model) = match (non_empty(parsed.provider), non_empty(parsed.model)) {
                (Some(p), Some(m)) => (p, m),
                _ => {
                    return Err(Error::Config(format!(
                        "AI adapter config: task \"{}\" requires \"provider\" and \"model\"",
                        key
                    )))
                }
            };

            tasks.insert(
                key.clone(),
                TaskConfig {
                    provider,
                    model,
                    api_key: non_empty(parsed.api_key),
                    base_url: non_empty(parsed.base_url),
                    max_tokens: parsed.max_tokens.unwrap_or_else(default_max_tokens),
                    temperature: parsed.temperature.unwrap_or_else(default_temperature),
                },
            );
        }

        let language = json
            .get("language")
            .and_then(Value::as_str)
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(default_language);

        let config = Self { tasks, language };
        info!(tasks = %config.task_keys().join(", "), "AI adapter configured tasks");
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Load from `NUPI_ADAPTER_CONFIG`, falling back to defaults when unset.
    pub fn from_env() -> Result<Self> {
        Self::from_optional_json(std::env::var(CONFIG_ENV_VAR).ok().as_deref())
    }

    fn from_optional_json(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => Self::from_json_str(raw),
            _ => {
                warn!("{} not set, using defaults", CONFIG_ENV_VAR);
                Ok(Self::default())
            }
        }
    }

    /// All configured task keys, sorted.
    pub fn task_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn task(&self, key: &str) -> Option<&TaskConfig> {
        self.tasks.get(key)
    }
}

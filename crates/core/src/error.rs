use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    /// No task profile exists for the requested key.
    #[error(
        "No configuration for event_type '{event_type}'. Configured tasks: [{}]",
        .available_tasks.join(", ")
    )]
    MissingTaskConfig {
        event_type: String,
        /// Sorted list of every configured task key.
        available_tasks: Vec<String>,
    },

    #[error("Provider \"{provider}\" does not support {capability}")]
    UnsupportedCapability { provider: String, capability: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_missing_task_config(&self) -> bool {
        matches!(self, Error::MissingTaskConfig { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

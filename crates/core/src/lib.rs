pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{Config, TaskConfig, DEFAULT_TASK_KEY, EMBEDDING_TASK_KEY};
pub use error::{Error, Result};

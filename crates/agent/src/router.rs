use nupi_adapter_core::{Config, Error, Result, TaskConfig, DEFAULT_TASK_KEY, EMBEDDING_TASK_KEY};
use nupi_adapter_providers::{EmbeddingProvider, HttpProviderFactory, Provider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// A resolved generation backend plus the profile it was built from.
pub struct Route {
    pub provider: Arc<dyn Provider>,
    pub task: TaskConfig,
}

pub struct EmbeddingRoute {
    pub provider: Arc<dyn EmbeddingProvider>,
    pub task: TaskConfig,
}

/// Empty keys select the default task.
pub fn normalize_key(raw_key: &str) -> &str {
    if raw_key.is_empty() {
        DEFAULT_TASK_KEY
    } else {
        raw_key
    }
}

/// Maps task keys to model backends, building each at most once.
///
/// Concurrent misses on the same key may each construct a backend, but only
/// the first insert is kept and every caller gets that one back. Failures
/// are never cached.
pub struct TaskRouter {
    config: Arc<Config>,
    factory: Arc<dyn ProviderFactory>,
    routes: Mutex<HashMap<String, Arc<Route>>>,
    embedding: Mutex<Option<Arc<EmbeddingRoute>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded maps are only ever inserted into, so a panic elsewhere
    // cannot leave them half-written.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TaskRouter {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_factory(config, Arc::new(HttpProviderFactory))
    }

    pub fn with_factory(config: Arc<Config>, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            config,
            factory,
            routes: Mutex::new(HashMap::new()),
            embedding: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lookup(&self, key: &str) -> Result<&TaskConfig> {
        self.config.task(key).ok_or_else(|| Error::MissingTaskConfig {
            event_type: key.to_string(),
            available_tasks: self.config.task_keys(),
        })
    }

    /// Resolve the generation route for a task key.
    pub fn resolve(&self, raw_key: &str) -> Result<Arc<Route>> {
        let key = normalize_key(raw_key);

        if let Some(route) = lock(&self.routes).get(key) {
            return Ok(Arc::clone(route));
        }

        let task = self.lookup(key)?;
        let provider = self.factory.chat_provider(task)?;
        info!(
            task = %key,
            provider = %task.provider,
            model = %task.model,
            "Resolved task route"
        );

        let route = Arc::new(Route {
            provider,
            task: task.clone(),
        });
        let mut routes = lock(&self.routes);
        Ok(Arc::clone(routes.entry(key.to_string()).or_insert(route)))
    }

    /// Resolve the embedding route from the reserved `embedding` task.
    pub fn resolve_embedding(&self) -> Result<Arc<EmbeddingRoute>> {
        if let Some(route) = lock(&self.embedding).as_ref() {
            return Ok(Arc::clone(route));
        }

        let task = self.lookup(EMBEDDING_TASK_KEY)?;
        let provider = self.factory.embedding_provider(task)?;
        info!(
            provider = %task.provider,
            model = %task.model,
            "Resolved embedding route"
        );

        let route = Arc::new(EmbeddingRoute {
            provider,
            task: task.clone(),
        });
        let mut slot = lock(&self.embedding);
        Ok(Arc::clone(slot.get_or_insert(route)))
    }
}

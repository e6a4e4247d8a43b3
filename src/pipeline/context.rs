use chrono::{DateTime, Utc};
use lakehouse_core::{QueryEngine, TableStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;

/// Everything one pipeline run needs, passed explicitly to every step.
///
/// The driver acquires a context when the run starts and calls [`RunContext::finish`] when it
/// ends. Clones share the same store, engine and configuration, so concurrent steps all see one
/// run.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub store: Arc<dyn TableStore>,
    pub query_engine: Option<Arc<dyn QueryEngine>>,
    pub config: Arc<Config>,
}

impl RunContext {
    pub fn acquire(config: Config, store: Arc<dyn TableStore>) -> Self {
        let context = Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            store,
            query_engine: None,
            config: Arc::new(config),
        };
        info!(run_id = %context.run_id, "🚀 Acquired run context for '{}'", context.config.name);
        context
    }

    pub fn with_query_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.query_engine = Some(engine);
        self
    }

    /// Release the context, returning how long the run held it.
    pub fn finish(self) -> chrono::Duration {
        let elapsed = Utc::now() - self.started_at;
        info!(
            run_id = %self.run_id,
            elapsed_ms = elapsed.num_milliseconds(),
            "Released run context"
        );
        elapsed
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("started_at", &self.started_at)
            .field("has_query_engine", &self.query_engine.is_some())
            .field("config", &self.config.name)
            .finish()
    }
}

use std::sync::Arc;

use super::{Engine, QueryResult, SharedEngine, SqlValue};
use crate::context;
use crate::error::EngineError;

/// Async facade over a blocking engine.
///
/// Each `execute` runs the delegate on tokio's blocking pool. The facade has
/// no execution path of its own; instrumenting it means instrumenting
/// `sync_engine()`.
#[derive(Clone)]
pub struct AsyncEngine {
    sync_engine: SharedEngine,
}

impl AsyncEngine {
    pub fn new(sync_engine: SharedEngine) -> Self {
        Self { sync_engine }
    }

    pub fn from_engine<E: Engine>(engine: E) -> Self {
        Self::new(Arc::new(engine))
    }

    /// The blocking delegate doing the actual work.
    pub fn sync_engine(&self) -> &SharedEngine {
        &self.sync_engine
    }

    pub fn name(&self) -> &str {
        self.sync_engine.name()
    }

    pub fn is_instrumented(&self) -> bool {
        self.sync_engine.is_instrumented()
    }

    /// Run `statement` on the blocking pool.
    ///
    /// Task-locals do not cross onto blocking threads, so the caller's
    /// profile is captured here and re-installed around the delegate call.
    pub async fn execute(
        &self,
        statement: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<QueryResult, EngineError> {
        let engine = self.sync_engine.clone();
        let statement = statement.into();
        let profile = context::current();

        let joined = tokio::task::spawn_blocking(move || {
            context::sync_scope(profile, || engine.execute(&statement, &params))
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(EngineError::Worker(err.to_string())),
        }
    }
}

impl std::fmt::Debug for AsyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEngine")
            .field("sync_engine", &self.sync_engine.id())
            .finish()
    }
}

//! Transparent timing wrapper around an engine's `execute`.
//!
//! [`Instrumentation::instrument`] returns an [`InstrumentedEngine`] that
//! stands in for the wrapped engine. Each statement is timed and, when a request
//! profile is current, attributed to it. The delegate's result (errors
//! included) is returned untouched.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::InstrumentationConfig;
use crate::context;
use crate::engine::{AsyncEngine, Engine, EngineId, QueryResult, SharedEngine, SqlValue};
use crate::error::EngineError;
use crate::profile::DbQuery;

// ─── Registry ────────────────────────────────────────────────────

/// Hands out at most one live wrapper per underlying engine.
pub struct Instrumentation {
    config: InstrumentationConfig,
    registry: Mutex<HashMap<EngineId, Weak<InstrumentedEngine>>>,
}

impl Instrumentation {
    pub fn new(config: InstrumentationConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Wrap `engine`. Idempotent: an already-wrapped engine comes back as is,
    /// and a delegate seen before gets its existing wrapper.
    pub fn instrument(&self, engine: SharedEngine) -> SharedEngine {
        if engine.is_instrumented() {
            debug!(engine = engine.name(), "engine already instrumented");
            return engine;
        }

        let id = engine.id();
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.get(&id).and_then(Weak::upgrade) {
            debug!(engine = engine.name(), %id, "reusing existing instrumentation");
            return existing;
        }

        registry.retain(|_, w| w.strong_count() > 0);
        let wrapped = Arc::new(InstrumentedEngine::new(engine, self.config.clone()));
        registry.insert(id, Arc::downgrade(&wrapped));
        info!(engine = wrapped.name(), %id, "instrumented database engine");
        wrapped
    }

    /// Instrument an async facade through its blocking delegate.
    pub fn instrument_async(&self, engine: &AsyncEngine) -> AsyncEngine {
        AsyncEngine::new(self.instrument(engine.sync_engine().clone()))
    }

    /// True while a wrapper for `id` is alive.
    pub fn is_instrumented(&self, id: EngineId) -> bool {
        self.registry
            .lock()
            .get(&id)
            .is_some_and(|w| w.strong_count() > 0)
    }

    pub fn instrumented_count(&self) -> usize {
        let mut registry = self.registry.lock();
        registry.retain(|_, w| w.strong_count() > 0);
        registry.len()
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(InstrumentationConfig::default())
    }
}

// ─── Wrapper ─────────────────────────────────────────────────────

/// Engine decorator recording every statement into the current profile.
pub struct InstrumentedEngine {
    inner: SharedEngine,
    config: InstrumentationConfig,
}

impl InstrumentedEngine {
    fn new(inner: SharedEngine, config: InstrumentationConfig) -> Self {
        Self { inner, config }
    }

    pub fn delegate(&self) -> &SharedEngine {
        &self.inner
    }

    fn record(
        &self,
        statement: &str,
        params: &[SqlValue],
        started_at: chrono::DateTime<Utc>,
        elapsed: std::time::Duration,
        result: &Result<QueryResult, EngineError>,
    ) {
        let slow = elapsed >= self.config.slow_query_threshold;
        if slow {
            warn!(
                engine = self.inner.name(),
                statement,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                "slow query"
            );
        }

        let Some(profile) = context::current() else {
            trace!(statement, "no active profile; query discarded");
            return;
        };

        if result.is_err() && !self.config.record_failed_queries {
            return;
        }

        let (rows, error) = match result {
            Ok(r) => (Some(r.row_count()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let params = if self.config.record_parameters {
            params.iter().map(ToString::to_string).collect()
        } else {
            Vec::new()
        };

        let entry = DbQuery {
            statement: statement.to_owned(),
            params,
            started_at,
            duration: elapsed,
            engine_id: self.inner.id(),
            engine: self.inner.name().to_owned(),
            rows,
            error,
            slow,
        };
        if !profile.add_query(entry) {
            debug!(profile = %profile.id(), statement, "profile no longer active; query dropped");
        }
    }
}

impl Engine for InstrumentedEngine {
    fn id(&self) -> EngineId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let result = self.inner.execute(statement, params);
        let elapsed = t0.elapsed();

        self.record(statement, params, started_at, elapsed, &result);
        result
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

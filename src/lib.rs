//! Request and database-query profiler for axum services.
//!
//! Wrap an engine once at startup with [`Profiler::instrument`] (or
//! [`Profiler::instrument_async`]), install
//! [`middleware::profile_requests`], and every statement a handler runs is
//! timed and attached to that request's [`ProfileRecord`]. Sealed records sit
//! in a bounded in-memory history served under `/profiler/api`.
//!
//! The remaining modules (`handlers`, `mock_data`, `load_generator`,
//! `server`) make up the demo application shipped with the binary.

use std::sync::Arc;

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod instrument;
pub mod load_generator;
pub mod middleware;
pub mod mock_data;
pub mod profile;
pub mod profiler;
pub mod server;
pub mod stats;

pub use config::{InstrumentationConfig, ProfilerConfig};
pub use engine::{AsyncEngine, Engine, EngineId, QueryResult, SharedEngine, SqlValue};
pub use error::{ConfigError, EngineError, NotInScope};
pub use instrument::{Instrumentation, InstrumentedEngine};
pub use profile::{DbQuery, Outcome, ProfileHandle, ProfileRecord, ProfileState};
pub use profiler::Profiler;

/// Shared demo-application state available to every handler via
/// `State<Arc<AppState>>`.
pub struct AppState {
    /// Instrumented SQLite engine backing the items API.
    pub db: AsyncEngine,

    /// Instrumented Redis engine backing sessions, when configured.
    pub sessions: Option<AsyncEngine>,

    /// Profiler the middleware and dashboard report into.
    pub profiler: Arc<Profiler>,
}

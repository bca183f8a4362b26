use thiserror::Error;

/// Failure raised by an engine's `execute`.
///
/// The instrumentation layer hands these back to the caller untouched, so
/// whatever the driver reported is what the handler sees.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    /// A parameter the engine has no representation for.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The blocking worker running a delegate was torn down before it
    /// produced a result (runtime shutdown).
    #[error("engine worker failed: {0}")]
    Worker(String),
}

/// Rejected `ProfilerConfig` values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("history_capacity must be at least 1")]
    ZeroHistoryCapacity,

    #[error("dashboard_path must start with '/' and name a sub-path (got {0:?})")]
    DashboardPath(String),
}

/// [`crate::context::set`] was called with no scope to write into.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no profiling scope on this task; run the work inside context::scope or context::sync_scope")]
pub struct NotInScope;

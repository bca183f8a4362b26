use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;

// ─── Profiler configuration ──────────────────────────────────────

/// Knobs for the profiler. Deserializable so it can live in a config file;
/// every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// How many sealed profile records the in-memory history keeps
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Prefix the dashboard API is mounted under (never profiled itself)
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,

    /// Additional path prefixes the middleware lets through unprofiled
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Store rendered bound parameters on each query entry
    #[serde(default = "default_true")]
    pub record_parameters: bool,

    /// Store an entry (with its error message) when a statement fails
    #[serde(default = "default_true")]
    pub record_failed_queries: bool,

    /// Statements at or above this many microseconds are flagged slow
    #[serde(default = "default_slow_query_us")]
    pub slow_query_threshold_us: u64,

    /// Attach a `Server-Timing` header to profiled responses
    #[serde(default = "default_true")]
    pub server_timing: bool,

    /// Static dashboard assets served under `dashboard_path`
    #[serde(default)]
    pub dashboard_assets: Option<PathBuf>,
}

fn default_history_capacity() -> usize {
    1000
}
fn default_dashboard_path() -> String {
    "/profiler".into()
}
fn default_slow_query_us() -> u64 {
    100_000
}
fn default_true() -> bool {
    true
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            dashboard_path: default_dashboard_path(),
            exclude_paths: Vec::new(),
            record_parameters: true,
            record_failed_queries: true,
            slow_query_threshold_us: default_slow_query_us(),
            server_timing: true,
            dashboard_assets: None,
        }
    }
}

impl ProfilerConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_dashboard_path(mut self, path: impl Into<String>) -> Self {
        self.dashboard_path = path.into();
        self
    }

    pub fn with_excluded_path(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_paths.push(prefix.into());
        self
    }

    pub fn with_parameter_recording(mut self, enabled: bool) -> Self {
        self.record_parameters = enabled;
        self
    }

    pub fn with_failed_query_recording(mut self, enabled: bool) -> Self {
        self.record_failed_queries = enabled;
        self
    }

    /// Sub-microsecond thresholds round up to 1µs; only `Duration::ZERO`
    /// flags every statement.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        let micros = u64::try_from(threshold.as_micros()).unwrap_or(u64::MAX);
        self.slow_query_threshold_us = if micros == 0 && !threshold.is_zero() {
            1
        } else {
            micros
        };
        self
    }

    pub fn with_server_timing(mut self, enabled: bool) -> Self {
        self.server_timing = enabled;
        self
    }

    pub fn with_dashboard_assets(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dashboard_assets = Some(dir.into());
        self
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_micros(self.slow_query_threshold_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        let path = &self.dashboard_path;
        if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
            return Err(ConfigError::DashboardPath(self.dashboard_path.clone()));
        }
        Ok(())
    }

    /// The subset the engine wrappers need, copied into each wrapper.
    pub fn instrumentation(&self) -> InstrumentationConfig {
        InstrumentationConfig {
            record_parameters: self.record_parameters,
            record_failed_queries: self.record_failed_queries,
            slow_query_threshold: self.slow_query_threshold(),
        }
    }
}

/// Per-wrapper settings for `InstrumentedEngine`.
#[derive(Debug, Clone)]
pub struct InstrumentationConfig {
    pub record_parameters: bool,
    pub record_failed_queries: bool,
    pub slow_query_threshold: Duration,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        ProfilerConfig::default().instrumentation()
    }
}

// ─── Demo binary arguments ───────────────────────────────────────

/// Profiled items API over SQLite (and optionally Redis).
#[derive(Debug, Parser)]
#[command(name = "query-profiler-demo", version)]
pub struct DemoArgs {
    /// Address the HTTP server binds to
    #[arg(long, env = "PROFILER_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// SQLite database file (":memory:" for a throwaway database)
    #[arg(long, env = "PROFILER_DATABASE", default_value = ":memory:")]
    pub database: String,

    /// Redis URL backing the session endpoints (disabled when absent)
    #[arg(long, env = "PROFILER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Sealed profiles kept in memory
    #[arg(long, default_value_t = 1000)]
    pub history_capacity: usize,

    /// Slow-query threshold in milliseconds
    #[arg(long, default_value_t = 100)]
    pub slow_query_ms: u64,

    /// Do not record bound parameters
    #[arg(long)]
    pub no_params: bool,

    /// Directory of dashboard assets served under /profiler
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Synthetic requests to fire at the app after startup
    #[arg(long, default_value_t = 0)]
    pub demo_requests: u32,

    /// Concurrent workers for the synthetic traffic
    #[arg(long, default_value_t = 4)]
    pub concurrency: u32,
}

impl DemoArgs {
    pub fn profiler_config(&self) -> ProfilerConfig {
        let mut config = ProfilerConfig::default()
            .with_history_capacity(self.history_capacity)
            .with_slow_query_threshold(Duration::from_millis(self.slow_query_ms))
            .with_parameter_recording(!self.no_params);
        if let Some(dir) = &self.assets {
            config = config.with_dashboard_assets(dir.clone());
        }
        config
    }
}

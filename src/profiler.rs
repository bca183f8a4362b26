use std::sync::Arc;

use axum::Router;
use tracing::debug;

use crate::config::ProfilerConfig;
use crate::engine::{AsyncEngine, SharedEngine};
use crate::error::ConfigError;
use crate::instrument::Instrumentation;
use crate::profile::{Outcome, ProfileHandle, ProfileHistory, ProfileRecord};
use crate::stats::{api, StatsCollector};

/// Process-wide profiler state: configuration, the bounded history of
/// sealed records, the aggregate stats and the engine registry.
///
/// Shared as `Arc<Profiler>` between the middleware, the dashboard API and
/// whoever instruments engines at startup.
pub struct Profiler {
    config: ProfilerConfig,
    history: ProfileHistory,
    stats: StatsCollector,
    instrumentation: Instrumentation,
}

impl Profiler {
    pub fn new(config: ProfilerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            history: ProfileHistory::new(config.history_capacity),
            stats: StatsCollector::new(),
            instrumentation: Instrumentation::new(config.instrumentation()),
            config,
        })
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn history(&self) -> &ProfileHistory {
        &self.history
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    pub fn instrument(&self, engine: SharedEngine) -> SharedEngine {
        self.instrumentation.instrument(engine)
    }

    pub fn instrument_async(&self, engine: &AsyncEngine) -> AsyncEngine {
        self.instrumentation.instrument_async(engine)
    }

    /// Paths the middleware never profiles: the dashboard itself plus the
    /// configured prefixes.
    pub fn is_excluded(&self, path: &str) -> bool {
        under_prefix(path, &self.config.dashboard_path)
            || self
                .config
                .exclude_paths
                .iter()
                .any(|prefix| under_prefix(path, prefix))
    }

    /// Fresh record for an inbound request, still in the `Created` state.
    pub fn begin(&self, method: &str, path: &str, route: Option<String>) -> ProfileHandle {
        ProfileHandle::new(method, path, route)
    }

    /// Seal `handle` and store it. `None` when it was already sealed (or
    /// never activated), so a record is stored at most once.
    pub fn finish(
        &self,
        handle: &ProfileHandle,
        status: Option<u16>,
        outcome: Outcome,
    ) -> Option<Arc<ProfileRecord>> {
        let Some(record) = handle.seal(status, outcome) else {
            debug!(profile = %handle.id(), "profile not active; nothing to store");
            return None;
        };
        self.stats.record(&record);
        Some(self.history.push(record))
    }

    /// Forget every stored profile and aggregate.
    pub fn reset(&self) {
        self.history.clear();
        self.stats.reset();
    }

    /// Dashboard routes, already nested under `dashboard_path`.
    pub fn dashboard(self: &Arc<Self>) -> Router {
        api::router(self.clone())
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileState;

    fn profiler(capacity: usize) -> Profiler {
        Profiler::new(ProfilerConfig::default().with_history_capacity(capacity)).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(Profiler::new(ProfilerConfig::default().with_history_capacity(0)).is_err());
    }

    #[test]
    fn dashboard_and_configured_prefixes_are_excluded() {
        let profiler = Profiler::new(
            ProfilerConfig::default().with_excluded_path("/health"),
        )
        .unwrap();

        assert!(profiler.is_excluded("/profiler"));
        assert!(profiler.is_excluded("/profiler/api/stats"));
        assert!(profiler.is_excluded("/health"));
        assert!(!profiler.is_excluded("/profilerx"));
        assert!(!profiler.is_excluded("/items"));
        assert!(!profiler.is_excluded("/"));
    }

    #[test]
    fn finish_stores_once() {
        let profiler = profiler(10);
        let handle = profiler.begin("GET", "/items", None);
        assert_eq!(handle.state(), ProfileState::Created);
        handle.activate();

        let stored = profiler.finish(&handle, Some(200), Outcome::Completed).unwrap();
        assert_eq!(stored.status, Some(200));
        assert!(profiler.finish(&handle, Some(200), Outcome::Completed).is_none());

        assert_eq!(profiler.history().len(), 1);
        assert_eq!(profiler.stats().snapshot().total_requests, 1);
    }

    #[test]
    fn history_is_bounded_to_most_recent() {
        let profiler = profiler(3);
        for i in 0..7 {
            let handle = profiler.begin("GET", &format!("/r/{i}"), None);
            handle.activate();
            profiler.finish(&handle, Some(200), Outcome::Completed);
        }
        let paths: Vec<_> = profiler
            .history()
            .all()
            .iter()
            .map(|r| r.path.clone())
            .collect();
        assert_eq!(paths, ["/r/4", "/r/5", "/r/6"]);
        assert_eq!(profiler.stats().snapshot().total_requests, 7);
    }

    #[test]
    fn reset_clears_history_and_stats() {
        let profiler = profiler(3);
        let handle = profiler.begin("GET", "/", None);
        handle.activate();
        profiler.finish(&handle, Some(200), Outcome::Completed);

        profiler.reset();
        assert!(profiler.history().is_empty());
        assert_eq!(profiler.stats().snapshot().total_requests, 0);
    }
}

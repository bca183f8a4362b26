use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::percentiles::LatencySummary;
use crate::profile::{Outcome, ProfileRecord};

// ─── Configuration ───────────────────────────────────────────────

/// Entries kept in the slowest-queries table
const MAX_SLOW_QUERIES: usize = 10;

/// Timeline resolution (one point per window)
const TIMELINE_WINDOW_MS: u64 = 1_000;

/// Timeline points kept before the oldest are dropped
const MAX_TIMELINE_POINTS: usize = 600;

/// HdrHistogram range: 1 μs → 5 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 300_000_000;
const HIST_SIGFIG: u8 = 3;

/// Request-latency distribution bucket boundaries (μs)
const DIST_BOUNDARIES: &[u64] = &[
    500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
];

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregate over every sealed profile.
/// The middleware calls `record()`, the dashboard API calls `snapshot()`.
pub struct StatsCollector {
    inner: Mutex<Inner>,
}

/// Per-endpoint aggregate, keyed by `"METHOD /route"`.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub requests: u64,
    pub mean_us: f64,
    pub max_us: u64,
    pub queries: u64,
    pub mean_queries: f64,
    pub mean_db_us: f64,
}

/// One row of the slowest-queries table.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQuery {
    pub profile_id: Uuid,
    pub endpoint: String,
    pub statement: String,
    pub duration_us: u64,
    pub started_at: DateTime<Utc>,
}

/// Averages over one timeline window.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub offset_ms: u64,
    pub requests: u64,
    pub avg_total_us: f64,
    pub avg_db_us: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistBucket {
    pub from_us: u64,
    pub to_us: u64,
    pub count: u64,
}

/// Everything the dashboard needs in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: LatencySummary,
    pub db_per_request: LatencySummary,
    pub queries: LatencySummary,

    pub total_requests: u64,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub server_errors: u64,
    pub cancelled: u64,
    pub requests_per_sec: f64,
    pub elapsed_secs: f64,

    pub endpoints: Vec<EndpointStats>,
    pub slowest_queries: Vec<SlowQuery>,
    pub timeline: Vec<TimelinePoint>,
    pub distribution: Vec<DistBucket>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    request_hist: Histogram<u64>,
    db_hist: Histogram<u64>,
    query_hist: Histogram<u64>,

    total_requests: u64,
    total_queries: u64,
    failed_queries: u64,
    server_errors: u64,
    cancelled: u64,

    endpoints: HashMap<String, EndpointAccumulator>,
    slowest: Vec<SlowQuery>,
    timeline: Vec<WindowAccumulator>,

    started: Option<Instant>,
}

#[derive(Default)]
struct EndpointAccumulator {
    requests: u64,
    total_us: u64,
    max_us: u64,
    queries: u64,
    db_us: u64,
}

struct WindowAccumulator {
    offset_ms: u64,
    requests: u64,
    total_us: u64,
    db_us: u64,
}

impl WindowAccumulator {
    fn point(&self) -> TimelinePoint {
        let n = self.requests.max(1) as f64;
        TimelinePoint {
            offset_ms: self.offset_ms,
            requests: self.requests,
            avg_total_us: self.total_us as f64 / n,
            avg_db_us: self.db_us as f64 / n,
        }
    }
}

fn histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}

// ─── StatsCollector impl ─────────────────────────────────────────

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Fold one sealed record into the aggregates.
    pub fn record(&self, profile: &ProfileRecord) {
        self.inner.lock().record(profile);
    }

    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            request_hist: histogram(),
            db_hist: histogram(),
            query_hist: histogram(),
            total_requests: 0,
            total_queries: 0,
            failed_queries: 0,
            server_errors: 0,
            cancelled: 0,
            endpoints: HashMap::new(),
            slowest: Vec::with_capacity(MAX_SLOW_QUERIES + 1),
            timeline: Vec::new(),
            started: None,
        }
    }

    fn record(&mut self, profile: &ProfileRecord) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let offset_ms = started.elapsed().as_millis() as u64;

        let total_us = profile.duration.map_or(0, |d| d.as_micros() as u64);
        let db_us = profile.db_time().as_micros() as u64;
        let endpoint = profile.endpoint();

        self.total_requests += 1;
        self.total_queries += profile.queries.len() as u64;
        self.failed_queries += profile.failed_queries() as u64;
        if profile.status.is_some_and(|s| s >= 500) {
            self.server_errors += 1;
        }
        if profile.outcome == Some(Outcome::Cancelled) {
            self.cancelled += 1;
        }

        // Histograms reject 0, clamp to ≥ 1 μs
        let _ = self.request_hist.record(total_us.max(1));
        let _ = self.db_hist.record(db_us.max(1));
        for query in &profile.queries {
            let us = query.duration.as_micros() as u64;
            let _ = self.query_hist.record(us.max(1));
            self.offer_slow_query(profile, &endpoint, &query.statement, us, query.started_at);
        }

        let acc = self.endpoints.entry(endpoint).or_default();
        acc.requests += 1;
        acc.total_us += total_us;
        acc.max_us = acc.max_us.max(total_us);
        acc.queries += profile.queries.len() as u64;
        acc.db_us += db_us;

        self.push_to_timeline(offset_ms, total_us, db_us);
    }

    /// Keep the `MAX_SLOW_QUERIES` slowest statements, slowest first.
    fn offer_slow_query(
        &mut self,
        profile: &ProfileRecord,
        endpoint: &str,
        statement: &str,
        duration_us: u64,
        started_at: DateTime<Utc>,
    ) {
        if self.slowest.len() == MAX_SLOW_QUERIES
            && self.slowest.last().is_some_and(|q| q.duration_us >= duration_us)
        {
            return;
        }
        let at = self.slowest.partition_point(|q| q.duration_us >= duration_us);
        self.slowest.insert(
            at,
            SlowQuery {
                profile_id: profile.id,
                endpoint: endpoint.to_owned(),
                statement: statement.to_owned(),
                duration_us,
                started_at,
            },
        );
        self.slowest.truncate(MAX_SLOW_QUERIES);
    }

    fn push_to_timeline(&mut self, offset_ms: u64, total_us: u64, db_us: u64) {
        let window = offset_ms / TIMELINE_WINDOW_MS * TIMELINE_WINDOW_MS;
        match self.timeline.last_mut() {
            Some(w) if w.offset_ms == window => {
                w.requests += 1;
                w.total_us += total_us;
                w.db_us += db_us;
            }
            _ => {
                self.timeline.push(WindowAccumulator {
                    offset_ms: window,
                    requests: 1,
                    total_us,
                    db_us,
                });
                if self.timeline.len() > MAX_TIMELINE_POINTS {
                    self.timeline.remove(0);
                }
            }
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let elapsed_secs = self.started.map_or(0.0, |t| t.elapsed().as_secs_f64());
        let requests_per_sec = if elapsed_secs > 0.0 {
            self.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let mut endpoints: Vec<EndpointStats> = self
            .endpoints
            .iter()
            .map(|(name, acc)| {
                let n = acc.requests.max(1) as f64;
                EndpointStats {
                    endpoint: name.clone(),
                    requests: acc.requests,
                    mean_us: acc.total_us as f64 / n,
                    max_us: acc.max_us,
                    queries: acc.queries,
                    mean_queries: acc.queries as f64 / n,
                    mean_db_us: acc.db_us as f64 / n,
                }
            })
            .collect();
        // Busiest first; name breaks ties so output is stable
        endpoints.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.endpoint.cmp(&b.endpoint)));

        StatsSnapshot {
            requests: LatencySummary::from_histogram(&self.request_hist),
            db_per_request: LatencySummary::from_histogram(&self.db_hist),
            queries: LatencySummary::from_histogram(&self.query_hist),
            total_requests: self.total_requests,
            total_queries: self.total_queries,
            failed_queries: self.failed_queries,
            server_errors: self.server_errors,
            cancelled: self.cancelled,
            requests_per_sec,
            elapsed_secs,
            endpoints,
            slowest_queries: self.slowest.clone(),
            timeline: self.timeline.iter().map(WindowAccumulator::point).collect(),
            distribution: distribution(&self.request_hist),
        }
    }
}

/// Bucket every recorded request latency into `DIST_BOUNDARIES`, skipping
/// empty buckets. The last bucket is open-ended up to the histogram max.
fn distribution(hist: &Histogram<u64>) -> Vec<DistBucket> {
    if hist.is_empty() {
        return Vec::new();
    }

    let mut counts = vec![0u64; DIST_BOUNDARIES.len() + 1];
    for iv in hist.iter_recorded() {
        let idx = DIST_BOUNDARIES.partition_point(|&b| b < iv.value_iterated_to());
        counts[idx] += iv.count_at_value();
    }

    let mut lower = 0;
    let mut buckets = Vec::new();
    for (idx, count) in counts.into_iter().enumerate() {
        let upper = DIST_BOUNDARIES.get(idx).copied().unwrap_or_else(|| hist.max());
        if count > 0 {
            buckets.push(DistBucket {
                from_us: lower,
                to_us: upper,
                count,
            });
        }
        lower = upper;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{sample_query, ProfileHandle};
    use std::time::Duration;

    fn sealed(route: &str, status: u16, queries: &[(&str, u64)]) -> ProfileRecord {
        let handle = ProfileHandle::new("GET", route, Some(route.to_owned()));
        handle.activate();
        for (statement, micros) in queries {
            let mut q = sample_query(statement);
            q.duration = Duration::from_micros(*micros);
            handle.add_query(q);
        }
        handle.seal(Some(status), Outcome::Completed).unwrap()
    }

    #[test]
    fn counts_requests_queries_and_errors() {
        let stats = StatsCollector::new();
        stats.record(&sealed("/items", 200, &[("SELECT 1", 100), ("SELECT 2", 300)]));
        stats.record(&sealed("/items", 200, &[("SELECT 3", 50)]));
        stats.record(&sealed("/boom", 500, &[]));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.total_queries, 3);
        assert_eq!(snap.server_errors, 1);
        assert_eq!(snap.queries.count, 3);
        assert_eq!(snap.requests.count, 3);

        assert_eq!(snap.endpoints[0].endpoint, "GET /items");
        assert_eq!(snap.endpoints[0].requests, 2);
        assert_eq!(snap.endpoints[0].queries, 3);
        assert_eq!(snap.endpoints[0].mean_queries, 1.5);
    }

    #[test]
    fn slowest_queries_are_sorted_and_capped() {
        let stats = StatsCollector::new();
        for i in 0..(MAX_SLOW_QUERIES as u64 + 5) {
            stats.record(&sealed("/q", 200, &[("SELECT", (i + 1) * 10)]));
        }
        let slowest = stats.snapshot().slowest_queries;
        assert_eq!(slowest.len(), MAX_SLOW_QUERIES);
        assert_eq!(slowest[0].duration_us, 150);
        assert!(slowest.windows(2).all(|w| w[0].duration_us >= w[1].duration_us));
    }

    #[test]
    fn cancelled_requests_are_counted() {
        let stats = StatsCollector::new();
        let handle = ProfileHandle::new("GET", "/gone", None);
        handle.activate();
        stats.record(&handle.seal(None, Outcome::Cancelled).unwrap());
        assert_eq!(stats.snapshot().cancelled, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let stats = StatsCollector::new();
        stats.record(&sealed("/a", 200, &[("SELECT 1", 10)]));
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert!(snap.endpoints.is_empty());
        assert!(snap.timeline.is_empty());
        assert!(snap.distribution.is_empty());
    }

    #[test]
    fn distribution_covers_every_request() {
        let stats = StatsCollector::new();
        for _ in 0..4 {
            stats.record(&sealed("/d", 200, &[]));
        }
        let snap = stats.snapshot();
        let total: u64 = snap.distribution.iter().map(|b| b.count).sum();
        assert_eq!(total, 4);
        assert_eq!(snap.timeline.iter().map(|p| p.requests).sum::<u64>(), 4);
    }
}

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context;
use crate::profile::{Outcome, ProfileHandle, ProfileRecord};
use crate::profiler::Profiler;

/// Profiles every request that is not excluded:
///
///   1. creates a record and installs it as the current profile
///   2. runs the rest of the stack inside that context
///   3. seals the record with the response status and stores it
///
/// Adds two response headers:
///
///   X-Request-Id   : id of the stored profile
///   Server-Timing  : total and database time (when enabled)
///
/// Install with `axum::middleware::from_fn_with_state(profiler, profile_requests)`.
pub async fn profile_requests(
    State(profiler): State<Arc<Profiler>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if profiler.is_excluded(&path) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned());

    let handle = profiler.begin(method.as_str(), &path, route);
    let guard = SealGuard::new(profiler.clone(), handle.clone());

    let mut response = context::scope(handle, next.run(req)).await;

    let status = response.status().as_u16();
    let Some(record) = guard.complete(status) else {
        return response;
    };

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = HeaderValue::from_str(&record.id.to_string()) {
        response.headers_mut().insert("X-Request-Id", val);
    }
    if profiler.config().server_timing {
        if let Ok(val) = HeaderValue::from_str(&server_timing(&record)) {
            response.headers_mut().insert("Server-Timing", val);
        }
    }

    info!(
        status,
        method = %method,
        path = %path,
        duration_us = record.duration.map_or(0, |d| d.as_micros() as u64),
        queries = record.queries.len(),
        "request profiled"
    );

    response
}

fn server_timing(record: &ProfileRecord) -> String {
    let total_ms = record.duration.map_or(0.0, |d| d.as_secs_f64() * 1000.0);
    let db_ms = record.db_time().as_secs_f64() * 1000.0;
    format!(
        "total;dur={total_ms:.3}, db;dur={db_ms:.3};desc=\"{} queries\"",
        record.queries.len()
    )
}

// ─── Seal-on-every-exit guard ────────────────────────────────────

/// Seals the record even when the request future is dropped mid-flight
/// (client gone, timeout) or the handler panics. Such records are stored
/// with no status and `Outcome::Cancelled`.
struct SealGuard {
    profiler: Arc<Profiler>,
    handle: ProfileHandle,
    armed: bool,
}

impl SealGuard {
    fn new(profiler: Arc<Profiler>, handle: ProfileHandle) -> Self {
        Self {
            profiler,
            handle,
            armed: true,
        }
    }

    fn complete(mut self, status: u16) -> Option<Arc<ProfileRecord>> {
        self.armed = false;
        self.profiler
            .finish(&self.handle, Some(status), Outcome::Completed)
    }
}

impl Drop for SealGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(record) = self.profiler.finish(&self.handle, None, Outcome::Cancelled) {
            warn!(
                method = %record.method,
                path = %record.path,
                queries = record.queries.len(),
                "request cancelled before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::sample_query;

    #[test]
    fn server_timing_reports_total_and_db() {
        let handle = ProfileHandle::new("GET", "/", None);
        handle.activate();
        handle.add_query(sample_query("SELECT 1"));
        handle.add_query(sample_query("SELECT 2"));
        let record = handle.seal(Some(200), Outcome::Completed).unwrap();

        let header = server_timing(&record);
        assert!(header.starts_with("total;dur="));
        assert!(header.contains("db;dur=0.500"));
        assert!(header.ends_with("desc=\"2 queries\""));
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tower_http::services::ServeDir;
use uuid::Uuid;

use super::collector::StatsSnapshot;
use crate::profile::ProfileRecord;
use crate::profiler::Profiler;

const DEFAULT_PROFILE_LIMIT: usize = 100;

/// Dashboard API, nested under the configured dashboard path.
pub fn router(profiler: Arc<Profiler>) -> Router {
    let mut api = Router::new()
        .route("/api/profiles", get(list_profiles))
        .route("/api/profiles/:id", get(get_profile))
        .route("/api/stats", get(get_stats))
        .route("/api/stream", get(stats_stream))
        .route("/api/reset", post(reset));

    if let Some(dir) = profiler.config().dashboard_assets.clone() {
        api = api.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let prefix = profiler.config().dashboard_path.clone();
    Router::new().nest(&prefix, api.with_state(profiler))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

// ─── GET {dash}/api/profiles ─────────────────────────────────────
/// Newest sealed profiles first.

async fn list_profiles(
    State(profiler): State<Arc<Profiler>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<ProfileRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_PROFILE_LIMIT);
    let records = profiler.history().recent(limit);
    Json(records.iter().map(|r| r.as_ref().clone()).collect())
}

// ─── GET {dash}/api/profiles/:id ─────────────────────────────────

async fn get_profile(
    State(profiler): State<Arc<Profiler>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProfileRecord>, StatusCode> {
    profiler
        .history()
        .get(id)
        .map(|r| Json(r.as_ref().clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

// ─── GET {dash}/api/stats ────────────────────────────────────────

async fn get_stats(State(profiler): State<Arc<Profiler>>) -> Json<StatsSnapshot> {
    Json(profiler.stats().snapshot())
}

// ─── GET {dash}/api/stream ───────────────────────────────────────
/// Server-Sent Events: one `StatsSnapshot` per second.

async fn stats_stream(
    State(profiler): State<Arc<Profiler>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_secs(1));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = profiler.stats().snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().event("stats").data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── POST {dash}/api/reset ───────────────────────────────────────

async fn reset(State(profiler): State<Arc<Profiler>>) -> StatusCode {
    profiler.reset();
    StatusCode::NO_CONTENT
}

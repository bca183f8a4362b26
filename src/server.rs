use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{items, sessions};
use crate::middleware::profiling;
use crate::AppState;

/// Builds the demo `Router`: application routes, the profiler dashboard API,
/// and the profiling middleware wrapped around both.
pub fn create_router(state: Arc<AppState>) -> Router {
    let profiler = state.profiler.clone();

    Router::new()
        // ── Item endpoints (SQLite) ─────────────────────────────
        .route("/", get(items::root))
        .route("/items", get(items::list_items).post(items::create_item))
        .route("/items/:id", get(items::get_item))
        .route("/raw-query", get(items::raw_query))
        // ── Session endpoints (Redis) ───────────────────────────
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:id", get(sessions::get_session))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Profiler dashboard API ──────────────────────────────
        .merge(profiler.dashboard())
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            profiler,
            profiling::profile_requests,
        ))
        .layer(CorsLayer::permissive())
}

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use query_profiler::engine::SqliteEngine;
use query_profiler::{load_generator, mock_data, server};
use query_profiler::{AppState, AsyncEngine, Profiler, ProfilerConfig};

async fn demo() -> (Arc<Profiler>, Router) {
    let profiler = Arc::new(Profiler::new(ProfilerConfig::default()).unwrap());
    let raw = AsyncEngine::from_engine(SqliteEngine::open_in_memory().unwrap());
    let db = profiler.instrument_async(&raw);
    mock_data::seed(&db).await.unwrap();

    let state = Arc::new(AppState {
        db,
        sessions: None,
        profiler: profiler.clone(),
    });
    (profiler, server::create_router(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> StatusCode {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn seeding_happens_outside_any_profile() {
    let (profiler, _app) = demo().await;
    assert!(profiler.history().is_empty());
    assert_eq!(profiler.stats().snapshot().total_queries, 0);
}

#[tokio::test]
async fn endpoints_record_their_statements() {
    let (profiler, app) = demo().await;

    assert_eq!(send(&app, Method::GET, "/items/3", None).await, StatusCode::OK);
    assert_eq!(send(&app, Method::GET, "/items/999", None).await, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/raw-query", None).await, StatusCode::OK);
    assert_eq!(
        send(
            &app,
            Method::POST,
            "/items",
            Some(serde_json::json!({ "name": "Desk Lamp" }))
        )
        .await,
        StatusCode::CREATED
    );

    let records = profiler.history().all();
    assert_eq!(records.len(), 4);

    assert_eq!(records[0].route.as_deref(), Some("/items/:id"));
    assert_eq!(records[0].queries.len(), 1);
    assert_eq!(records[0].queries[0].params, ["3"]);

    assert_eq!(records[1].status, Some(404));
    assert_eq!(records[1].queries.len(), 1);

    assert_eq!(records[2].endpoint(), "GET /raw-query");
    assert_eq!(records[2].queries.len(), 2);
    assert!(records[2].queries[0].statement.starts_with("SELECT COUNT(*)"));

    assert_eq!(records[3].status, Some(201));
    assert_eq!(records[3].queries[0].rows, Some(1));
    assert_eq!(records[3].queries[0].params[0], "'Desk Lamp'");
}

#[tokio::test]
async fn sessions_without_redis_are_unavailable() {
    let (profiler, app) = demo().await;

    let status = send(&app, Method::GET, "/api/sessions/abc", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let record = &profiler.history().all()[0];
    assert_eq!(record.status, Some(503));
    assert!(record.queries.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn synthetic_traffic_is_fully_profiled() {
    let (profiler, app) = demo().await;

    let summary = load_generator::run(app, 40, 4, Duration::ZERO).await;
    assert_eq!(summary.sent, 40);
    assert_eq!(summary.server_errors, 0);

    let records = profiler.history().all();
    assert_eq!(records.len(), 40);
    for record in &records {
        let expected = if record.path == "/raw-query" { 2 } else { 1 };
        assert_eq!(record.queries.len(), expected, "{}", record.endpoint());
    }

    let stats = profiler.stats().snapshot();
    assert_eq!(stats.total_requests, 40);
    assert_eq!(
        stats.total_queries,
        records.iter().map(|r| r.queries.len() as u64).sum::<u64>()
    );
}

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Tally of one traffic run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSummary {
    pub sent: u32,
    pub ok: u32,
    pub client_errors: u32,
    pub server_errors: u32,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that push `total` requests through
/// `app` in-process, spread across the demo endpoints.
pub async fn run(app: Router, total: u32, concurrency: u32, pause: Duration) -> TrafficSummary {
    let remaining = Arc::new(AtomicU32::new(total));
    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency.max(1) {
        let app = app.clone();
        let remaining = remaining.clone();
        handles.push(tokio::spawn(async move {
            worker(worker_id, app, remaining, pause).await
        }));
    }

    let mut summary = TrafficSummary::default();
    for h in handles {
        match h.await {
            Ok(part) => {
                summary.sent += part.sent;
                summary.ok += part.ok;
                summary.client_errors += part.client_errors;
                summary.server_errors += part.server_errors;
            }
            Err(err) => warn!(error = %err, "traffic worker failed"),
        }
    }

    info!(
        sent = summary.sent,
        ok = summary.ok,
        client_errors = summary.client_errors,
        server_errors = summary.server_errors,
        "synthetic traffic finished"
    );
    summary
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    app: Router,
    remaining: Arc<AtomicU32>,
    pause: Duration,
) -> TrafficSummary {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut summary = TrafficSummary::default();

    while claim(&remaining) {
        let request = random_request(&mut rng);
        let label = format!("{} {}", request.method(), request.uri());

        match app.clone().oneshot(request).await {
            Ok(response) => {
                let status = response.status();
                debug!(worker = id, request = %label, status = status.as_u16(), "sent");
                summary.sent += 1;
                if status.is_success() {
                    summary.ok += 1;
                } else if status.is_client_error() {
                    summary.client_errors += 1;
                } else {
                    summary.server_errors += 1;
                }
            }
            Err(never) => match never {},
        }

        if !pause.is_zero() {
            let jitter = rng.gen_range(0..=pause.as_millis() as u64);
            tokio::time::sleep(pause + Duration::from_millis(jitter)).await;
        }
    }

    summary
}

/// Take one request off the shared budget; false once it is spent.
fn claim(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

fn random_request(rng: &mut StdRng) -> Request<Body> {
    let (method, uri, body) = match rng.gen_range(0u8..4) {
        0 => (Method::GET, "/items".to_owned(), Body::empty()),
        1 => {
            // ids past the seeded range exercise the 404 path
            let id = rng.gen_range(1..=25u32);
            (Method::GET, format!("/items/{id}"), Body::empty())
        }
        2 => {
            let json = serde_json::json!({
                "name": format!("Generated Item {}", rng.gen_range(1000..10_000u32)),
                "description": "created by the traffic generator",
            });
            (Method::POST, "/items".to_owned(), Body::from(json.to_string()))
        }
        _ => (Method::GET, "/raw-query".to_owned(), Body::empty()),
    };

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap_or_else(|_| Request::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_shared_exactly() {
        let remaining = AtomicU32::new(3);
        assert!(claim(&remaining));
        assert!(claim(&remaining));
        assert!(claim(&remaining));
        assert!(!claim(&remaining));
        assert_eq!(remaining.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn requests_target_demo_routes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let req = random_request(&mut rng);
            let path = req.uri().path().to_owned();
            assert!(
                path == "/items" || path.starts_with("/items/") || path == "/raw-query",
                "unexpected path {path}"
            );
        }
    }
}

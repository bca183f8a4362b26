use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use query_profiler::config::DemoArgs;
use query_profiler::engine::{AsyncEngine, RedisEngine, SqliteEngine};
use query_profiler::{load_generator, mock_data, server, AppState, Profiler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing_subscriber();
    let args = DemoArgs::parse();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  REQUEST / QUERY PROFILER DEMO              ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Profiler ──────────────────────────────────────────────
    let profiler = Arc::new(
        Profiler::new(args.profiler_config()).context("invalid profiler configuration")?,
    );

    // ── 2. Open & instrument engines ─────────────────────────────
    let sqlite = SqliteEngine::open(&args.database)
        .with_context(|| format!("cannot open sqlite database {:?}", args.database))?;
    let db = profiler.instrument_async(&AsyncEngine::from_engine(sqlite));

    let sessions = match &args.redis_url {
        Some(url) => {
            let redis = RedisEngine::connect(url)
                .with_context(|| format!("cannot connect to redis at {url}"))?;
            Some(profiler.instrument_async(&AsyncEngine::from_engine(redis)))
        }
        None => None,
    };

    // ── 3. Seed sample data (outside any request) ────────────────
    mock_data::seed(&db).await.context("seeding sample data")?;

    // ── 4. Build router ──────────────────────────────────────────
    let state = Arc::new(AppState {
        db,
        sessions,
        profiler: profiler.clone(),
    });
    let app = server::create_router(state);

    // ── 5. Optional synthetic traffic ────────────────────────────
    if args.demo_requests > 0 {
        let traffic = app.clone();
        let (total, concurrency) = (args.demo_requests, args.concurrency);
        tokio::spawn(async move {
            load_generator::run(traffic, total, concurrency, Duration::from_millis(100)).await;
        });
    }

    // ── 6. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    let dash = &profiler.config().dashboard_path;
    println!("Server listening on http://{}", args.bind);
    println!("Profiles JSON   → http://{}{dash}/api/profiles", args.bind);
    println!("Stats JSON      → http://{}{dash}/api/stats", args.bind);
    println!("Stats SSE       → http://{}{dash}/api/stream", args.bind);
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}

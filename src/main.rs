//! JudgeHub - Application Entry Point
//!
//! Starts the heartbeat/health HTTP server, the dispatch workers and the
//! reconciler, all sharing one Postgres pool and one Redis connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use futures::future::join_all;
use redis::Client as RedisClient;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use judgehub::{
    config::{Config, ServerConfig},
    db, handlers,
    judge::{DispatchWorker, Dispatcher, HttpSandboxClient, Reconciler, RedisQueue, ServerLock},
    middleware::logging_middleware,
    state::AppState,
    store::PgStore,
};

/// How long workers get to finish their current submission after shutdown
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.server);

    tracing::info!("Starting JudgeHub controller...");

    // Initialize database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database).await?;
    db::test_connection(&db_pool).await?;

    // Run database migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&db_pool).await?;

    // Initialize Redis connection
    tracing::info!("Connecting to Redis...");
    let redis_client = RedisClient::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    let lock = ServerLock::new(
        redis_conn.clone(),
        config.judge.server_lock_ttl,
        config.judge.server_lock_wait,
    );
    let store = Arc::new(PgStore::new(db_pool, lock, &config.judge));
    let queue = Arc::new(RedisQueue::new(redis_conn));
    let sandbox = Arc::new(HttpSandboxClient::new(
        config.judge.token_hash(),
        config.judge.compile_timeout,
        config.judge.ping_timeout,
    )?);

    let shutdown = Arc::new(AtomicBool::new(false));

    // Recount slots before the first dispatch
    let reconciler = Reconciler::new(
        store.clone(),
        store.clone(),
        queue.clone(),
        sandbox.clone(),
        config.judge.clone(),
        config.dispatch.clone(),
    );
    reconciler.startup().await?;
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let dispatcher = Dispatcher::new(store.clone(), store.clone(), sandbox, config.judge.clone());
    let worker_handles: Vec<_> = (0..config.dispatch.workers)
        .map(|id| {
            let worker = DispatchWorker::new(
                id,
                dispatcher.clone(),
                queue.clone(),
                config.dispatch.clone(),
                shutdown.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect();
    tracing::info!("Started {} dispatch workers", worker_handles.len());

    // Create application state
    let state = AppState::new(store, config.judge.clone());

    // Build the router
    let app = Router::new()
        .nest("/api", handlers::routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start the server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    tracing::info!("Waiting for dispatch workers to drain...");
    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, join_all(worker_handles))
        .await
        .is_err()
    {
        tracing::warn!("Dispatch workers did not stop in time; the reconciler will requeue their submissions");
    }
    reconciler_handle.abort();

    tracing::info!("JudgeHub controller stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| server.rust_log.clone().into());
    let registry = tracing_subscriber::registry().with(filter);

    if server.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve on Ctrl-C or SIGTERM and raise the shared shutdown flag
async fn shutdown_signal(shutdown: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.store(true, Ordering::SeqCst);
}

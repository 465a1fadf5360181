//! Swap Engine Binary
//!
//! Starts the order-execution engine: worker pool, status hub, and the
//! HTTP/WebSocket server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin swap-engine
//! ```
//!
//! # Environment Variables
//!
//! - `SWAP_ENGINE_PORT` / `SWAP_ENGINE_HOST`: listen address
//! - `SWAP_ENGINE_QUEUE_CONCURRENCY`: parallel jobs (default: 10)
//! - `SWAP_ENGINE_VENUE_IMPLEMENTATION`: `mock` | `real`
//! - `SWAP_ENGINE_VENUE_RPC_URL` / `SWAP_ENGINE_VENUE_SIGNING_KEY`:
//!   required when the implementation is `real`
//! - `RUST_LOG`: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio_util::sync::CancellationToken;

use swap_engine::config::{EngineConfig, VenueImplementation};
use swap_engine::error::CriticalErrorBus;
use swap_engine::executor::SwapExecutor;
use swap_engine::models::Venue;
use swap_engine::pipeline::{PipelineWorker, WorkerPool};
use swap_engine::queue::WorkQueue;
use swap_engine::router::QuoteRouter;
use swap_engine::server::{AppState, create_router};
use swap_engine::store::{InMemoryOrderStore, OrderCache, OrderStore};
use swap_engine::stream::StatusStreamHub;
use swap_engine::venue::{HttpVenueAdapter, VenueAdapter, VenueRegistry};
use swap_engine::{metrics, telemetry};

/// Grace period for active jobs during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();
    let _metrics_handle = metrics::init_metrics();

    tracing::info!("starting swap engine");

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let registry = build_registry(&config)?;
    check_venue_health(&registry).await;

    let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let cache = Arc::new(OrderCache::new(config.cache.ttl));
    let queue = Arc::new(WorkQueue::new(config.queue.retry_policy()));
    let hub = Arc::new(StatusStreamHub::new());
    let critical = CriticalErrorBus::new();

    spawn_critical_error_logger(&critical);

    let worker = Arc::new(PipelineWorker::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&queue),
        QuoteRouter::new(registry.clone(), config.router.quote_timeout),
        SwapExecutor::new(registry.clone(), config.executor.clone()),
        Arc::clone(&hub),
        critical.clone(),
        config.queue.retry_policy(),
    ));
    let pool = WorkerPool::new(worker, config.queue.concurrency);
    let worker_handles = pool.spawn(shutdown_token.clone());

    let state = Arc::new(AppState {
        store,
        cache,
        queue: Arc::clone(&queue),
        hub: Arc::clone(&hub),
        executor_settings: config.executor.clone(),
        registry,
        started_at: Instant::now(),
    });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    let server_shutdown = shutdown_token.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server error");
        }
        tracing::info!("server stopped");
    });

    tracing::info!("swap engine ready");

    await_signal().await;

    // Graceful shutdown: stop taking jobs, give active orders a grace
    // period, then tear everything down.
    queue.pause();
    let drained = wait_for_active_jobs(&queue, SHUTDOWN_TIMEOUT).await;
    if !drained {
        tracing::warn!(
            active = queue.active_count(),
            "shutdown grace period elapsed with active jobs"
        );
    }

    shutdown_token.cancel();
    hub.close_all();

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = server.await;

    tracing::info!("swap engine stopped");
    Ok(())
}

/// Build the venue registry per the configured implementation.
fn build_registry(config: &EngineConfig) -> Result<VenueRegistry, Box<dyn std::error::Error>> {
    match config.venue.implementation {
        VenueImplementation::Mock => {
            tracing::info!("using mock venue adapters");
            Ok(VenueRegistry::mock(&config.breaker))
        }
        VenueImplementation::Real => {
            let rpc_url = config.venue.rpc_url.as_deref().unwrap_or_default();
            let signing_key = config.venue.signing_key.as_deref().unwrap_or_default();

            let adapters: Vec<Arc<dyn VenueAdapter>> = vec![
                Arc::new(HttpVenueAdapter::new(Venue::Orca, rpc_url, signing_key)?),
                Arc::new(HttpVenueAdapter::new(Venue::Raydium, rpc_url, signing_key)?),
            ];
            tracing::info!(rpc_url, "using HTTP venue adapters");
            Ok(VenueRegistry::new(adapters, &config.breaker))
        }
    }
}

/// Log-only startup probe of each venue.
async fn check_venue_health(registry: &VenueRegistry) {
    for venue in registry.all() {
        match venue.health_check().await {
            Ok(()) => tracing::info!(venue = %venue.venue(), "venue healthy"),
            Err(e) => tracing::warn!(venue = %venue.venue(), error = %e, "venue health check failed"),
        }
    }
}

/// Surface critical errors in the operator log.
fn spawn_critical_error_logger(critical: &CriticalErrorBus) {
    let mut rx = critical.subscribe();
    tokio::spawn(async move {
        while let Ok(err) = rx.recv().await {
            tracing::error!(
                kind = %err.kind(),
                context = ?err.context(),
                "critical: {}",
                err.message()
            );
        }
    });
}

/// Wait until the queue has no active jobs, bounded by `timeout`.
async fn wait_for_active_jobs(queue: &WorkQueue, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if queue.active_count() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    queue.active_count() == 0
}

fn log_config(config: &EngineConfig) {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        env = config.server.env.as_str(),
        concurrency = config.queue.concurrency,
        max_retries = config.queue.max_retries,
        quote_timeout_ms = config.router.quote_timeout.as_millis() as u64,
        default_slippage = %config.executor.default_slippage,
        max_slippage = %config.executor.max_slippage,
        cache_ttl_secs = config.cache.ttl.as_secs(),
        "configuration loaded"
    );
}

/// Load .env from the working directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}

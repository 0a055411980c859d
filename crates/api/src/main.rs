//! BiPE capture agent entrypoint.
//!
//! Process start is treated as the boot trigger: recovery runs immediately and the
//! boot and periodic health jobs are scheduled before the control API starts.

use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bipe_common::config::AppConfig;
use bipe_common::redis_pool::create_redis_pool;
use bipe_common::store::{KvStore, RedisStore};
use bipe_resilience::capture::ProcessCaptureService;
use bipe_resilience::delivery::HttpDelivery;
use bipe_resilience::flusher::RetryQueueFlusher;
use bipe_resilience::reconnect::ReconnectOrchestrator;
use bipe_resilience::triggers::HealthTriggers;
use bipe_scheduler::{JobScheduler, TcpProbe};

use bipe_api::routes::create_router;
use bipe_api::state::AppState;

/// Upper bound for one connectivity probe before a constrained job fires.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("BiPE agent starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Durable store
    let redis = create_redis_pool(&config.redis_url).await?;
    let store: Arc<dyn KvStore> =
        Arc::new(RedisStore::new(redis, config.store_key_prefix.clone()));

    // Health cycle components
    let capture = Arc::new(ProcessCaptureService::from_config(&config));
    let orchestrator = Arc::new(ReconnectOrchestrator::from_config(capture, &config));
    let delivery = Arc::new(HttpDelivery::from_config(&config)?);
    let flusher = Arc::new(RetryQueueFlusher::from_config(
        store.clone(),
        delivery,
        &config,
    ));

    let probe = Arc::new(TcpProbe::new(
        config.connectivity_probe_addr.clone(),
        PROBE_TIMEOUT,
    ));
    let scheduler = JobScheduler::new(probe);
    let triggers = HealthTriggers::new(orchestrator, flusher, scheduler.clone())
        .with_interval(config.health_interval());

    triggers.on_boot().await;

    // Control API
    let app = create_router(AppState::new(triggers, store)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr).await?;
    tracing::info!(addr = %config.api_bind_addr, "Control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    scheduler.shutdown().await;
    tracing::info!("BiPE agent stopped.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("bipe_api=info,bipe_resilience=info,bipe_scheduler=info,tower_http=info")
    });

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

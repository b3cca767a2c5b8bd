//! campaign-relay binary: dispatch engine and real-time hub in one process.

use std::error::Error;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use campaign_relay::adapters::auth::JwtSessionValidator;
use campaign_relay::adapters::events::{BusEventPublisher, RedisPubSub};
use campaign_relay::adapters::messaging::CloudApiClientFactory;
use campaign_relay::adapters::postgres::{connect_pool, PostgresCampaignStore};
use campaign_relay::adapters::rate_limiter::TokenBucketFactory;
use campaign_relay::adapters::websocket::{
    websocket_router, ConnectionRegistry, ConnectionSettings, WebSocketHub, WebSocketState,
};
use campaign_relay::application::dispatch::{
    ActiveCampaignRegistry, CampaignScanner, CampaignWorker, ScannerConfig, WorkerConfig,
};
use campaign_relay::config::AppConfig;
use campaign_relay::ports::PubSub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        batch_size = config.dispatch.batch_size,
        "Starting campaign-relay"
    );

    let pool = connect_pool(&config.database)?;
    let store = Arc::new(PostgresCampaignStore::new(pool));

    let bus: Arc<dyn PubSub> = Arc::new(RedisPubSub::open(&config.redis.url)?);
    let publisher = Arc::new(BusEventPublisher::with_channel(
        bus.clone(),
        config.redis.events_channel.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Dispatch engine
    let worker_config = WorkerConfig::default()
        .with_batch_size(config.dispatch.batch_size)
        .with_max_attempts(config.dispatch.max_attempts)
        .with_retry_backoff(config.dispatch.retry_backoff());
    let worker = CampaignWorker::new(store.clone(), publisher.clone(), worker_config);
    let scanner = Arc::new(CampaignScanner::new(
        store,
        Arc::new(ActiveCampaignRegistry::new()),
        Arc::new(CloudApiClientFactory::new(&config.messaging)?),
        Arc::new(TokenBucketFactory::new(config.dispatch.default_rate_limit())),
        publisher,
        worker,
        ScannerConfig {
            scan_interval: config.dispatch.scan_interval(),
            stop_grace: config.dispatch.stop_grace(),
            max_consecutive_failures: config.dispatch.max_worker_failures,
        },
    ));
    let scanner_task = tokio::spawn({
        let scanner = scanner.clone();
        let shutdown = shutdown_rx.clone();
        async move { scanner.run(shutdown).await }
    });

    // Real-time layer
    let connections = Arc::new(ConnectionRegistry::new(config.realtime.outbound_buffer));
    let hub = Arc::new(
        WebSocketHub::new(bus, connections.clone())
            .with_channel(config.redis.events_channel.clone())
            .with_backoff(config.realtime.resubscribe_backoff()),
    );
    let hub_task = tokio::spawn({
        let hub = hub.clone();
        let shutdown = shutdown_rx.clone();
        async move { hub.run(shutdown).await }
    });

    let state = WebSocketState::new(Arc::new(JwtSessionValidator::new(&config.auth)), connections)
        .with_settings(ConnectionSettings::new(
            config.realtime.write_timeout(),
            config.realtime.idle_timeout(),
        ));
    let app = websocket_router()
        .with_state(state)
        .layer(cors_layer(&config.server.cors_origins_list()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening for WebSocket connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scanner_task.await {
        tracing::error!(error = %e, "Scanner task ended abnormally");
    }
    if let Err(e) = hub_task.await {
        tracing::error!(error = %e, "Hub task ended abnormally");
    }

    tracing::info!("campaign-relay stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
}

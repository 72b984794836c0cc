use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod advisory;
mod aqi;
mod botsailor;
mod config;
mod error;
mod geo;
mod response;
mod routes;
mod stations;
mod subscribers;
mod tasks;

use aqi::{cache::ReadingCache, epa::EpaClient, fallback::FallbackTable, gateway::AqiGateway, mock::MockAqiSource, AqiSource};
use botsailor::BotSailorClient;
use config::{Config, StationSource};
use routes::{create_router, AppState};
use stations::StationDirectory;
use subscribers::SubscriberStore;

async fn load_directory(config: &Config, epa: &EpaClient) -> StationDirectory {
    if config.station_source == StationSource::Static || config.use_mock_upstream {
        return StationDirectory::builtin();
    }

    let loaded = match epa.fetch_coordinates().await {
        Ok(payload) => StationDirectory::from_coordinates_payload(&payload).map_err(anyhow::Error::from),
        Err(e) => Err(anyhow::Error::from(e)),
    };
    match loaded {
        Ok(directory) => {
            tracing::info!("Loaded {} stations from the EPA coordinates endpoint", directory.len());
            directory
        }
        Err(e) => {
            tracing::warn!("Could not load remote station list, using built-in list: {:#}", e);
            StationDirectory::builtin()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aqi_webhook=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let epa = EpaClient::new(&config)?;
    if !epa.has_api_key() && !config.use_mock_upstream {
        tracing::warn!("EPA_API_KEY is not set; upstream requests may be rejected");
    }

    let directory = Arc::new(load_directory(&config, &epa).await);
    anyhow::ensure!(!directory.is_empty(), "Station directory is empty");

    let source: Arc<dyn AqiSource> = if config.use_mock_upstream {
        tracing::warn!("Using synthetic AQI readings instead of the EPA API");
        Arc::new(MockAqiSource::synthetic(&directory))
    } else {
        Arc::new(epa)
    };

    let fallback = FallbackTable::builtin();
    let unmatched = fallback
        .readings()
        .keys()
        .filter(|station| directory.find(station).is_none())
        .count();
    if unmatched > 0 {
        tracing::warn!("{} fallback readings name stations missing from the directory", unmatched);
    }

    let cache = Arc::new(ReadingCache::new(config.cache_ttl()));
    let gateway = Arc::new(AqiGateway::new(
        source,
        cache,
        fallback,
        config.upstream_timeout(),
    ));
    let subscribers = SubscriberStore::new(Duration::from_secs(config.subscriber_ttl_secs));
    let conversations = Arc::new(BotSailorClient::new(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = tasks::spawn_refresh_loop(
        gateway.clone(),
        Duration::from_secs(config.refresh_interval_secs),
        shutdown_rx.clone(),
    );
    let cleanup = tasks::spawn_cleanup_loop(
        subscribers.clone(),
        Duration::from_secs(config.cleanup_interval_secs),
        shutdown_rx,
    );

    let addr = format!("{}:{}", config.bind_address, config.port);
    let config = Arc::new(config);

    // Create application state
    let state = AppState {
        timezone: config.timezone(),
        config,
        stations: directory,
        gateway,
        subscribers,
        conversations,
        started_at: Utc::now(),
    };

    let app: Router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server starting on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Background tasks had already stopped");
    }
    let (refresh, cleanup) = tokio::join!(refresh, cleanup);
    for (name, result) in [("refresh", refresh), ("cleanup", cleanup)] {
        if let Err(e) = result {
            tracing::error!("Background {} task ended abnormally: {}", name, e);
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}

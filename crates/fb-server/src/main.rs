//! fb-server: Main binary for the football stats cache service.
//!
//! This binary wires together all crates and starts the HTTP server.

use anyhow::Context;
use fb_api::{create_router, AppState};
use fb_indexer::{Coordinator, CoordinatorConfig, Indexer, IndexerConfig};
use fb_ingestion::{ProviderClient, ProviderConfig};
use fb_store::{EntityStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default port for the server.
const DEFAULT_PORT: u16 = 3000;

/// Default host for the server.
const DEFAULT_HOST: &str = "0.0.0.0";

/// How long startup waits for each primed league.
const PRIME_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fb_server=info,fb_api=info,fb_indexer=info,fb_ingestion=info,fb_store=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let provider_config = ProviderConfig::from_env().context("provider configuration")?;
    let store_config = StoreConfig::from_env().context("store configuration")?;

    tracing::info!(
        "Starting fb-server on {}:{} (provider: {}, limit: {}/{:?}, capacity: {}, metric: {})",
        host,
        port,
        provider_config.base_url,
        provider_config.rate_limit,
        provider_config.rate_window,
        store_config.capacity,
        store_config.metric
    );

    let store = Arc::new(EntityStore::open(store_config).context("opening entity store")?);
    let client = ProviderClient::from_config(&provider_config).context("building provider client")?;
    let coordinator =
        Coordinator::new(client, store).with_config(CoordinatorConfig::from_env());
    let indexer = Indexer::new(coordinator.clone(), IndexerConfig::from_env());

    // Comma-separated competition codes refreshed in the background at startup
    let prime: Vec<String> = std::env::var("FB_PRIME_LEAGUES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect();
    if !prime.is_empty() {
        tokio::spawn(async move {
            for league in prime {
                match coordinator.refresh_league(&league, PRIME_TIMEOUT).await {
                    Ok(refresh) => tracing::info!(
                        "Primed {}: {}/{} teams",
                        league,
                        refresh.succeeded(),
                        refresh.teams.len()
                    ),
                    Err(e) => tracing::warn!("Failed to prime {}: {}", league, e),
                }
            }
        });
    }

    let state = Arc::new(AppState::new(indexer));
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     - Health check");
    tracing::info!("  GET  /v1/entities/:kind/:id      - Resolve one entity");
    tracing::info!("  GET  /v1/search, POST /v1/search - Similarity search");
    tracing::info!("  POST /v1/leagues/:id/refresh     - Refresh a league and its teams");
    tracing::info!("  GET  /v1/leagues/:id/standings   - League table");
    tracing::info!("  GET  /v1/leagues/:id/compare     - Compare teams in a table");
    tracing::info!("  GET  /v1/teams/:id/performance   - Team performance");
    tracing::info!("  GET  /v1/teams/:id/similar       - Comparable teams");
    tracing::info!("  GET  /v1/matches/:id/summary     - Match summary");
    tracing::info!("  GET  /v1/cache/stats             - Cache monitor");

    axum::serve(listener, app).await?;

    Ok(())
}

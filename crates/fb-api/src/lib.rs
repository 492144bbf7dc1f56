//! fb-api: HTTP API layer for the football stats cache
//!
//! This crate defines the REST API endpoints:
//! - GET /health
//! - GET /v1/entities/:kind/:id
//! - GET /v1/search, POST /v1/search
//! - POST /v1/leagues/:id/refresh
//! - GET /v1/leagues/:id/standings
//! - GET /v1/leagues/:id/compare
//! - GET /v1/teams/:id/performance
//! - GET /v1/teams/:id/similar
//! - GET /v1/matches/:id/summary
//! - GET /v1/cache/stats
//!
//! Read endpoints accept `max_age_secs`, `timeout_ms` and `allow_stale`
//! query parameters on top of the indexer's defaults.

mod error;
mod handlers;
mod state;
pub mod types;

pub use error::ApiError;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use fb_ingestion::{DataSource, RateBudget};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the router over shared state.
pub fn create_router<S, B>(state: Arc<AppState<S, B>>) -> Router
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::<S, B>))
        .route("/v1/entities/:kind/:id", get(handlers::get_entity::<S, B>))
        .route(
            "/v1/search",
            get(handlers::search_by_key::<S, B>).post(handlers::search_by_vector::<S, B>),
        )
        .route(
            "/v1/leagues/:id/refresh",
            post(handlers::refresh_league::<S, B>),
        )
        .route(
            "/v1/leagues/:id/standings",
            get(handlers::get_standings::<S, B>),
        )
        .route(
            "/v1/leagues/:id/compare",
            get(handlers::compare_teams::<S, B>),
        )
        .route(
            "/v1/teams/:id/performance",
            get(handlers::team_performance::<S, B>),
        )
        .route(
            "/v1/teams/:id/similar",
            get(handlers::comparable_teams::<S, B>),
        )
        .route(
            "/v1/matches/:id/summary",
            get(handlers::match_summary::<S, B>),
        )
        .route("/v1/cache/stats", get(handlers::cache_stats::<S, B>))
        .layer(cors)
        .with_state(state)
}

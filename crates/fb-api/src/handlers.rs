//! Route handlers for the API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use fb_indexer::{
    analysis::{ComparableTeams, LeagueTable, MatchSummary, TeamComparison, TeamPerformance},
    CacheStats, BIG_SIX,
};
use fb_ingestion::{DataSource, RateBudget};
use fb_types::{EntityKey, EntityKind};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{
    CompareQuery, EntityResponse, HealthResponse, LeagueRefreshResponse, ReadQuery, RefreshQuery,
    SearchQuery, SearchRequest, SearchResponse, SimilarQuery,
};

/// Default number of similarity hits.
const DEFAULT_K: usize = 5;

/// Maximum number of similarity hits.
const MAX_K: usize = 100;

/// Default wait for a league refresh, which also resolves every team.
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

fn clamp_k(k: Option<usize>) -> Result<usize, ApiError> {
    match k {
        Some(0) => Err(ApiError::BadRequest("k must be positive".to_string())),
        Some(k) => Ok(k.min(MAX_K)),
        None => Ok(DEFAULT_K),
    }
}

/// GET /health - Health check endpoint.
pub async fn health<S, B>(State(state): State<Arc<AppState<S, B>>>) -> Json<HealthResponse>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        records: state.indexer.coordinator().store().len(),
    })
}

/// GET /v1/entities/:kind/:id - Resolve one entity with freshness metadata.
pub async fn get_entity<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<EntityResponse>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let kind: EntityKind = kind
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("id is required".to_string()));
    }
    let key = EntityKey::new(kind, id.trim());

    let opts = query.apply(state.indexer.defaults());
    let resolved = state.indexer.read(&key, opts).await?;
    Ok(Json(resolved.into()))
}

/// GET /v1/search?key=team:66&k=5 - Entities similar to a stored one.
pub async fn search_by_key<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let key: EntityKey = query
        .key
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let k = clamp_k(query.k)?;

    let hits = state
        .indexer
        .coordinator()
        .similar_to(&key, k)
        .ok_or_else(|| ApiError::NotFound(format!("{} is not cached or has no embedding", key)))?;
    Ok(Json(hits.into()))
}

/// POST /v1/search - Entities nearest to a raw embedding.
pub async fn search_by_vector<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    if request.embedding.is_empty() {
        return Err(ApiError::BadRequest("embedding is empty".to_string()));
    }
    if request.embedding.iter().any(|x| !x.is_finite()) {
        return Err(ApiError::BadRequest("embedding has non-finite values".to_string()));
    }
    let k = clamp_k(request.k)?;

    let coordinator = state.indexer.coordinator();
    let hits = match request.kind {
        Some(kind) => coordinator.store().search_kind(&request.embedding, k, kind),
        None => coordinator.search(&request.embedding, k),
    };
    Ok(Json(hits.into()))
}

/// POST /v1/leagues/:id/refresh - Refetch standings and resolve every team.
pub async fn refresh_league<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<LeagueRefreshResponse>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let timeout = query
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_REFRESH_TIMEOUT);

    let refresh = state
        .indexer
        .coordinator()
        .refresh_league(&id, timeout)
        .await?;
    Ok(Json(refresh.into()))
}

/// GET /v1/leagues/:id/standings - Current league table.
pub async fn get_standings<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<LeagueTable>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let opts = query.apply(state.indexer.defaults());
    Ok(Json(state.indexer.league_table(&id, opts).await?))
}

/// GET /v1/leagues/:id/compare?teams=66,64 - Compare teams within a table.
pub async fn compare_teams<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(compare): Query<CompareQuery>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<TeamComparison>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let team_ids = compare
        .team_ids()
        .unwrap_or_else(|| BIG_SIX.iter().map(|id| id.to_string()).collect());
    let opts = query.apply(state.indexer.defaults());
    Ok(Json(state.indexer.compare_teams(&id, &team_ids, opts).await?))
}

/// GET /v1/teams/:id/performance - Season performance of one team.
pub async fn team_performance<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<TeamPerformance>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let opts = query.apply(state.indexer.defaults());
    Ok(Json(state.indexer.team_performance(&id, opts).await?))
}

/// GET /v1/teams/:id/similar?k=5 - Teams with the closest profile.
pub async fn comparable_teams<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(similar): Query<SimilarQuery>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ComparableTeams>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let k = clamp_k(similar.k)?;
    let opts = query.apply(state.indexer.defaults());
    Ok(Json(state.indexer.comparable_teams(&id, k, opts).await?))
}

/// GET /v1/matches/:id/summary - Scoreline and outcome of one match.
pub async fn match_summary<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<MatchSummary>, ApiError>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    let opts = query.apply(state.indexer.defaults());
    Ok(Json(state.indexer.match_summary(&id, opts).await?))
}

/// GET /v1/cache/stats - Cache monitor snapshot.
pub async fn cache_stats<S, B>(State(state): State<Arc<AppState<S, B>>>) -> Json<CacheStats>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    Json(state.indexer.coordinator().stats())
}

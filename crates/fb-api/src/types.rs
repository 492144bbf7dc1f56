//! API request and response types.

use chrono::{DateTime, Utc};
use fb_indexer::{LeagueRefresh, ReadOptions, ResolveSource, Resolved, SearchHit};
use fb_types::{Entity, EntityKey, EntityKind, Freshness};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness overrides accepted by every read endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Oldest acceptable record, in seconds.
    pub max_age_secs: Option<u64>,
    /// How long to wait for a fetch, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Serve an older record if the refresh fails.
    pub allow_stale: Option<bool>,
}

impl ReadQuery {
    /// Apply the overrides on top of `defaults`.
    pub fn apply(&self, defaults: ReadOptions) -> ReadOptions {
        ReadOptions {
            max_age: self
                .max_age_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            allow_stale: self.allow_stale.unwrap_or(defaults.allow_stale),
        }
    }
}

/// A single cached entity with its record metadata.
#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub key: EntityKey,
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: u64,
    pub ttl_secs: u64,
    pub freshness: Freshness,
    pub source: ResolveSource,
    pub entity: Entity,
}

impl From<Resolved> for EntityResponse {
    fn from(resolved: Resolved) -> Self {
        let record = &resolved.record;
        Self {
            key: record.key.clone(),
            version: record.version,
            fetched_at: record.fetched_at,
            age_secs: resolved.age.as_secs(),
            ttl_secs: record.ttl.as_secs(),
            freshness: resolved.freshness,
            source: resolved.source,
            entity: record.entity.clone(),
        }
    }
}

/// Query parameters for a similarity search by stored key.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Key of the stored entity to search around, e.g. `team:66`.
    pub key: String,
    pub k: Option<usize>,
}

/// Body of a similarity search by raw vector.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub embedding: Vec<f32>,
    pub k: Option<usize>,
    /// Restrict hits to one kind.
    pub kind: Option<EntityKind>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub count: usize,
}

impl From<Vec<SearchHit>> for SearchResponse {
    fn from(hits: Vec<SearchHit>) -> Self {
        Self {
            count: hits.len(),
            hits,
        }
    }
}

/// Query parameters for a league refresh.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    pub timeout_ms: Option<u64>,
}

/// Refresh result for one team.
#[derive(Debug, Serialize)]
pub struct TeamRefreshStatus {
    pub key: EntityKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResolveSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeagueRefreshResponse {
    pub league: EntityKey,
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
    pub teams_refreshed: usize,
    pub teams_failed: usize,
    pub teams: Vec<TeamRefreshStatus>,
}

impl From<LeagueRefresh> for LeagueRefreshResponse {
    fn from(refresh: LeagueRefresh) -> Self {
        let teams: Vec<TeamRefreshStatus> = refresh
            .teams
            .into_iter()
            .map(|(key, result)| match result {
                Ok(resolved) => TeamRefreshStatus {
                    key,
                    version: Some(resolved.version()),
                    source: Some(resolved.source),
                    error: None,
                },
                Err(e) => TeamRefreshStatus {
                    key,
                    version: None,
                    source: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        let teams_failed = teams.iter().filter(|t| t.error.is_some()).count();

        Self {
            league: refresh.league.record.key.clone(),
            version: refresh.league.version(),
            fetched_at: refresh.league.record.fetched_at,
            teams_refreshed: teams.len() - teams_failed,
            teams_failed,
            teams,
        }
    }
}

/// Query parameters for a team comparison.
#[derive(Debug, Default, Deserialize)]
pub struct CompareQuery {
    /// Comma-separated team ids. Defaults to the big six.
    pub teams: Option<String>,
}

impl CompareQuery {
    pub fn team_ids(&self) -> Option<Vec<String>> {
        self.teams.as_ref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

/// Query parameters for comparable teams.
#[derive(Debug, Default, Deserialize)]
pub struct SimilarQuery {
    pub k: Option<usize>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Records currently cached.
    pub records: usize,
}

//! football-data.org v4 data source.
//!
//! One [`DataSource::fetch_entity`] call is one attempt: no retries and no
//! rate limiting here, both belong to [`crate::ProviderClient`]. Team
//! fetches need two requests (details plus finished matches), which is
//! reported through [`DataSource::request_cost`] so the budget is charged
//! for both.

use crate::config::{ApiKey, ProviderConfig};
use crate::wire::{MatchResponse, MatchesResponse, StandingsResponse, TeamResponse};
use crate::{DataSource, IngestionError};
use chrono::Utc;
use fb_types::{Entity, EntityKey, EntityKind};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Header football-data.org reads the token from.
const AUTH_HEADER: &str = "X-Auth-Token";

/// Provider endpoints used by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint<'a> {
    Standings(&'a str),
    Team(&'a str),
    TeamMatches(&'a str),
    Match(&'a str),
}

impl Endpoint<'_> {
    fn segments(&self) -> [&str; 3] {
        match *self {
            Endpoint::Standings(id) => ["competitions", id, "standings"],
            Endpoint::Team(id) => ["teams", id, ""],
            Endpoint::TeamMatches(id) => ["teams", id, "matches"],
            Endpoint::Match(id) => ["matches", id, ""],
        }
    }

    fn query(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Endpoint::TeamMatches(_) => Some(("status", "FINISHED")),
            _ => None,
        }
    }

    /// Absolute URL under `base`. Ids are percent-encoded as path segments.
    fn url(&self, base: &Url) -> Result<Url, IngestionError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| IngestionError::Config(format!("base URL cannot be a base: {}", base)))?
            .pop_if_empty()
            .extend(self.segments().into_iter().filter(|s| !s.is_empty()));
        if let Some((name, value)) = self.query() {
            url.query_pairs_mut().append_pair(name, value);
        }
        Ok(url)
    }
}

/// Production data source for football-data.org.
///
/// # Example
///
/// ```rust,no_run
/// use fb_ingestion::{DataSource, FootballDataSource, ProviderConfig};
/// use fb_types::EntityKey;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = FootballDataSource::new(&ProviderConfig::from_env()?)?;
///     let league = source.fetch_entity(&EntityKey::league("PL")).await?;
///     println!("{:?}", league.as_league().map(|l| l.team_count()));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FootballDataSource {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<ApiKey>,
}

impl FootballDataSource {
    pub fn new(config: &ProviderConfig) -> Result<Self, IngestionError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: Endpoint<'_>) -> Result<T, IngestionError> {
        let url = self.endpoint_url(endpoint)?;
        let path = url.path().to_string();
        tracing::debug!("GET {}", path);

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(AUTH_HEADER, key.expose());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            404 => return Err(IngestionError::NotFound(path)),
            401 | 403 => return Err(IngestionError::Unauthorized { status }),
            429 => {
                return Err(IngestionError::RateLimited {
                    retry_after: retry_after(response.headers()),
                })
            }
            500..=599 => return Err(IngestionError::Server { status }),
            other => {
                return Err(IngestionError::Malformed(format!(
                    "unexpected HTTP status {}",
                    other
                )))
            }
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn endpoint_url(&self, endpoint: Endpoint<'_>) -> Result<Url, IngestionError> {
        endpoint.url(&self.base_url)
    }
}

/// `Retry-After` in its delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl DataSource for FootballDataSource {
    async fn fetch_entity(&self, key: &EntityKey) -> Result<Entity, IngestionError> {
        let fetched_at = Utc::now();
        let id = key.id();

        let entity = match key.kind() {
            EntityKind::League => {
                let response: StandingsResponse = self.get_json(Endpoint::Standings(id)).await?;
                Entity::League(response.into_league(id, fetched_at)?)
            }
            EntityKind::Team => {
                let team: TeamResponse = self.get_json(Endpoint::Team(id)).await?;
                let matches: MatchesResponse = self.get_json(Endpoint::TeamMatches(id)).await?;
                Entity::Team(team.into_team(matches, fetched_at)?)
            }
            EntityKind::Match => {
                let response: MatchResponse = self.get_json(Endpoint::Match(id)).await?;
                Entity::Match(response.into_match(fetched_at)?)
            }
        };
        Ok(entity)
    }

    fn request_cost(&self, key: &EntityKey) -> u32 {
        match key.kind() {
            EntityKind::Team => 2,
            EntityKind::League | EntityKind::Match => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse(crate::config::DEFAULT_BASE_URL).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(
            Endpoint::Standings("PL").url(&base()).unwrap().as_str(),
            "https://api.football-data.org/v4/competitions/PL/standings"
        );
        assert_eq!(
            Endpoint::Team("66").url(&base()).unwrap().as_str(),
            "https://api.football-data.org/v4/teams/66"
        );
        assert_eq!(
            Endpoint::TeamMatches("66").url(&base()).unwrap().as_str(),
            "https://api.football-data.org/v4/teams/66/matches?status=FINISHED"
        );
        assert_eq!(
            Endpoint::Match("497410").url(&base()).unwrap().as_str(),
            "https://api.football-data.org/v4/matches/497410"
        );
    }

    #[test]
    fn test_trailing_slash_base() {
        let base = Url::parse("http://localhost:8080/v4/").unwrap();
        assert_eq!(
            Endpoint::Match("1").url(&base).unwrap().as_str(),
            "http://localhost:8080/v4/matches/1"
        );
    }

    #[test]
    fn test_ids_are_escaped() {
        let url = Endpoint::Team("../admin").url(&base()).unwrap();
        assert!(!url.path().contains("/../"));
        assert!(url.path().starts_with("/v4/teams/"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "6".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(6)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_team_costs_two_requests() {
        let source = FootballDataSource::new(&ProviderConfig::default()).unwrap();
        assert_eq!(source.request_cost(&EntityKey::team("66")), 2);
        assert_eq!(source.request_cost(&EntityKey::league("PL")), 1);
    }
}

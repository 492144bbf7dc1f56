//! Analysis entry point.
//!
//! The `Indexer` turns coordinator reads into the views in
//! [`crate::analysis`], labelling each with the freshness of the data it
//! was built from.

use crate::analysis::{
    self, ComparableTeams, DataFreshness, LeagueTable, MatchSummary, TeamComparison,
    TeamPerformance,
};
use crate::coordinator::{Coordinator, Resolved};
use crate::error::IndexerError;
use fb_ingestion::{DataSource, RateBudget, TokenBucket};
use fb_types::{EntityKey, League, Match, Team};
use std::env;
use std::time::Duration;

/// Default read settings for analysis queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Oldest record served without refetching.
    pub max_age: Duration,

    /// How long a query waits for a fetch.
    pub timeout: Duration,

    /// Serve an older record when a refresh fails.
    pub allow_stale: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(300),
            timeout: Duration::from_secs(10),
            allow_stale: false,
        }
    }
}

impl IndexerConfig {
    /// Reads `FB_MAX_AGE_SECS`, `FB_READ_TIMEOUT_MS` and `FB_ALLOW_STALE`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("FB_MAX_AGE_SECS") {
            config.max_age = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("FB_READ_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(allow) = env_parse::<bool>("FB_ALLOW_STALE") {
            config.allow_stale = allow;
        }
        config
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serve stale records when a refresh fails.
    ///
    /// ```rust
    /// use fb_indexer::IndexerConfig;
    ///
    /// let config = IndexerConfig::default().with_allow_stale(true);
    /// assert!(config.allow_stale);
    /// ```
    pub fn with_allow_stale(mut self, allow: bool) -> Self {
        self.allow_stale = allow;
        self
    }

    /// Read options for one query with these defaults.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            max_age: self.max_age,
            timeout: self.timeout,
            allow_stale: self.allow_stale,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

/// Per-query overrides of [`IndexerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub max_age: Duration,
    pub timeout: Duration,
    pub allow_stale: bool,
}

/// Analysis queries over the coordinator.
pub struct Indexer<S, B = TokenBucket> {
    coordinator: Coordinator<S, B>,
    config: IndexerConfig,
}

impl<S, B> Clone for Indexer<S, B> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, B> Indexer<S, B>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    pub fn new(coordinator: Coordinator<S, B>, config: IndexerConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<S, B> {
        &self.coordinator
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Read options with this indexer's defaults.
    pub fn defaults(&self) -> ReadOptions {
        self.config.read_options()
    }

    /// Resolve `key` honouring the options' stale policy.
    pub async fn read(&self, key: &EntityKey, opts: ReadOptions) -> Result<Resolved, IndexerError> {
        let resolved = if opts.allow_stale {
            self.coordinator
                .resolve_or_stale(key, opts.max_age, opts.timeout)
                .await?
        } else {
            self.coordinator
                .resolve(key, opts.max_age, opts.timeout)
                .await?
        };
        Ok(resolved)
    }

    async fn read_league(
        &self,
        id: &str,
        opts: ReadOptions,
    ) -> Result<(League, DataFreshness), IndexerError> {
        let key = EntityKey::league(id);
        let resolved = self.read(&key, opts).await?;
        let league = resolved
            .record
            .entity
            .as_league()
            .cloned()
            .ok_or_else(|| wrong_kind(&key))?;
        Ok((league, DataFreshness::from(&resolved)))
    }

    async fn read_team(&self, id: &str, opts: ReadOptions) -> Result<(Team, DataFreshness), IndexerError> {
        let key = EntityKey::team(id);
        let resolved = self.read(&key, opts).await?;
        let team = resolved
            .record
            .entity
            .as_team()
            .cloned()
            .ok_or_else(|| wrong_kind(&key))?;
        Ok((team, DataFreshness::from(&resolved)))
    }

    async fn read_match(&self, id: &str, opts: ReadOptions) -> Result<(Match, DataFreshness), IndexerError> {
        let key = EntityKey::fixture(id);
        let resolved = self.read(&key, opts).await?;
        let fixture = resolved
            .record
            .entity
            .as_match()
            .cloned()
            .ok_or_else(|| wrong_kind(&key))?;
        Ok((fixture, DataFreshness::from(&resolved)))
    }

    /// Current standings of a league.
    pub async fn league_table(&self, id: &str, opts: ReadOptions) -> Result<LeagueTable, IndexerError> {
        let (league, data) = self.read_league(id, opts).await?;
        Ok(LeagueTable::new(&league, data))
    }

    /// Compare `team_ids` within a league's table (see
    /// [`analysis::BIG_SIX`] for the classic set).
    pub async fn compare_teams(
        &self,
        league_id: &str,
        team_ids: &[String],
        opts: ReadOptions,
    ) -> Result<TeamComparison, IndexerError> {
        if team_ids.is_empty() {
            return Err(IndexerError::InvalidInput("no teams to compare".to_string()));
        }
        let (league, data) = self.read_league(league_id, opts).await?;
        let rows = analysis::compare_teams(&league, team_ids)?;
        tracing::debug!("Compared {} teams in {}", rows.len(), league_id);
        Ok(TeamComparison {
            league_id: league.id,
            rows,
            data,
        })
    }

    pub async fn match_summary(&self, id: &str, opts: ReadOptions) -> Result<MatchSummary, IndexerError> {
        let (fixture, data) = self.read_match(id, opts).await?;
        let mut summary = analysis::summarize_match(&fixture);
        summary.data = Some(data);
        Ok(summary)
    }

    pub async fn team_performance(
        &self,
        id: &str,
        opts: ReadOptions,
    ) -> Result<TeamPerformance, IndexerError> {
        let (team, data) = self.read_team(id, opts).await?;
        let mut performance = analysis::team_performance(&team);
        performance.data = Some(data);
        Ok(performance)
    }

    /// The `k` teams whose performance profile is closest to team `id`.
    ///
    /// # Errors
    ///
    /// [`IndexerError::NoData`] if the team has not played yet and so has
    /// no profile to compare.
    pub async fn comparable_teams(
        &self,
        id: &str,
        k: usize,
        opts: ReadOptions,
    ) -> Result<ComparableTeams, IndexerError> {
        if k == 0 {
            return Err(IndexerError::InvalidInput("k must be positive".to_string()));
        }
        let key = EntityKey::team(id);
        self.read(&key, opts).await?;
        let hits = self
            .coordinator
            .similar_to(&key, k)
            .ok_or_else(|| IndexerError::NoData(format!("team {} has no performance profile", id)))?;
        Ok(ComparableTeams {
            team_id: id.to_string(),
            hits,
        })
    }
}

fn wrong_kind(key: &EntityKey) -> IndexerError {
    IndexerError::WrongKind {
        key: key.to_string(),
        expected: key.kind(),
    }
}

//! Store configuration.
//!
//! # Environment Variables
//!
//! - `FB_STORE_PATH`: SQLite file for persistence (unset: memory only)
//! - `FB_STORE_CAPACITY`: maximum records held (default: 10000)
//! - `FB_SIMILARITY_METRIC`: `cosine`, `dot` or `euclidean` (default: cosine)
//! - `FB_TTL_LEAGUE_SECS`, `FB_TTL_TEAM_SECS`, `FB_TTL_MATCH_SECS`:
//!   freshness window per kind (default: 300 each)

use crate::{SimilarityMetric, StoreError};
use fb_types::EntityKind;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Freshness window used when none is configured for a kind.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default record capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Freshness window per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub league: Duration,
    pub team: Duration,
    pub fixture: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::uniform(DEFAULT_TTL)
    }
}

impl TtlPolicy {
    /// The same window for every kind.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            league: ttl,
            team: ttl,
            fixture: ttl,
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::League => self.league,
            EntityKind::Team => self.team,
            EntityKind::Match => self.fixture,
        }
    }

    pub fn with_ttl(mut self, kind: EntityKind, ttl: Duration) -> Self {
        match kind {
            EntityKind::League => self.league = ttl,
            EntityKind::Team => self.team = ttl,
            EntityKind::Match => self.fixture = ttl,
        }
        self
    }

    /// Defaults overridden by `FB_TTL_<KIND>_SECS`.
    pub fn from_env() -> Result<Self, StoreError> {
        let mut policy = Self::default();
        for kind in EntityKind::ALL {
            let name = format!("FB_TTL_{}_SECS", kind.as_str().to_uppercase());
            if let Ok(raw) = env::var(&name) {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| StoreError::Config(format!("{}={:?}: {}", name, raw, e)))?;
                policy = policy.with_ttl(kind, Duration::from_secs(secs));
            }
        }
        Ok(policy)
    }
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of records before eviction starts.
    pub capacity: usize,

    pub metric: SimilarityMetric,

    pub ttl: TtlPolicy,

    /// SQLite file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            metric: SimilarityMetric::default(),
            ttl: TtlPolicy::default(),
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        let mut config = Self {
            ttl: TtlPolicy::from_env()?,
            ..Self::default()
        };

        if let Ok(raw) = env::var("FB_STORE_CAPACITY") {
            config.capacity = raw
                .trim()
                .parse()
                .map_err(|e| StoreError::Config(format!("FB_STORE_CAPACITY={:?}: {}", raw, e)))?;
        }
        if let Ok(raw) = env::var("FB_SIMILARITY_METRIC") {
            config.metric = raw.parse()?;
        }
        config.path = env::var("FB_STORE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl_is_five_minutes() {
        let policy = TtlPolicy::default();
        for kind in EntityKind::ALL {
            assert_eq!(policy.for_kind(kind), Duration::from_secs(300));
        }
    }

    #[test]
    fn test_with_ttl_per_kind() {
        let policy = TtlPolicy::default().with_ttl(EntityKind::Match, Duration::from_secs(30));
        assert_eq!(policy.for_kind(EntityKind::Match), Duration::from_secs(30));
        assert_eq!(policy.for_kind(EntityKind::League), DEFAULT_TTL);
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.capacity, 10_000);
        assert_eq!(config.metric, SimilarityMetric::Cosine);
        assert!(config.path.is_none());
    }
}

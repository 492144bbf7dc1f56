//! The closed set of cacheable entities.

use crate::{EntityKey, EntityKind, League, Match, Team, TypeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated entity body, tagged by kind.
///
/// Internal code only ever handles this shape; untyped provider payloads
/// are converted and validated once at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    League(League),
    Team(Team),
    Match(Match),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::League(_) => EntityKind::League,
            Entity::Team(_) => EntityKind::Team,
            Entity::Match(_) => EntityKind::Match,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::League(l) => &l.id,
            Entity::Team(t) => &t.id,
            Entity::Match(m) => &m.id,
        }
    }

    /// Cache key derived from the body.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind(), self.id())
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            Entity::League(l) => l.last_updated,
            Entity::Team(t) => t.last_updated,
            Entity::Match(m) => m.last_updated,
        }
    }

    /// Similarity feature vector, if this kind/state has one.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        match self {
            Entity::League(_) => None,
            Entity::Team(t) => t.embedding(),
            Entity::Match(m) => m.embedding(),
        }
    }

    /// Run the kind-specific invariant checks.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            Entity::League(l) => l.validate(),
            Entity::Team(t) => t.validate(),
            Entity::Match(m) => m.validate(),
        }
    }

    pub fn as_league(&self) -> Option<&League> {
        match self {
            Entity::League(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_team(&self) -> Option<&Team> {
        match self {
            Entity::Team(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_match(&self) -> Option<&Match> {
        match self {
            Entity::Match(m) => Some(m),
            _ => None,
        }
    }
}

impl From<League> for Entity {
    fn from(league: League) -> Self {
        Entity::League(league)
    }
}

impl From<Team> for Entity {
    fn from(team: Team) -> Self {
        Entity::Team(team)
    }
}

impl From<Match> for Entity {
    fn from(m: Match) -> Self {
        Entity::Match(m)
    }
}

//! Entity kinds and cache keys.
//!
//! Every cached body is addressed by an [`EntityKey`]: the entity kind plus
//! the provider's identifier. Keys have a stable textual form
//! (`"team:66"`, `"league:PL"`, `"match:497410"`) used in logs, the HTTP
//! surface and the persisted store.
//!
//! # Example
//!
//! ```rust
//! use fb_types::{EntityKey, EntityKind};
//!
//! let key: EntityKey = "team:66".parse().unwrap();
//! assert_eq!(key.kind(), EntityKind::Team);
//! assert_eq!(key.id(), "66");
//! assert_eq!(key.to_string(), "team:66");
//! ```

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of an independently fetched entity.
///
/// Standing entries are owned by their league and are never fetched or
/// cached on their own, so they have no kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A competition with its standings table.
    League,
    /// A club with its aggregate stats snapshot.
    Team,
    /// A single fixture.
    Match,
}

impl EntityKind {
    /// All kinds, in a fixed order.
    pub const ALL: [EntityKind; 3] = [EntityKind::League, EntityKind::Team, EntityKind::Match];

    /// Lowercase name used in keys and persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::League => "league",
            EntityKind::Team => "team",
            EntityKind::Match => "match",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "league" | "competition" => Ok(EntityKind::League),
            "team" => Ok(EntityKind::Team),
            "match" | "fixture" => Ok(EntityKind::Match),
            other => Err(TypeError::InvalidKind(other.to_string())),
        }
    }
}

/// Cache key: entity kind plus provider identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityKey {
    kind: EntityKind,
    id: String,
}

impl EntityKey {
    /// Create a key from its parts.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Key for a league (competition code or numeric id).
    pub fn league(id: impl Into<String>) -> Self {
        Self::new(EntityKind::League, id)
    }

    /// Key for a team.
    pub fn team(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Team, id)
    }

    /// Key for a match.
    pub fn fixture(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Match, id)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidKey(s.to_string()))?;
        let kind: EntityKind = kind.parse()?;
        let id = id.trim();
        if id.is_empty() {
            return Err(TypeError::InvalidKey(s.to_string()));
        }
        Ok(Self::new(kind, id))
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for EntityKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let key: EntityKey = "league:PL".parse().unwrap();
        assert_eq!(key, EntityKey::league("PL"));

        let key: EntityKey = "fixture:497410".parse().unwrap();
        assert_eq!(key.kind(), EntityKind::Match);
        assert_eq!(key.to_string(), "match:497410");
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert!(matches!("team".parse::<EntityKey>(), Err(TypeError::InvalidKey(_))));
        assert!(matches!("team: ".parse::<EntityKey>(), Err(TypeError::InvalidKey(_))));
        assert!(matches!(
            "player:7".parse::<EntityKey>(),
            Err(TypeError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_key_serde_as_string() {
        let key = EntityKey::team("66");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"team:66\"");
        let back: EntityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_key_ordering_groups_by_kind() {
        let mut keys = vec![
            EntityKey::fixture("1"),
            EntityKey::team("b"),
            EntityKey::league("PL"),
            EntityKey::team("a"),
        ];
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["league:PL", "team:a", "team:b", "match:1"]);
    }
}

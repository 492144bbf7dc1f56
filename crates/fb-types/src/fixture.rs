//! Match (fixture) types.
//!
//! Matches reference their teams by id; the display name travels along so
//! summaries can be rendered without a second lookup, but the team body
//! itself is owned by the store under its own key.

use crate::{EntityKey, TypeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a team by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

impl TeamRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Cache key of the referenced team.
    pub fn key(&self) -> EntityKey {
        EntityKey::team(&self.id)
    }
}

/// Lifecycle state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    /// Map a provider status string onto the closed set.
    ///
    /// ```rust
    /// use fb_types::MatchStatus;
    ///
    /// assert_eq!(MatchStatus::from_provider("IN_PLAY").unwrap(), MatchStatus::Live);
    /// assert!(MatchStatus::from_provider("HALFTIME_SHOW").is_err());
    /// ```
    pub fn from_provider(status: &str) -> Result<Self, TypeError> {
        match status.trim().to_uppercase().as_str() {
            "SCHEDULED" | "TIMED" => Ok(MatchStatus::Scheduled),
            "LIVE" | "IN_PLAY" | "PAUSED" => Ok(MatchStatus::Live),
            "FINISHED" | "AWARDED" => Ok(MatchStatus::Finished),
            "POSTPONED" | "SUSPENDED" => Ok(MatchStatus::Postponed),
            "CANCELLED" | "CANCELED" => Ok(MatchStatus::Cancelled),
            other => Err(TypeError::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Finished)
    }

    /// Whether a scoreline is meaningful in this state.
    pub fn has_score(&self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::Finished)
    }
}

/// Goals per side. `None` means the provider has not reported a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self {
            home: Some(home),
            away: Some(away),
        }
    }

    /// Both sides reported.
    pub fn is_complete(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }

    /// Home goals minus away goals, if both are known.
    pub fn goal_difference(&self) -> Option<i32> {
        Some(self.home? as i32 - self.away? as i32)
    }
}

/// Outcome of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchWinner {
    Home,
    Away,
    Draw,
}

/// A single fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,

    /// Competition the match belongs to (reference by id).
    pub competition_id: Option<String>,

    pub matchday: Option<u32>,

    pub home: TeamRef,
    pub away: TeamRef,

    pub status: MatchStatus,

    pub full_time: Score,
    pub half_time: Score,

    /// Kick-off time.
    pub kickoff: DateTime<Utc>,

    /// When the provider last reported a change to this match.
    pub last_updated: DateTime<Utc>,
}

impl Match {
    pub fn key(&self) -> EntityKey {
        EntityKey::fixture(&self.id)
    }

    /// Winner of a finished match; `None` while undecided.
    pub fn winner(&self) -> Option<MatchWinner> {
        if !self.status.is_finished() {
            return None;
        }
        let diff = self.full_time.goal_difference()?;
        Some(match diff {
            d if d > 0 => MatchWinner::Home,
            d if d < 0 => MatchWinner::Away,
            _ => MatchWinner::Draw,
        })
    }

    /// Whether the given team plays in this match.
    pub fn involves(&self, team_id: &str) -> bool {
        self.home.id == team_id || self.away.id == team_id
    }

    /// Goals (for, against) from the perspective of `team_id`.
    pub fn goals_for_team(&self, team_id: &str) -> Option<(u32, u32)> {
        let (home, away) = (self.full_time.home?, self.full_time.away?);
        if self.home.id == team_id {
            Some((home, away))
        } else if self.away.id == team_id {
            Some((away, home))
        } else {
            None
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), TypeError> {
        let key = self.key();
        if self.id.trim().is_empty() {
            return Err(TypeError::validation(key, "empty match id"));
        }
        if self.home.id.is_empty() || self.away.id.is_empty() {
            return Err(TypeError::validation(key, "missing team reference"));
        }
        if self.home.id == self.away.id {
            return Err(TypeError::validation(key, "team plays itself"));
        }
        if self.status.is_finished() && !self.full_time.is_complete() {
            return Err(TypeError::validation(key, "finished match without a full-time score"));
        }
        if self.full_time.home.is_some() != self.full_time.away.is_some() {
            return Err(TypeError::validation(key, "one-sided full-time score"));
        }
        Ok(())
    }

    /// Feature vector for similarity lookups, when a score is known.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        if !self.status.has_score() {
            return None;
        }
        let home = self.full_time.home? as f32;
        let away = self.full_time.away? as f32;
        Some(vec![
            home,
            away,
            home - away,
            self.half_time.home.unwrap_or(0) as f32,
            self.half_time.away.unwrap_or(0) as f32,
        ])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_match(status: MatchStatus, score: Score) -> Match {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Match {
            id: "497410".to_string(),
            competition_id: Some("PL".to_string()),
            matchday: Some(12),
            home: TeamRef::new("66", "Manchester United FC"),
            away: TeamRef::new("64", "Liverpool FC"),
            status,
            full_time: score,
            half_time: Score::new(1, 0),
            kickoff: ts,
            last_updated: ts,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(MatchStatus::from_provider("TIMED").unwrap(), MatchStatus::Scheduled);
        assert_eq!(MatchStatus::from_provider("paused").unwrap(), MatchStatus::Live);
        assert_eq!(MatchStatus::from_provider("AWARDED").unwrap(), MatchStatus::Finished);
        assert_eq!(MatchStatus::from_provider("SUSPENDED").unwrap(), MatchStatus::Postponed);
        assert!(matches!(
            MatchStatus::from_provider("UNKNOWN"),
            Err(TypeError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_winner() {
        let m = sample_match(MatchStatus::Finished, Score::new(2, 1));
        assert_eq!(m.winner(), Some(MatchWinner::Home));

        let m = sample_match(MatchStatus::Finished, Score::new(0, 3));
        assert_eq!(m.winner(), Some(MatchWinner::Away));

        let m = sample_match(MatchStatus::Finished, Score::new(1, 1));
        assert_eq!(m.winner(), Some(MatchWinner::Draw));

        let m = sample_match(MatchStatus::Live, Score::new(1, 0));
        assert_eq!(m.winner(), None);
    }

    #[test]
    fn test_goals_for_team() {
        let m = sample_match(MatchStatus::Finished, Score::new(2, 1));
        assert_eq!(m.goals_for_team("66"), Some((2, 1)));
        assert_eq!(m.goals_for_team("64"), Some((1, 2)));
        assert_eq!(m.goals_for_team("57"), None);
    }

    #[test]
    fn test_validate_finished_needs_score() {
        let m = sample_match(MatchStatus::Finished, Score::default());
        assert!(m.validate().is_err());

        let m = sample_match(MatchStatus::Scheduled, Score::default());
        assert!(m.validate().is_ok());
        assert!(m.embedding().is_none());
    }

    #[test]
    fn test_validate_one_sided_score() {
        let m = sample_match(
            MatchStatus::Live,
            Score {
                home: Some(1),
                away: None,
            },
        );
        assert!(m.validate().is_err());
    }
}

//! League and standings types.
//!
//! A [`League`] owns its standings table. The table is replaced wholesale on
//! every refresh and is validated on construction, so a league that exists
//! always carries a complete table: one entry per team the provider
//! reported, ranks within `1..=n`, no duplicate teams.

use crate::fixture::TeamRef;
use crate::{EntityKey, TypeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One row of a league table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingEntry {
    /// The team this row belongs to (reference by id).
    pub team: TeamRef,

    /// Table position (1 = top).
    pub rank: u32,

    pub points: u32,

    pub goal_difference: i32,

    pub played: u32,
    pub won: u32,
    pub draw: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,

    /// Recent form as reported by the provider (e.g. "W,D,L,W,W").
    pub form: Option<String>,
}

/// A competition and its current table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    /// Provider identifier (competition code such as "PL").
    pub id: String,

    pub name: String,

    /// Season label, e.g. "2024/2025".
    pub season: String,

    /// Table in rank order. Private so it can only be replaced as a whole.
    standings: Vec<StandingEntry>,

    /// When the provider last reported a change to this league.
    pub last_updated: DateTime<Utc>,
}

impl League {
    /// Build a league, validating the table against the team count the
    /// provider reported for this fetch.
    ///
    /// The table is sorted by rank (stable) before validation.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        season: impl Into<String>,
        mut standings: Vec<StandingEntry>,
        reported_team_count: usize,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, TypeError> {
        let id = id.into();
        standings.sort_by_key(|entry| entry.rank);

        if standings.len() != reported_team_count {
            return Err(TypeError::validation(
                EntityKey::league(&id),
                format!(
                    "standings have {} entries but provider reported {} teams",
                    standings.len(),
                    reported_team_count
                ),
            ));
        }

        let league = Self {
            id,
            name: name.into(),
            season: season.into(),
            standings,
            last_updated,
        };
        league.validate()?;
        Ok(league)
    }

    /// The table in rank order.
    pub fn standings(&self) -> &[StandingEntry] {
        &self.standings
    }

    /// Number of teams in the table.
    pub fn team_count(&self) -> usize {
        self.standings.len()
    }

    /// Row for a specific team, if it plays in this league.
    pub fn entry_for(&self, team_id: &str) -> Option<&StandingEntry> {
        self.standings.iter().find(|entry| entry.team.id == team_id)
    }

    /// The current leader.
    pub fn leader(&self) -> Option<&StandingEntry> {
        self.standings.first()
    }

    /// Team ids in table order.
    pub fn team_ids(&self) -> impl Iterator<Item = &str> {
        self.standings.iter().map(|entry| entry.team.id.as_str())
    }

    /// Check the table invariants.
    ///
    /// Runs on construction and again at the provider boundary, so a
    /// deserialized body that skipped [`League::new`] is still checked.
    pub fn validate(&self) -> Result<(), TypeError> {
        let key = EntityKey::league(&self.id);
        if self.id.trim().is_empty() {
            return Err(TypeError::validation(key, "empty league id"));
        }
        if self.standings.is_empty() {
            return Err(TypeError::validation(key, "empty standings table"));
        }

        let n = self.standings.len() as u32;
        let mut seen = HashSet::with_capacity(self.standings.len());
        let mut previous_rank = 0;

        for entry in &self.standings {
            if entry.rank == 0 || entry.rank > n {
                return Err(TypeError::validation(
                    &key,
                    format!("rank {} outside 1..={}", entry.rank, n),
                ));
            }
            if entry.rank < previous_rank {
                return Err(TypeError::validation(&key, "standings not in rank order"));
            }
            previous_rank = entry.rank;

            if !seen.insert(entry.team.id.as_str()) {
                return Err(TypeError::validation(
                    &key,
                    format!("team {} listed twice", entry.team.id),
                ));
            }
            if entry.played != entry.won + entry.draw + entry.lost {
                return Err(TypeError::validation(
                    &key,
                    format!("team {} played != won + draw + lost", entry.team.id),
                ));
            }
            if entry.goal_difference != entry.goals_for as i32 - entry.goals_against as i32 {
                return Err(TypeError::validation(
                    &key,
                    format!("team {} goal difference mismatch", entry.team.id),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(team_id: &str, rank: u32, points: u32, gf: u32, ga: u32) -> StandingEntry {
        StandingEntry {
            team: TeamRef::new(team_id, format!("Team {}", team_id)),
            rank,
            points,
            goal_difference: gf as i32 - ga as i32,
            played: 10,
            won: points / 3,
            draw: points % 3,
            lost: 10 - points / 3 - points % 3,
            goals_for: gf,
            goals_against: ga,
            form: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_new_sorts_by_rank() {
        let league = League::new(
            "PL",
            "Premier League",
            "2024/2025",
            vec![entry("64", 2, 20, 18, 9), entry("57", 1, 24, 20, 6)],
            2,
            now(),
        )
        .unwrap();

        assert_eq!(league.leader().unwrap().team.id, "57");
        assert_eq!(league.team_ids().collect::<Vec<_>>(), ["57", "64"]);
        assert_eq!(league.entry_for("64").unwrap().rank, 2);
        assert!(league.entry_for("1").is_none());
    }

    #[test]
    fn test_rejects_partial_table() {
        let result = League::new(
            "PL",
            "Premier League",
            "2024/2025",
            vec![entry("57", 1, 24, 20, 6)],
            20,
            now(),
        );
        assert!(matches!(result, Err(TypeError::Validation { .. })));
    }

    #[test]
    fn test_rejects_duplicate_team() {
        let result = League::new(
            "PL",
            "Premier League",
            "2024/2025",
            vec![entry("57", 1, 24, 20, 6), entry("57", 2, 20, 18, 9)],
            2,
            now(),
        );
        assert!(matches!(result, Err(TypeError::Validation { .. })));
    }

    #[test]
    fn test_rejects_inconsistent_goal_difference() {
        let mut bad = entry("57", 1, 24, 20, 6);
        bad.goal_difference = 3;
        let result = League::new("PL", "Premier League", "2024/2025", vec![bad], 1, now());
        assert!(matches!(result, Err(TypeError::Validation { .. })));
    }

    #[test]
    fn test_rejects_empty_table() {
        let result = League::new("PL", "Premier League", "2024/2025", vec![], 0, now());
        assert!(result.is_err());
    }
}

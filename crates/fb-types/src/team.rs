//! Team types and aggregate statistics.
//!
//! A [`Team`] carries a snapshot of its aggregate record ([`TeamStats`]).
//! Derived ratios are returned as `Option<Decimal>`: a team that has not
//! played yet has no points-per-game, rather than a misleading zero.

use crate::{EntityKey, TypeError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a single match from one team's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormResult {
    Win,
    Draw,
    Loss,
}

impl FormResult {
    /// Parse a single form letter (`W`, `D`, `L`).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'W' => Some(FormResult::Win),
            'D' => Some(FormResult::Draw),
            'L' => Some(FormResult::Loss),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            FormResult::Win => 'W',
            FormResult::Draw => 'D',
            FormResult::Loss => 'L',
        }
    }

    /// Result for a team that scored `goals_for` and conceded `goals_against`.
    pub fn from_goals(goals_for: u32, goals_against: u32) -> Self {
        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => FormResult::Win,
            std::cmp::Ordering::Equal => FormResult::Draw,
            std::cmp::Ordering::Less => FormResult::Loss,
        }
    }

    /// League points awarded for this result.
    pub fn points(&self) -> u32 {
        match self {
            FormResult::Win => 3,
            FormResult::Draw => 1,
            FormResult::Loss => 0,
        }
    }
}

/// Parse a provider form string such as `"W,D,L"` or `"WDL"`.
///
/// Separators and unknown characters are ignored.
pub fn parse_form(form: &str) -> Vec<FormResult> {
    form.chars().filter_map(FormResult::from_char).collect()
}

/// Aggregate record of a team over the matches the provider reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub played: u32,
    pub won: u32,
    pub draw: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,

    /// Most recent results, oldest first (e.g. "WDLWW").
    pub form: Option<String>,
}

/// Number of results kept in the form string.
pub const FORM_LENGTH: usize = 5;

impl TeamStats {
    /// Aggregate stats from per-match (goals_for, goals_against) pairs in
    /// chronological order.
    pub fn from_results(results: &[(u32, u32)]) -> Self {
        let mut stats = TeamStats::default();
        for &(goals_for, goals_against) in results {
            stats.record(goals_for, goals_against);
        }

        let form: String = results
            .iter()
            .rev()
            .take(FORM_LENGTH)
            .rev()
            .map(|&(gf, ga)| FormResult::from_goals(gf, ga).as_char())
            .collect();
        stats.form = (!form.is_empty()).then_some(form);
        stats
    }

    /// Add one match to the aggregate.
    pub fn record(&mut self, goals_for: u32, goals_against: u32) {
        let result = FormResult::from_goals(goals_for, goals_against);
        self.played += 1;
        self.goals_for += goals_for;
        self.goals_against += goals_against;
        self.points += result.points();
        match result {
            FormResult::Win => self.won += 1,
            FormResult::Draw => self.draw += 1,
            FormResult::Loss => self.lost += 1,
        }
    }

    pub fn goal_difference(&self) -> i32 {
        self.goals_for as i32 - self.goals_against as i32
    }

    /// Points per game, rounded to two places.
    pub fn points_per_game(&self) -> Option<Decimal> {
        self.ratio(self.points)
    }

    /// Share of matches won, rounded to two places.
    pub fn win_rate(&self) -> Option<Decimal> {
        self.ratio(self.won)
    }

    /// Parsed form, oldest first.
    pub fn form_results(&self) -> Vec<FormResult> {
        self.form.as_deref().map(parse_form).unwrap_or_default()
    }

    fn ratio(&self, numerator: u32) -> Option<Decimal> {
        if self.played == 0 {
            return None;
        }
        Some((Decimal::from(numerator) / Decimal::from(self.played)).round_dp(2))
    }

    fn per_game(&self, value: u32) -> f32 {
        value as f32 / self.played as f32
    }
}

/// A club and its aggregate stats snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,

    pub name: String,

    pub short_name: Option<String>,

    /// Three-letter abbreviation.
    pub tla: Option<String>,

    /// League the team plays in (back-reference by id only).
    pub league_id: Option<String>,

    pub stats: TeamStats,

    /// When the provider last reported a change to this team.
    pub last_updated: DateTime<Utc>,
}

impl Team {
    pub fn key(&self) -> EntityKey {
        EntityKey::team(&self.id)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), TypeError> {
        let key = self.key();
        if self.id.trim().is_empty() {
            return Err(TypeError::validation(key, "empty team id"));
        }
        if self.name.trim().is_empty() {
            return Err(TypeError::validation(key, "empty team name"));
        }
        let s = &self.stats;
        if s.played != s.won + s.draw + s.lost {
            return Err(TypeError::validation(key, "played != won + draw + lost"));
        }
        Ok(())
    }

    /// Style/performance feature vector:
    /// `[ppg, goals for/game, goals against/game, win rate, draw rate, loss rate]`.
    ///
    /// `None` until the team has played.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        let s = &self.stats;
        if s.played == 0 {
            return None;
        }
        Some(vec![
            s.per_game(s.points),
            s.per_game(s.goals_for),
            s.per_game(s.goals_against),
            s.per_game(s.won),
            s.per_game(s.draw),
            s.per_game(s.lost),
        ])
    }
}

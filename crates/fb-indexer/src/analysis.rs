//! Derived views over resolved entities.
//!
//! Everything here is a pure function of entity bodies. Missing data is
//! reported as an error or an absent value, never as a zero.

use crate::coordinator::{ResolveSource, Resolved};
use crate::error::IndexerError;
use chrono::{DateTime, Utc};
use fb_store::SearchHit;
use fb_types::{
    parse_form, EntityKey, FormResult, Freshness, League, Match, MatchStatus, MatchWinner, Score,
    StandingEntry, Team, TeamRef,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

/// Team ids of the Premier League "big six" on football-data.org:
/// Manchester United, Manchester City, Liverpool, Chelsea, Arsenal,
/// Tottenham.
pub const BIG_SIX: [&str; 6] = ["66", "65", "64", "61", "57", "73"];

/// Where the data behind a view came from and how old it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFreshness {
    pub key: EntityKey,
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: u64,
    pub source: ResolveSource,
    pub freshness: Freshness,
}

impl From<&Resolved> for DataFreshness {
    fn from(resolved: &Resolved) -> Self {
        Self {
            key: resolved.record.key.clone(),
            version: resolved.record.version,
            fetched_at: resolved.record.fetched_at,
            age_secs: resolved.age.as_secs(),
            source: resolved.source,
            freshness: resolved.freshness,
        }
    }
}

/// A league's standings.
#[derive(Debug, Clone, Serialize)]
pub struct LeagueTable {
    pub league_id: String,
    pub name: String,
    pub season: String,
    pub rows: Vec<StandingEntry>,
    pub data: DataFreshness,
}

impl LeagueTable {
    pub fn new(league: &League, data: DataFreshness) -> Self {
        Self {
            league_id: league.id.clone(),
            name: league.name.clone(),
            season: league.season.clone(),
            rows: league.standings().to_vec(),
            data,
        }
    }
}

/// One team in a head-to-head table comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub team: TeamRef,
    /// Position in the full league table.
    pub league_position: u32,
    /// Position among the compared teams only.
    pub group_rank: usize,
    pub points: u32,
    pub goal_difference: i32,
    pub played: u32,
    pub won: u32,
    pub draw: u32,
    pub lost: u32,
    pub points_per_game: Option<Decimal>,
    pub form: Vec<FormResult>,
}

/// Comparison of a subset of a league's teams.
#[derive(Debug, Clone, Serialize)]
pub struct TeamComparison {
    pub league_id: String,
    pub rows: Vec<ComparisonRow>,
    pub data: DataFreshness,
}

/// Rows for `team_ids` out of the league table, ordered by league
/// position, each ranked within the group.
///
/// # Errors
///
/// - [`IndexerError::InvalidInput`] for an empty id list
/// - [`IndexerError::NoData`] if any id is not in the table
pub fn compare_teams(league: &League, team_ids: &[String]) -> Result<Vec<ComparisonRow>, IndexerError> {
    if team_ids.is_empty() {
        return Err(IndexerError::InvalidInput("no teams to compare".to_string()));
    }

    let mut seen = HashSet::new();
    let mut entries: Vec<&StandingEntry> = Vec::with_capacity(team_ids.len());
    for id in team_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let entry = league.entry_for(id).ok_or_else(|| {
            IndexerError::NoData(format!("team {} is not in the {} table", id, league.id))
        })?;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.rank);

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| ComparisonRow {
            team: entry.team.clone(),
            league_position: entry.rank,
            group_rank: idx + 1,
            points: entry.points,
            goal_difference: entry.goal_difference,
            played: entry.played,
            won: entry.won,
            draw: entry.draw,
            lost: entry.lost,
            points_per_game: ratio(entry.points, entry.played),
            form: entry.form.as_deref().map(parse_form).unwrap_or_default(),
        })
        .collect())
}

fn ratio(numerator: u32, played: u32) -> Option<Decimal> {
    (played > 0).then(|| (Decimal::from(numerator) / Decimal::from(played)).round_dp(2))
}

/// Headline view of one match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub home: TeamRef,
    pub away: TeamRef,
    pub status: MatchStatus,
    pub kickoff: DateTime<Utc>,
    /// "2-1" once a score is known.
    pub scoreline: Option<String>,
    pub half_time: Option<String>,
    /// `None` until the match is finished.
    pub winner: Option<MatchWinner>,
    /// e.g. "Manchester United FC 2-1 Liverpool FC".
    pub headline: String,
    pub data: Option<DataFreshness>,
}

fn render_score(score: &Score) -> Option<String> {
    Some(format!("{}-{}", score.home?, score.away?))
}

pub fn summarize_match(fixture: &Match) -> MatchSummary {
    let scoreline = if fixture.status.has_score() {
        render_score(&fixture.full_time)
    } else {
        None
    };
    let headline = match &scoreline {
        Some(score) => format!("{} {} {}", fixture.home.name, score, fixture.away.name),
        None => format!("{} vs {}", fixture.home.name, fixture.away.name),
    };

    MatchSummary {
        match_id: fixture.id.clone(),
        home: fixture.home.clone(),
        away: fixture.away.clone(),
        status: fixture.status,
        kickoff: fixture.kickoff,
        half_time: scoreline
            .as_ref()
            .and_then(|_| render_score(&fixture.half_time)),
        scoreline,
        winner: fixture.winner(),
        headline,
        data: None,
    }
}

/// Season performance of one team.
#[derive(Debug, Clone, Serialize)]
pub struct TeamPerformance {
    pub team_id: String,
    pub name: String,
    pub league_id: Option<String>,
    pub played: u32,
    pub points: u32,
    pub goal_difference: i32,
    /// `None` before the first match.
    pub points_per_game: Option<Decimal>,
    /// Share of matches won; `None` before the first match.
    pub win_rate: Option<Decimal>,
    /// Oldest first.
    pub form: Vec<FormResult>,
    pub data: Option<DataFreshness>,
}

pub fn team_performance(team: &Team) -> TeamPerformance {
    let stats = &team.stats;
    TeamPerformance {
        team_id: team.id.clone(),
        name: team.name.clone(),
        league_id: team.league_id.clone(),
        played: stats.played,
        points: stats.points,
        goal_difference: stats.goal_difference(),
        points_per_game: stats.points_per_game(),
        win_rate: stats.win_rate(),
        form: stats.form_results(),
        data: None,
    }
}

/// Teams with the most similar performance profile.
#[derive(Debug, Clone, Serialize)]
pub struct ComparableTeams {
    pub team_id: String,
    pub hits: Vec<SearchHit>,
}

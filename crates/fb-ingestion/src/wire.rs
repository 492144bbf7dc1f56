//! football-data.org v4 response shapes and their conversion into the
//! entity model.
//!
//! These types never leave the crate. Every response is converted once and
//! the result validated; anything that does not fit is `Malformed`.

use crate::IngestionError;
use chrono::{DateTime, NaiveDate, Utc};
use fb_types::{League, Match, MatchStatus, Score, StandingEntry, Team, TeamRef, TeamStats};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireCompetition {
    pub id: Option<u64>,
    pub name: String,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireSeason {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTeamRef {
    pub id: Option<u64>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTableRow {
    pub position: u32,
    pub team: WireTeamRef,
    pub played_games: u32,
    pub form: Option<String>,
    pub won: u32,
    pub draw: u32,
    pub lost: u32,
    pub points: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireStanding {
    #[serde(rename = "type")]
    pub kind: String,
    pub table: Vec<WireTableRow>,
}

/// `GET competitions/{id}/standings`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StandingsResponse {
    pub competition: WireCompetition,
    pub season: Option<WireSeason>,
    pub standings: Vec<WireStanding>,
}

/// `GET teams/{id}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeamResponse {
    pub id: u64,
    pub name: String,
    pub short_name: Option<String>,
    pub tla: Option<String>,
    #[serde(default)]
    pub running_competitions: Vec<WireCompetition>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireScoreLine {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

impl From<WireScoreLine> for Score {
    fn from(line: WireScoreLine) -> Self {
        Score {
            home: line.home,
            away: line.away,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireScore {
    pub full_time: WireScoreLine,
    pub half_time: Option<WireScoreLine>,
}

/// `GET matches/{id}` and each element of `GET teams/{id}/matches`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MatchResponse {
    pub id: u64,
    pub utc_date: DateTime<Utc>,
    pub status: String,
    pub matchday: Option<u32>,
    pub competition: Option<WireCompetition>,
    pub home_team: WireTeamRef,
    pub away_team: WireTeamRef,
    pub score: WireScore,
    pub last_updated: Option<DateTime<Utc>>,
}

/// `GET teams/{id}/matches`
#[derive(Debug, Deserialize)]
pub(crate) struct MatchesResponse {
    pub matches: Vec<MatchResponse>,
}

fn team_ref(team: WireTeamRef, side: &str) -> Result<TeamRef, IngestionError> {
    let id = team
        .id
        .ok_or_else(|| IngestionError::Malformed(format!("{} team without id", side)))?;
    Ok(TeamRef::new(id.to_string(), team.name.unwrap_or_default()))
}

fn season_label(season: Option<&WireSeason>) -> String {
    match season {
        Some(WireSeason {
            start_date: Some(start),
            end_date: Some(end),
        }) => format!("{}/{}", start.format("%Y"), end.format("%Y")),
        Some(WireSeason {
            start_date: Some(start),
            ..
        }) => start.format("%Y").to_string(),
        _ => String::new(),
    }
}

impl StandingsResponse {
    /// Build a league from the `TOTAL` table, keyed by `requested_id`.
    ///
    /// The team count is the length of the total table; when the provider
    /// also sends `HOME`/`AWAY` tables they must list the same number of
    /// teams, otherwise the response is treated as partial.
    pub fn into_league(
        self,
        requested_id: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<League, IngestionError> {
        let mut total = None;
        let mut split_counts = Vec::new();
        for standing in self.standings {
            if standing.kind.eq_ignore_ascii_case("TOTAL") {
                total = Some(standing.table);
            } else {
                split_counts.push((standing.kind, standing.table.len()));
            }
        }
        let table =
            total.ok_or_else(|| IngestionError::Malformed("no TOTAL standings table".into()))?;
        let team_count = table.len();

        if let Some((kind, count)) = split_counts.iter().find(|(_, count)| *count != team_count) {
            return Err(IngestionError::Malformed(format!(
                "{} table lists {} teams, TOTAL lists {}",
                kind, count, team_count
            )));
        }

        let standings = table
            .into_iter()
            .map(|row| {
                Ok(StandingEntry {
                    team: team_ref(row.team, "standings")?,
                    rank: row.position,
                    points: row.points,
                    goal_difference: row.goal_difference,
                    played: row.played_games,
                    won: row.won,
                    draw: row.draw,
                    lost: row.lost,
                    goals_for: row.goals_for,
                    goals_against: row.goals_against,
                    form: row.form,
                })
            })
            .collect::<Result<Vec<_>, IngestionError>>()?;

        Ok(League::new(
            requested_id,
            self.competition.name,
            season_label(self.season.as_ref()),
            standings,
            team_count,
            self.competition.last_updated.unwrap_or(fetched_at),
        )?)
    }
}

impl MatchResponse {
    pub fn into_match(self, fetched_at: DateTime<Utc>) -> Result<Match, IngestionError> {
        let competition_id = self
            .competition
            .map(|c| c.code.or_else(|| c.id.map(|id| id.to_string())))
            .unwrap_or_default();

        Ok(Match {
            id: self.id.to_string(),
            competition_id,
            matchday: self.matchday,
            home: team_ref(self.home_team, "home")?,
            away: team_ref(self.away_team, "away")?,
            status: MatchStatus::from_provider(&self.status)?,
            full_time: self.score.full_time.into(),
            half_time: self.score.half_time.map(Score::from).unwrap_or_default(),
            kickoff: self.utc_date,
            last_updated: self.last_updated.unwrap_or(fetched_at),
        })
    }
}

impl TeamResponse {
    /// Combine team details with its finished matches into a stats snapshot.
    pub fn into_team(
        self,
        matches: MatchesResponse,
        fetched_at: DateTime<Utc>,
    ) -> Result<Team, IngestionError> {
        let id = self.id.to_string();

        let mut finished = matches
            .matches
            .into_iter()
            .map(|m| m.into_match(fetched_at))
            .collect::<Result<Vec<_>, _>>()?;
        finished.retain(|m| m.status.is_finished());
        finished.sort_by_key(|m| m.kickoff);

        let results: Vec<(u32, u32)> = finished
            .iter()
            .filter_map(|m| m.goals_for_team(&id))
            .collect();

        let league_id = self
            .running_competitions
            .iter()
            .find(|c| c.kind.as_deref() == Some("LEAGUE"))
            .and_then(|c| c.code.clone());

        Ok(Team {
            id,
            name: self.name,
            short_name: self.short_name,
            tla: self.tla,
            league_id,
            stats: TeamStats::from_results(&results),
            last_updated: self.last_updated.unwrap_or(fetched_at),
        })
    }
}

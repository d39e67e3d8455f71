// MLB Stats API providers: pitcher identity, game logs, lineups and season
// hitting stats.
//
// Response bodies are decoded into private serde structs and reduced by pure
// `parse_*` functions so the parsing can be tested without the network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Deserialize;
use tracing::{debug, warn};

use kcast_baseball::model::{BatterProfile, Hand, PitcherIdentity};
use kcast_baseball::reference::ReferenceData;
use kcast_core::config::LeagueConstants;
use kcast_core::source::{Source, SourceError};

use crate::http::get_json;

pub const MLB_API_BASE: &str = "https://statsapi.mlb.com/api/v1";

/// How far back `mlb-last-lineup` looks for a completed game.
const LAST_LINEUP_LOOKBACK_DAYS: i64 = 10;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PeopleResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    id: u64,
    full_name: String,
    #[serde(default)]
    pitch_hand: Option<Code>,
    #[serde(default)]
    bat_side: Option<Code>,
    #[serde(default)]
    primary_position: Option<Position>,
    #[serde(default)]
    stats: Vec<StatGroup>,
}

#[derive(Debug, Deserialize)]
struct Code {
    code: String,
}

#[derive(Debug, Deserialize)]
struct Position {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    stats: Vec<StatGroup>,
}

#[derive(Debug, Deserialize)]
struct StatGroup {
    #[serde(default)]
    splits: Vec<Split>,
}

#[derive(Debug, Deserialize)]
struct Split {
    #[serde(default)]
    date: Option<String>,
    stat: StatLine,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatLine {
    #[serde(default)]
    strike_outs: Option<u32>,
    #[serde(default)]
    games_started: Option<u32>,
    #[serde(default)]
    plate_appearances: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    dates: Vec<ScheduleDate>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDate {
    #[serde(default)]
    games: Vec<ScheduleGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleGame {
    game_pk: u64,
    teams: Sides<ScheduleTeam>,
    #[serde(default)]
    lineups: Option<Lineups>,
    status: GameStatus,
}

#[derive(Debug, Deserialize)]
struct Sides<T> {
    home: T,
    away: T,
}

#[derive(Debug, Deserialize)]
struct ScheduleTeam {
    team: TeamRef,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Lineups {
    #[serde(default)]
    home_players: Vec<PersonRef>,
    #[serde(default)]
    away_players: Vec<PersonRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonRef {
    full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStatus {
    abstract_game_state: String,
}

#[derive(Debug, Deserialize)]
struct Boxscore {
    teams: Sides<BoxTeam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoxTeam {
    team: TeamRef,
    #[serde(default)]
    batting_order: Vec<u64>,
    #[serde(default)]
    players: HashMap<String, BoxPlayer>,
}

#[derive(Debug, Deserialize)]
struct BoxPlayer {
    person: PersonRef,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn hand_of(code: &Option<Code>) -> Hand {
    code.as_ref()
        .map(|c| Hand::from_code(&c.code))
        .unwrap_or(Hand::Unknown)
}

/// First search hit that plays pitcher (or two-way). Position players never
/// resolve as pitchers.
fn parse_identity(resp: PeopleResponse) -> Option<PitcherIdentity> {
    let is_pitcher = |p: &Person| {
        p.primary_position
            .as_ref()
            .is_some_and(|pos| pos.abbreviation == "P" || pos.abbreviation == "TWP")
    };
    let person = resp.people.into_iter().find(is_pitcher)?;
    Some(PitcherIdentity {
        id: person.id.to_string(),
        hand: hand_of(&person.pitch_hand),
        name: person.full_name,
    })
}

/// Strikeouts per start, oldest first. Relief appearances are dropped.
fn parse_game_logs(resp: StatsResponse) -> Vec<u32> {
    let mut starts: Vec<(String, u32)> = resp
        .stats
        .into_iter()
        .flat_map(|g| g.splits)
        .filter(|s| s.stat.games_started.map_or(true, |gs| gs > 0))
        .filter_map(|s| Some((s.date.unwrap_or_default(), s.stat.strike_outs?)))
        .collect();
    starts.sort_by(|a, b| a.0.cmp(&b.0));
    starts.into_iter().map(|(_, k)| k).collect()
}

/// Posted batting order for `team_id` from a schedule hydrated with lineups.
fn parse_posted_lineup(resp: ScheduleResponse, team_id: u32) -> Option<Vec<String>> {
    resp.dates
        .into_iter()
        .flat_map(|d| d.games)
        .find_map(|game| {
            let lineups = game.lineups?;
            let players = if game.teams.home.team.id == team_id {
                lineups.home_players
            } else if game.teams.away.team.id == team_id {
                lineups.away_players
            } else {
                return None;
            };
            if players.is_empty() {
                None
            } else {
                Some(players.into_iter().map(|p| p.full_name).collect())
            }
        })
}

/// `gamePk` of the latest completed game in the schedule.
fn parse_last_final_game(resp: ScheduleResponse) -> Option<u64> {
    resp.dates
        .into_iter()
        .flat_map(|d| d.games)
        .filter(|g| g.status.abstract_game_state == "Final")
        .map(|g| g.game_pk)
        .last()
}

fn parse_boxscore_lineup(resp: Boxscore, team_id: u32) -> Option<Vec<String>> {
    let side = if resp.teams.home.team.id == team_id {
        resp.teams.home
    } else if resp.teams.away.team.id == team_id {
        resp.teams.away
    } else {
        return None;
    };
    let names: Vec<String> = side
        .batting_order
        .iter()
        .filter_map(|id| side.players.get(&format!("ID{id}")))
        .map(|p| p.person.full_name.clone())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Season hitting line turned into a profile. The Stats API has no whiff or
/// contact-quality data, so whiff rate is scaled from the strikeout rate and
/// xwOBA is left at the league mean.
fn parse_season_profile(resp: PeopleResponse, league: &LeagueConstants) -> Option<BatterProfile> {
    let person = resp.people.into_iter().next()?;
    let line = person.stats.iter().flat_map(|g| &g.splits).next()?;
    let pa = line.stat.plate_appearances.filter(|&pa| pa > 0)?;
    let k_rate = f64::from(line.stat.strike_outs.unwrap_or(0)) / f64::from(pa);
    Some(BatterProfile {
        strikeout_rate: k_rate,
        whiff_rate: (league.whiff_rate_mean * k_rate / league.k_rate_mean).clamp(0.0, 1.0),
        xwoba: league.xwoba_mean,
        batting_hand: hand_of(&person.bat_side),
        plate_appearances: pa,
        is_fallback: false,
        name: person.full_name,
    })
}

/// Batting side from a `people/{id}` lookup.
fn parse_bat_side(resp: PeopleResponse) -> Hand {
    resp.people
        .first()
        .map(|p| hand_of(&p.bat_side))
        .unwrap_or(Hand::Unknown)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Shared state of the Stats API providers.
pub struct MlbApi {
    http: reqwest::Client,
    base_url: String,
    season: i32,
    reference: Arc<ReferenceData>,
    league: LeagueConstants,
}

impl MlbApi {
    pub fn new(
        http: reqwest::Client,
        season: Option<i32>,
        reference: Arc<ReferenceData>,
        league: LeagueConstants,
    ) -> Self {
        Self {
            http,
            base_url: MLB_API_BASE.to_string(),
            season: season.unwrap_or_else(|| Local::now().year()),
            reference,
            league,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn team_id(&self, abbreviation: &str) -> Option<u32> {
        let id = self.reference.team(abbreviation).map(|t| t.mlb_id);
        if id.is_none() {
            warn!(team = abbreviation, "team not in reference table");
        }
        id
    }

    /// Batting side of an MLB player id; `Hand::Unknown` when the record has
    /// none.
    pub async fn bat_side(&self, source_name: &str, player_id: u64) -> Result<Hand, SourceError> {
        let url = self.url(&format!("people/{player_id}"));
        let resp: PeopleResponse = get_json(&self.http, source_name, &url, &[]).await?;
        Ok(parse_bat_side(resp))
    }

    async fn schedule(
        &self,
        source_name: &str,
        team_id: u32,
        start: NaiveDate,
        end: NaiveDate,
        hydrate: Option<&str>,
    ) -> Result<ScheduleResponse, SourceError> {
        let mut query = vec![
            ("sportId", "1".to_string()),
            ("teamId", team_id.to_string()),
            ("startDate", start.format("%Y-%m-%d").to_string()),
            ("endDate", end.format("%Y-%m-%d").to_string()),
        ];
        if let Some(h) = hydrate {
            query.push(("hydrate", h.to_string()));
        }
        get_json(&self.http, source_name, &self.url("schedule"), &query).await
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// `mlb-identity`: people search by name.
pub struct MlbIdentity(pub Arc<MlbApi>);

#[async_trait]
impl Source<PitcherIdentity> for MlbIdentity {
    fn name(&self) -> &str {
        "mlb-identity"
    }

    async fn fetch(&self, pitcher: &str) -> Result<Option<PitcherIdentity>, SourceError> {
        let api = &self.0;
        let query = [("names", pitcher.to_string()), ("sportIds", "1".to_string())];
        let resp: PeopleResponse = get_json(&api.http, self.name(), &api.url("people/search"), &query).await?;
        Ok(parse_identity(resp))
    }
}

/// `mlb-gamelogs`: this season's pitching game log, keyed by player id.
pub struct MlbGameLogs(pub Arc<MlbApi>);

#[async_trait]
impl Source<Vec<u32>> for MlbGameLogs {
    fn name(&self) -> &str {
        "mlb-gamelogs"
    }

    async fn fetch(&self, pitcher_id: &str) -> Result<Option<Vec<u32>>, SourceError> {
        let api = &self.0;
        let query = [
            ("stats", "gameLog".to_string()),
            ("group", "pitching".to_string()),
            ("season", api.season.to_string()),
        ];
        let url = api.url(&format!("people/{pitcher_id}/stats"));
        let resp: StatsResponse = get_json(&api.http, self.name(), &url, &query).await?;
        let logs = parse_game_logs(resp);
        debug!(pitcher_id, starts = logs.len(), "game logs fetched");
        Ok(Some(logs))
    }
}

/// `mlb-posted-lineup`: today's posted batting order.
pub struct PostedLineup(pub Arc<MlbApi>);

#[async_trait]
impl Source<Vec<String>> for PostedLineup {
    fn name(&self) -> &str {
        "mlb-posted-lineup"
    }

    async fn fetch(&self, team: &str) -> Result<Option<Vec<String>>, SourceError> {
        let api = &self.0;
        let Some(team_id) = api.team_id(team) else {
            return Ok(None);
        };
        let today = Local::now().date_naive();
        let resp = api
            .schedule(self.name(), team_id, today, today, Some("lineups"))
            .await?;
        Ok(parse_posted_lineup(resp, team_id))
    }
}

/// `mlb-last-lineup`: batting order of the team's latest completed game.
pub struct LastLineup(pub Arc<MlbApi>);

#[async_trait]
impl Source<Vec<String>> for LastLineup {
    fn name(&self) -> &str {
        "mlb-last-lineup"
    }

    async fn fetch(&self, team: &str) -> Result<Option<Vec<String>>, SourceError> {
        let api = &self.0;
        let Some(team_id) = api.team_id(team) else {
            return Ok(None);
        };
        let today = Local::now().date_naive();
        let start = today - Duration::days(LAST_LINEUP_LOOKBACK_DAYS);
        let schedule = api.schedule(self.name(), team_id, start, today, None).await?;
        let Some(game_pk) = parse_last_final_game(schedule) else {
            return Ok(None);
        };
        let url = api.url(&format!("game/{game_pk}/boxscore"));
        let boxscore: Boxscore = get_json(&api.http, self.name(), &url, &[]).await?;
        Ok(parse_boxscore_lineup(boxscore, team_id))
    }
}

/// `mlb-season-stats`: secondary batter stats from the season hitting line.
pub struct SeasonStats(pub Arc<MlbApi>);

#[async_trait]
impl Source<BatterProfile> for SeasonStats {
    fn name(&self) -> &str {
        "mlb-season-stats"
    }

    async fn fetch(&self, batter: &str) -> Result<Option<BatterProfile>, SourceError> {
        let api = &self.0;
        let query = [
            ("names", batter.to_string()),
            ("sportIds", "1".to_string()),
            (
                "hydrate",
                format!("stats(group=[hitting],type=[season],season={})", api.season),
            ),
        ];
        let resp: PeopleResponse = get_json(&api.http, self.name(), &api.url("people/search"), &query).await?;
        Ok(parse_season_profile(resp, &api.league))
    }
}

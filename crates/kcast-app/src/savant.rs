// Baseball Savant leaderboard providers.
//
// Each leaderboard is one CSV download covering the whole league, fetched on
// first use and kept for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use kcast_baseball::model::{BatterProfile, Hand, PitchType, PitchUsage};
use kcast_core::identity::normalize;
use kcast_core::source::{Source, SourceError};

use crate::http::get_text;
use crate::mlb::MlbApi;

const LEADERBOARD_URL: &str = "https://baseballsavant.mlb.com/leaderboard/custom";
const ARSENAL_URL: &str = "https://baseballsavant.mlb.com/leaderboard/pitch-arsenals";

const STATS_SOURCE: &str = "savant";
const ARSENAL_SOURCE: &str = "savant-arsenal";

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

/// Header positions of a Savant CSV, keyed by lowercase column name.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn read<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Self, String> {
        let headers = reader.headers().map_err(|e| e.to_string())?;
        Ok(Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim_start_matches('\u{feff}').trim().to_lowercase(), i))
                .collect(),
        ))
    }

    fn require(&self, name: &str) -> Result<usize, String> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| format!("missing column `{name}`"))
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }
}

/// Player name as "First Last", from either a combined `last_name,
/// first_name` column or the two separate columns.
fn player_name(columns: &Columns, row: &csv::StringRecord) -> Option<String> {
    if let Some(i) = columns.get("last_name, first_name") {
        let raw = row.get(i)?;
        let (last, first) = raw.split_once(',')?;
        return Some(format!("{} {}", first.trim(), last.trim()));
    }
    let first = row.get(columns.get("first_name")?)?.trim();
    let last = row.get(columns.get("last_name")?)?.trim();
    Some(format!("{first} {last}"))
}

fn number(row: &csv::StringRecord, index: usize) -> Option<f64> {
    row.get(index)?.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One leaderboard row. The leaderboard has no batting side, so the profile
/// carries `Hand::Unknown` until it is looked up by `player_id`.
#[derive(Debug, Clone)]
struct LeaderboardRow {
    profile: BatterProfile,
    player_id: Option<u64>,
}

impl LeaderboardRow {
    fn with_hand(&self, hand: Hand) -> BatterProfile {
        BatterProfile {
            batting_hand: hand,
            ..self.profile.clone()
        }
    }
}

/// Batter rows from the custom leaderboard (`pa`, `k_percent`,
/// `whiff_percent`, `xwoba`), keyed by normalized name.
fn parse_leaderboard(text: &str) -> Result<HashMap<String, LeaderboardRow>, String> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let columns = Columns::read(&mut reader)?;
    let player_id = columns.get("player_id");
    let pa = columns.require("pa")?;
    let k = columns.require("k_percent")?;
    let whiff = columns.require("whiff_percent")?;
    let xwoba = columns.require("xwoba")?;

    let mut profiles = HashMap::new();
    for record in reader.records() {
        let row = record.map_err(|e| e.to_string())?;
        let parsed = player_name(&columns, &row).and_then(|name| {
            Some(BatterProfile {
                name,
                strikeout_rate: number(&row, k)? / 100.0,
                whiff_rate: number(&row, whiff)? / 100.0,
                xwoba: number(&row, xwoba)?,
                batting_hand: Hand::Unknown,
                plate_appearances: number(&row, pa)? as u32,
                is_fallback: false,
            })
        });
        match parsed {
            Some(profile) => {
                let player_id = player_id
                    .and_then(|i| row.get(i))
                    .and_then(|id| id.trim().parse().ok());
                profiles.insert(normalize(&profile.name), LeaderboardRow { profile, player_id });
            }
            None => debug!(row = ?row, "skipping incomplete leaderboard row"),
        }
    }
    Ok(profiles)
}

/// Pitch usage per pitcher id from the arsenal leaderboard (`n_<code>`
/// columns hold usage percentages).
fn parse_arsenals(text: &str) -> Result<HashMap<String, Vec<PitchUsage>>, String> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let columns = Columns::read(&mut reader)?;
    let id = columns
        .get("pitcher")
        .or_else(|| columns.get("player_id"))
        .ok_or_else(|| "missing column `pitcher`".to_string())?;
    let usage_columns: Vec<(PitchType, usize)> = columns
        .0
        .iter()
        .filter_map(|(name, &i)| {
            let code = name.strip_prefix("n_")?;
            code.parse::<PitchType>().ok().map(|p| (p, i))
        })
        .collect();
    if usage_columns.is_empty() {
        return Err("no `n_<pitch>` usage columns".to_string());
    }

    let mut arsenals = HashMap::new();
    for record in reader.records() {
        let row = record.map_err(|e| e.to_string())?;
        let Some(pitcher_id) = row.get(id).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };

        let mut by_type: HashMap<PitchType, f64> = HashMap::new();
        for &(pitch, i) in &usage_columns {
            if let Some(pct) = number(&row, i).filter(|p| *p > 0.0) {
                *by_type.entry(pitch).or_insert(0.0) += pct / 100.0;
            }
        }
        let mut arsenal: Vec<PitchUsage> = by_type
            .into_iter()
            .map(|(pitch, usage)| PitchUsage {
                pitch,
                usage: usage.min(1.0),
            })
            .collect();
        arsenal.sort_by(|a, b| b.usage.total_cmp(&a.usage));
        arsenals.insert(pitcher_id.to_string(), arsenal);
    }
    Ok(arsenals)
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

fn season_or_current(season: Option<i32>) -> i32 {
    season.unwrap_or_else(|| Local::now().year())
}

/// `savant`: primary batter stats, with batting side from the MLB people
/// record.
pub struct SavantStats {
    http: reqwest::Client,
    season: i32,
    mlb: Arc<MlbApi>,
    table: OnceCell<HashMap<String, LeaderboardRow>>,
}

impl SavantStats {
    pub fn new(http: reqwest::Client, season: Option<i32>, mlb: Arc<MlbApi>) -> Self {
        Self {
            http,
            season: season_or_current(season),
            mlb,
            table: OnceCell::new(),
        }
    }

    async fn table(&self) -> Result<&HashMap<String, LeaderboardRow>, SourceError> {
        self.table
            .get_or_try_init(|| async {
                let query = [
                    ("year", self.season.to_string()),
                    ("type", "batter".to_string()),
                    ("min", "1".to_string()),
                    ("selections", "pa,k_percent,whiff_percent,xwoba".to_string()),
                    ("csv", "true".to_string()),
                ];
                let text = get_text(&self.http, STATS_SOURCE, LEADERBOARD_URL, &query).await?;
                let table = parse_leaderboard(&text)
                    .map_err(|e| SourceError::malformed(STATS_SOURCE, e))?;
                info!(batters = table.len(), season = self.season, "Savant leaderboard loaded");
                Ok(table)
            })
            .await
    }
}

#[async_trait]
impl Source<BatterProfile> for SavantStats {
    fn name(&self) -> &str {
        STATS_SOURCE
    }

    async fn fetch(&self, batter: &str) -> Result<Option<BatterProfile>, SourceError> {
        let Some(row) = self.table().await?.get(&normalize(batter)) else {
            return Ok(None);
        };
        let Some(player_id) = row.player_id else {
            return Ok(Some(row.profile.clone()));
        };
        let hand = match self.mlb.bat_side(STATS_SOURCE, player_id).await {
            Ok(hand) => hand,
            Err(e) => {
                warn!(batter, player_id, "bat side lookup failed: {e}");
                Hand::Unknown
            }
        };
        Ok(Some(row.with_hand(hand)))
    }
}

/// `savant-arsenal`: pitch mix keyed by MLB player id.
pub struct SavantArsenal {
    http: reqwest::Client,
    season: i32,
    table: OnceCell<HashMap<String, Vec<PitchUsage>>>,
}

impl SavantArsenal {
    pub fn new(http: reqwest::Client, season: Option<i32>) -> Self {
        Self {
            http,
            season: season_or_current(season),
            table: OnceCell::new(),
        }
    }

    async fn table(&self) -> Result<&HashMap<String, Vec<PitchUsage>>, SourceError> {
        self.table
            .get_or_try_init(|| async {
                let query = [
                    ("year", self.season.to_string()),
                    ("min", "1".to_string()),
                    ("type", "n_".to_string()),
                    ("csv", "true".to_string()),
                ];
                let text = get_text(&self.http, ARSENAL_SOURCE, ARSENAL_URL, &query).await?;
                let table =
                    parse_arsenals(&text).map_err(|e| SourceError::malformed(ARSENAL_SOURCE, e))?;
                info!(pitchers = table.len(), season = self.season, "Savant arsenals loaded");
                Ok(table)
            })
            .await
    }
}

#[async_trait]
impl Source<Vec<PitchUsage>> for SavantArsenal {
    fn name(&self) -> &str {
        ARSENAL_SOURCE
    }

    async fn fetch(&self, pitcher_id: &str) -> Result<Option<Vec<PitchUsage>>, SourceError> {
        Ok(self.table().await?.get(pitcher_id.trim()).cloned())
    }
}

// Static reference tables: teams, park factors, team trends, Stuff+ ratings,
// custom lineup overrides and manual market lines.
//
// Loaded once at startup and shared read-only (`Arc<ReferenceData>`).

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use kcast_core::config::DataPaths;
use kcast_core::identity::normalize;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TeamInfo {
    pub abbreviation: String,
    pub name: String,
    /// MLB Stats API team id.
    pub mlb_id: u32,
}

/// Opposing-team plate discipline used by the team and contextual modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamTrend {
    pub k_rate: f64,
    /// Chase rate on 0-2 counts.
    pub chase_two_strike: Option<f64>,
    pub first_pitch_swing: Option<f64>,
}

/// All static reference tables. Keys are normalized (`identity::normalize`)
/// except team abbreviations, which are uppercased.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub teams: HashMap<String, TeamInfo>,
    pub park_factors: HashMap<String, f64>,
    pub team_trends: HashMap<String, TeamTrend>,
    pub stuff_plus: HashMap<String, f64>,
    pub custom_lineups: HashMap<String, Vec<String>>,
    pub manual_lines: HashMap<String, f64>,
}

impl ReferenceData {
    pub fn team(&self, abbreviation: &str) -> Option<&TeamInfo> {
        self.teams.get(&team_key(abbreviation))
    }

    pub fn park_factor(&self, park: &str) -> Option<f64> {
        self.park_factors.get(&normalize(park)).copied()
    }

    pub fn team_trend(&self, abbreviation: &str) -> Option<&TeamTrend> {
        self.team_trends.get(&team_key(abbreviation))
    }

    pub fn stuff_plus(&self, pitcher: &str) -> Option<f64> {
        self.stuff_plus.get(&normalize(pitcher)).copied()
    }

    pub fn custom_lineup(&self, abbreviation: &str) -> Option<&[String]> {
        self.custom_lineups
            .get(&team_key(abbreviation))
            .map(Vec::as_slice)
    }

    pub fn manual_line(&self, pitcher: &str) -> Option<f64> {
        self.manual_lines.get(&normalize(pitcher)).copied()
    }
}

pub fn team_key(abbreviation: &str) -> String {
    abbreviation.trim().to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTeam {
    abbreviation: String,
    name: String,
    mlb_id: u32,
}

#[derive(Debug, Deserialize)]
struct RawPark {
    park: String,
    k_factor: f64,
}

#[derive(Debug, Deserialize)]
struct RawTrend {
    team: String,
    k_rate: f64,
    #[serde(default)]
    chase_two_strike: Option<f64>,
    #[serde(default)]
    first_pitch_swing: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPitcherValue {
    pitcher: String,
    value: f64,
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

fn load_teams_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, TeamInfo>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut teams = HashMap::new();
    for result in reader.deserialize::<RawTeam>() {
        match result {
            Ok(raw) => {
                let abbreviation = team_key(&raw.abbreviation);
                teams.insert(
                    abbreviation.clone(),
                    TeamInfo {
                        abbreviation,
                        name: raw.name.trim().to_string(),
                        mlb_id: raw.mlb_id,
                    },
                );
            }
            Err(e) => warn!("skipping malformed team row: {}", e),
        }
    }
    Ok(teams)
}

fn load_parks_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, f64>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut parks = HashMap::new();
    for result in reader.deserialize::<RawPark>() {
        match result {
            Ok(raw) if raw.k_factor.is_finite() && raw.k_factor > 0.0 => {
                parks.insert(normalize(&raw.park), raw.k_factor);
            }
            Ok(raw) => warn!("skipping park '{}': implausible k_factor", raw.park.trim()),
            Err(e) => warn!("skipping malformed park row: {}", e),
        }
    }
    Ok(parks)
}

fn load_trends_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, TeamTrend>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut trends = HashMap::new();
    for result in reader.deserialize::<RawTrend>() {
        match result {
            Ok(raw) if raw.k_rate.is_finite() && raw.k_rate > 0.0 => {
                trends.insert(
                    team_key(&raw.team),
                    TeamTrend {
                        k_rate: raw.k_rate,
                        chase_two_strike: raw.chase_two_strike.filter(|v| v.is_finite()),
                        first_pitch_swing: raw.first_pitch_swing.filter(|v| v.is_finite()),
                    },
                );
            }
            Ok(raw) => warn!("skipping trend for '{}': implausible k_rate", raw.team.trim()),
            Err(e) => warn!("skipping malformed team trend row: {}", e),
        }
    }
    Ok(trends)
}

/// Loads `pitcher,value` tables (Stuff+ ratings, manual lines).
fn load_pitcher_values_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, f64>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut map = HashMap::new();
    for result in reader.deserialize::<RawPitcherValue>() {
        match result {
            Ok(raw) if raw.value.is_finite() => {
                let key = normalize(&raw.pitcher);
                if map.contains_key(&key) {
                    warn!("duplicate entry for '{}', using latest value", raw.pitcher.trim());
                }
                map.insert(key, raw.value);
            }
            Ok(raw) => warn!("skipping '{}': non-finite value", raw.pitcher.trim()),
            Err(e) => warn!("skipping malformed row: {}", e),
        }
    }
    Ok(map)
}

fn load_custom_lineups_from_reader<R: Read>(
    rdr: R,
) -> Result<HashMap<String, Vec<String>>, serde_json::Error> {
    let raw: HashMap<String, Vec<String>> = serde_json::from_reader(rdr)?;
    Ok(raw
        .into_iter()
        .map(|(team, names)| {
            let names = names.into_iter().map(|n| n.trim().to_string()).collect();
            (team_key(&team), names)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, ReferenceError> {
    std::fs::File::open(path).map_err(|e| ReferenceError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn csv_table<T>(
    path: &Path,
    load: impl FnOnce(std::fs::File) -> Result<T, csv::Error>,
) -> Result<T, ReferenceError> {
    load(open(path)?).map_err(|e| ReferenceError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load every reference table named in `paths`, relative to `base_dir`.
pub fn load_all(paths: &DataPaths, base_dir: &Path) -> Result<ReferenceData, ReferenceError> {
    let custom_path = base_dir.join(&paths.custom_lineups);
    let custom_lineups =
        load_custom_lineups_from_reader(open(&custom_path)?).map_err(|e| ReferenceError::Json {
            path: custom_path.display().to_string(),
            source: e,
        })?;

    Ok(ReferenceData {
        teams: csv_table(&base_dir.join(&paths.teams), load_teams_from_reader)?,
        park_factors: csv_table(&base_dir.join(&paths.parks), load_parks_from_reader)?,
        team_trends: csv_table(&base_dir.join(&paths.team_trends), load_trends_from_reader)?,
        stuff_plus: csv_table(
            &base_dir.join(&paths.stuff_plus),
            load_pitcher_values_from_reader,
        )?,
        custom_lineups,
        manual_lines: csv_table(
            &base_dir.join(&paths.manual_lines),
            load_pitcher_values_from_reader,
        )?,
    })
}

// Configuration loading and parsing (kcast.toml, credentials.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub sources: SourcesConfig,
    pub market: MarketConfig,
    pub projection: ProjectionTuning,
    pub simulation: SimulationConfig,
    pub league: LeagueConstants,
    pub modifiers: ModifierConfig,
    pub pitch_weights: HashMap<String, PitchWeights>,
    pub data_paths: DataPaths,
    pub credentials: CredentialsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            sources: SourcesConfig::default(),
            market: MarketConfig::default(),
            projection: ProjectionTuning::default(),
            simulation: SimulationConfig::default(),
            league: LeagueConstants::default(),
            modifiers: ModifierConfig::default(),
            pitch_weights: default_pitch_weights(),
            data_paths: DataPaths::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// kcast.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire kcast.toml file. Every section
/// is optional and falls back to the built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct KcastFile {
    cache: CacheConfig,
    retry: RetryConfig,
    http: HttpConfig,
    sources: SourcesConfig,
    market: MarketConfig,
    projection: ProjectionTuning,
    simulation: SimulationConfig,
    league: LeagueConstants,
    modifiers: ModifierConfig,
    pitch_weights: Option<HashMap<String, PitchWeights>>,
    data_paths: DataPaths,
}

/// Cache location and per-family TTLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file. Empty means the platform cache directory.
    pub path: String,
    pub lineup_ttl_hours: u64,
    pub stats_ttl_hours: u64,
    pub market_ttl_hours: u64,
    pub identity_ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            lineup_ttl_hours: 2,
            stats_ttl_hours: 6,
            market_ttl_hours: 6,
            identity_ttl_hours: 24,
        }
    }
}

impl CacheConfig {
    pub fn lineup_ttl(&self) -> Duration {
        hours(self.lineup_ttl_hours)
    }

    pub fn stats_ttl(&self) -> Duration {
        hours(self.stats_ttl_hours)
    }

    pub fn market_ttl(&self) -> Duration {
        hours(self.market_ttl_hours)
    }

    pub fn identity_ttl(&self) -> Duration {
        hours(self.identity_ttl_hours)
    }

    /// Longest TTL of any family; entries older than this are never read.
    pub fn max_ttl(&self) -> Duration {
        [
            self.lineup_ttl(),
            self.stats_ttl(),
            self.market_ttl(),
            self.identity_ttl(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }

    /// Resolve the cache database path, defaulting to the platform cache dir.
    pub fn resolved_path(&self) -> PathBuf {
        if !self.path.is_empty() {
            return PathBuf::from(&self.path);
        }
        match directories::ProjectDirs::from("", "", "kcast") {
            Some(dirs) => dirs.cache_dir().join("kcast-cache.db"),
            None => PathBuf::from("kcast-cache.db"),
        }
    }
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "kcast/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourcesConfig {
    /// Season to query. `None` means the current calendar year.
    pub season: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Line used when neither a provider nor the manual table knows the pitcher.
    pub default_line: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self { default_line: 6.5 }
    }
}

/// Tunable constants of the projection engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionTuning {
    pub ewma_alpha: f64,
    pub max_game_logs: usize,
    /// Baseline strikeouts per start when a pitcher has no game logs.
    pub league_baseline: f64,
    pub min_logs_for_dispersion: usize,
    pub default_dispersion: f64,
    pub dispersion_scale: f64,
    pub dispersion_floor: f64,
    pub market_reference_line: f64,
    pub market_floor: f64,
    pub market_swing: f64,
    pub modifier_min: f64,
    pub modifier_max: f64,
    pub max_strikeouts: f64,
    pub over_thresholds: Vec<f64>,
}

impl Default for ProjectionTuning {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.3,
            max_game_logs: 15,
            league_baseline: 5.0,
            min_logs_for_dispersion: 5,
            default_dispersion: 1.5,
            dispersion_scale: 0.75,
            dispersion_floor: 1.0,
            market_reference_line: 6.5,
            market_floor: 0.95,
            market_swing: 0.10,
            modifier_min: 0.85,
            modifier_max: 1.15,
            max_strikeouts: 15.0,
            over_thresholds: vec![5.5, 6.5, 7.5],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub draws: usize,
    /// Fixed seed for reproducible runs. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            draws: 10_000,
            seed: None,
        }
    }
}

/// League-wide means and standard deviations used for z-scores, fallback
/// profiles and contextual modifiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeagueConstants {
    pub k_rate_mean: f64,
    pub k_rate_sd: f64,
    pub whiff_rate_mean: f64,
    pub whiff_rate_sd: f64,
    pub xwoba_mean: f64,
    pub xwoba_sd: f64,
    pub chase_two_strike: f64,
    pub first_pitch_swing: f64,
}

impl Default for LeagueConstants {
    fn default() -> Self {
        Self {
            k_rate_mean: 0.225,
            k_rate_sd: 0.055,
            whiff_rate_mean: 0.245,
            whiff_rate_sd: 0.055,
            xwoba_mean: 0.315,
            xwoba_sd: 0.035,
            chase_two_strike: 0.30,
            first_pitch_swing: 0.29,
        }
    }
}

/// Scales that turn raw inputs into multiplicative modifiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    pub matchup_scale: f64,
    pub platoon_same_hand: f64,
    pub platoon_opposite_hand: f64,
    pub platoon_switch: f64,
    pub team_min: f64,
    pub team_max: f64,
    pub chase_sensitivity: f64,
    pub first_pitch_sensitivity: f64,
    pub stuff_per_point: f64,
    pub context_min: f64,
    pub context_max: f64,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            matchup_scale: 0.075,
            platoon_same_hand: 1.04,
            platoon_opposite_hand: 0.96,
            platoon_switch: 0.98,
            team_min: 0.90,
            team_max: 1.10,
            chase_sensitivity: 0.25,
            first_pitch_sensitivity: 0.15,
            stuff_per_point: 0.003,
            context_min: 0.95,
            context_max: 1.05,
        }
    }
}

/// Per-pitch-type weights over (strikeout rate, whiff rate, contact quality).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PitchWeights {
    pub strikeout: f64,
    pub whiff: f64,
    pub contact: f64,
}

impl PitchWeights {
    pub const fn new(strikeout: f64, whiff: f64, contact: f64) -> Self {
        Self {
            strikeout,
            whiff,
            contact,
        }
    }

    pub fn sum(&self) -> f64 {
        self.strikeout + self.whiff + self.contact
    }
}

/// Key of the weights used for pitch types missing from the table.
pub const DEFAULT_PITCH_WEIGHTS_KEY: &str = "default";

pub fn default_pitch_weights() -> HashMap<String, PitchWeights> {
    [
        ("FF", PitchWeights::new(0.40, 0.40, 0.20)),
        ("SI", PitchWeights::new(0.45, 0.25, 0.30)),
        ("FC", PitchWeights::new(0.35, 0.40, 0.25)),
        ("SL", PitchWeights::new(0.30, 0.50, 0.20)),
        ("ST", PitchWeights::new(0.30, 0.50, 0.20)),
        ("CU", PitchWeights::new(0.35, 0.45, 0.20)),
        ("CH", PitchWeights::new(0.30, 0.45, 0.25)),
        ("FS", PitchWeights::new(0.30, 0.50, 0.20)),
        (DEFAULT_PITCH_WEIGHTS_KEY, PitchWeights::new(0.40, 0.40, 0.20)),
    ]
    .into_iter()
    .map(|(k, w)| (k.to_string(), w))
    .collect()
}

/// Static reference files, relative to the working directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub teams: String,
    pub parks: String,
    pub team_trends: String,
    pub stuff_plus: String,
    pub custom_lineups: String,
    pub manual_lines: String,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            teams: "data/teams.csv".into(),
            parks: "data/parks.csv".into(),
            team_trends: "data/team_trends.csv".into(),
            stuff_plus: "data/stuff_plus.csv".into(),
            custom_lineups: "data/custom_lineups.json".into(),
            manual_lines: "data/manual_lines.csv".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub odds_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/kcast.toml` and (optionally)
/// `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- kcast.toml (required) ---
    let main_path = config_dir.join("kcast.toml");
    let main_text = read_file(&main_path)?;
    let file: KcastFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        cache: file.cache,
        retry: file.retry,
        http: file.http,
        sources: file.sources,
        market: file.market,
        projection: file.projection,
        simulation: file.simulation,
        league: file.league,
        modifiers: file.modifiers,
        pitch_weights: file.pitch_weights.unwrap_or_else(default_pitch_weights),
        data_paths: file.data_paths,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&path, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", path.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts", "must be at least 1"));
    }
    if config.retry.timeout_secs == 0 {
        return Err(invalid("retry.timeout_secs", "must be greater than 0"));
    }

    let p = &config.projection;
    if !(p.ewma_alpha > 0.0 && p.ewma_alpha <= 1.0) {
        return Err(invalid(
            "projection.ewma_alpha",
            format!("must be in (0, 1], got {}", p.ewma_alpha),
        ));
    }
    if p.max_game_logs == 0 {
        return Err(invalid("projection.max_game_logs", "must be greater than 0"));
    }
    let positive: &[(&str, f64)] = &[
        ("projection.league_baseline", p.league_baseline),
        ("projection.default_dispersion", p.default_dispersion),
        ("projection.dispersion_floor", p.dispersion_floor),
        ("projection.max_strikeouts", p.max_strikeouts),
    ];
    for (name, val) in positive {
        if !(val.is_finite() && *val > 0.0) {
            return Err(invalid(*name, format!("must be > 0, got {val}")));
        }
    }
    if !(p.modifier_min > 0.0 && p.modifier_min <= 1.0 && p.modifier_max >= 1.0) {
        return Err(invalid(
            "projection.modifier_min",
            format!(
                "modifier bounds must straddle 1.0, got [{}, {}]",
                p.modifier_min, p.modifier_max
            ),
        ));
    }
    if !(p.market_floor.is_finite() && p.market_floor > 0.0) {
        return Err(invalid(
            "projection.market_floor",
            format!("must be > 0, got {}", p.market_floor),
        ));
    }
    if !(p.market_swing.is_finite() && p.market_swing >= 0.0) {
        return Err(invalid(
            "projection.market_swing",
            format!("must be >= 0, got {}", p.market_swing),
        ));
    }
    if p.over_thresholds.is_empty() {
        return Err(invalid("projection.over_thresholds", "must not be empty"));
    }

    if config.simulation.draws == 0 {
        return Err(invalid("simulation.draws", "must be greater than 0"));
    }

    let l = &config.league;
    let sds: &[(&str, f64)] = &[
        ("league.k_rate_mean", l.k_rate_mean),
        ("league.whiff_rate_mean", l.whiff_rate_mean),
        ("league.xwoba_mean", l.xwoba_mean),
        ("league.k_rate_sd", l.k_rate_sd),
        ("league.whiff_rate_sd", l.whiff_rate_sd),
        ("league.xwoba_sd", l.xwoba_sd),
        ("league.chase_two_strike", l.chase_two_strike),
        ("league.first_pitch_swing", l.first_pitch_swing),
    ];
    for (name, val) in sds {
        if !(val.is_finite() && *val > 0.0) {
            return Err(invalid(*name, format!("must be > 0, got {val}")));
        }
    }

    let m = &config.modifiers;
    if m.team_min > m.team_max {
        return Err(invalid("modifiers.team_min", "must not exceed modifiers.team_max"));
    }
    if m.context_min > m.context_max {
        return Err(invalid(
            "modifiers.context_min",
            "must not exceed modifiers.context_max",
        ));
    }

    if !config.pitch_weights.contains_key(DEFAULT_PITCH_WEIGHTS_KEY) {
        return Err(invalid(
            "pitch_weights",
            format!("missing `{DEFAULT_PITCH_WEIGHTS_KEY}` entry"),
        ));
    }
    for (pitch, w) in &config.pitch_weights {
        if w.strikeout < 0.0 || w.whiff < 0.0 || w.contact < 0.0 {
            return Err(invalid(
                format!("pitch_weights.{pitch}"),
                "weights must be non-negative",
            ));
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(invalid(
                format!("pitch_weights.{pitch}"),
                format!("weights must sum to 1, got {}", w.sum()),
            ));
        }
    }

    if !(config.market.default_line.is_finite() && config.market.default_line > 0.0) {
        return Err(invalid("market.default_line", "must be > 0"));
    }

    Ok(())
}

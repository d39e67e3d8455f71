// Domain types shared by the resolvers, the scorers and the projection engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use kcast_core::config::LeagueConstants;

// ---------------------------------------------------------------------------
// Handedness
// ---------------------------------------------------------------------------

/// Batting or throwing hand. `Switch` only applies to batters; `Unknown` is
/// used for synthesized or incomplete profiles and is platoon-neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
    Switch,
    Unknown,
}

impl Hand {
    /// Parse an MLB-style hand code (`L`, `R`, `S`/`B`).
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "L" | "LEFT" => Hand::Left,
            "R" | "RIGHT" => Hand::Right,
            "S" | "B" | "SWITCH" => Hand::Switch,
            _ => Hand::Unknown,
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Hand::Left => "L",
            Hand::Right => "R",
            Hand::Switch => "S",
            Hand::Unknown => "?",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Pitches
// ---------------------------------------------------------------------------

/// Statcast pitch type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchType {
    /// Four-seam fastball.
    FF,
    SI,
    FC,
    SL,
    /// Sweeper.
    ST,
    CU,
    KC,
    CH,
    FS,
    Other,
}

impl PitchType {
    pub fn code(&self) -> &'static str {
        match self {
            PitchType::FF => "FF",
            PitchType::SI => "SI",
            PitchType::FC => "FC",
            PitchType::SL => "SL",
            PitchType::ST => "ST",
            PitchType::CU => "CU",
            PitchType::KC => "KC",
            PitchType::CH => "CH",
            PitchType::FS => "FS",
            PitchType::Other => "OTHER",
        }
    }
}

impl FromStr for PitchType {
    type Err = std::convert::Infallible;

    /// Unrecognized codes map to `Other` rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "FF" | "FA" => PitchType::FF,
            "SI" | "FT" => PitchType::SI,
            "FC" => PitchType::FC,
            "SL" => PitchType::SL,
            "ST" | "SV" => PitchType::ST,
            "CU" => PitchType::CU,
            "KC" => PitchType::KC,
            "CH" => PitchType::CH,
            "FS" => PitchType::FS,
            _ => PitchType::Other,
        })
    }
}

impl fmt::Display for PitchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Share of a pitcher's pitches thrown as one type, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchUsage {
    pub pitch: PitchType,
    pub usage: f64,
}

/// Does the arsenal include `pitch` with non-zero usage?
pub fn throws(arsenal: &[PitchUsage], pitch: PitchType) -> bool {
    arsenal.iter().any(|p| p.pitch == pitch && p.usage > 0.0)
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Canonical identity of a pitcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitcherIdentity {
    pub id: String,
    pub name: String,
    pub hand: Hand,
}

/// Per-batter performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterProfile {
    pub name: String,
    pub strikeout_rate: f64,
    pub whiff_rate: f64,
    pub xwoba: f64,
    pub batting_hand: Hand,
    pub plate_appearances: u32,
    /// Synthesized from league averages rather than sourced.
    pub is_fallback: bool,
}

impl BatterProfile {
    /// League-average stand-in for a batter nobody could describe.
    pub fn league_average(name: &str, league: &LeagueConstants) -> Self {
        Self {
            name: name.to_string(),
            strikeout_rate: league.k_rate_mean,
            whiff_rate: league.whiff_rate_mean,
            xwoba: league.xwoba_mean,
            batting_hand: Hand::Unknown,
            plate_appearances: 0,
            is_fallback: true,
        }
    }

    /// Rates are finite and in range.
    pub fn is_plausible(&self) -> bool {
        let rate = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
        rate(self.strikeout_rate)
            && rate(self.whiff_rate)
            && self.xwoba.is_finite()
            && (0.0..=2.5).contains(&self.xwoba)
    }
}

// ---------------------------------------------------------------------------
// Lineups
// ---------------------------------------------------------------------------

/// One batting-order slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupSlot {
    pub name: String,
    pub is_fallback: bool,
}

/// The opposing batting order with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineup {
    pub slots: Vec<LineupSlot>,
    pub source: String,
    pub cached: bool,
}

impl Lineup {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.slots.iter().all(|s| s.is_fallback)
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Where a market line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketSource {
    OddsApi,
    SportsbookReview,
    ManualFallback,
    Cache,
}

impl MarketSource {
    pub fn tag(&self) -> &'static str {
        match self {
            MarketSource::OddsApi => "odds-api",
            MarketSource::SportsbookReview => "sportsbook-review",
            MarketSource::ManualFallback => "manual-fallback",
            MarketSource::Cache => "cache",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "odds-api" => Some(MarketSource::OddsApi),
            "sportsbook-review" => Some(MarketSource::SportsbookReview),
            "manual-fallback" => Some(MarketSource::ManualFallback),
            "cache" => Some(MarketSource::Cache),
            _ => None,
        }
    }
}

impl fmt::Display for MarketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Resolved strikeout line for a pitcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketLine {
    pub value: f64,
    /// Source that originally quoted the line.
    pub source: MarketSource,
    pub cached: bool,
}

impl MarketLine {
    /// Source as reported: `cache` when served from cache.
    pub fn reported_source(&self) -> MarketSource {
        if self.cached {
            MarketSource::Cache
        } else {
            self.source
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One game to project: the starting pitcher, the opponent's team
/// abbreviation and the park (may be empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRequest {
    pub pitcher: String,
    pub opponent: String,
    #[serde(default)]
    pub park: String,
}

impl GameRequest {
    pub fn new(pitcher: impl Into<String>, opponent: impl Into<String>, park: impl Into<String>) -> Self {
        Self {
            pitcher: pitcher.into(),
            opponent: opponent.into(),
            park: park.into(),
        }
    }
}

// Multiplicative adjustments to the baseline and their weighted aggregate.
//
// Every modifier is centered at 1.0. The four primary modifiers are blended
// with arsenal/handedness-dependent weights; the contextual product then
// scales the blend and the result is clamped to the configured band.

use serde::{Deserialize, Serialize};

use kcast_core::config::{Config, LeagueConstants, ModifierConfig};

use crate::model::{throws, BatterProfile, Hand, PitchType, PitchUsage, PitcherIdentity};
use crate::reference::ReferenceData;
use crate::vulnerability::VulnerabilityScorer;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Secondary situational factors, each clamped to the context band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextualModifiers {
    pub chase_two_strike: f64,
    pub first_pitch_aggression: f64,
    pub stuff: f64,
}

impl ContextualModifiers {
    pub const NEUTRAL: Self = Self {
        chase_two_strike: 1.0,
        first_pitch_aggression: 1.0,
        stuff: 1.0,
    };

    pub fn product(&self) -> f64 {
        self.chase_two_strike * self.first_pitch_aggression * self.stuff
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub matchup: f64,
    pub platoon: f64,
    pub park: f64,
    pub team: f64,
    pub contextual: ContextualModifiers,
}

impl ModifierSet {
    pub const NEUTRAL: Self = Self {
        matchup: 1.0,
        platoon: 1.0,
        park: 1.0,
        team: 1.0,
        contextual: ContextualModifiers::NEUTRAL,
    };

    fn primary(&self) -> [f64; 4] {
        [self.matchup, self.platoon, self.park, self.team]
    }
}

/// Blend weights over `[matchup, platoon, park, team]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifierWeights(pub [f64; 4]);

const SLIDER_FASTBALL_WEIGHTS: ModifierWeights = ModifierWeights([0.50, 0.25, 0.15, 0.10]);
const CURVEBALL_WEIGHTS: ModifierWeights = ModifierWeights([0.35, 0.35, 0.20, 0.10]);
const LEFTY_WEIGHTS: ModifierWeights = ModifierWeights([0.45, 0.25, 0.20, 0.10]);
const DEFAULT_WEIGHTS: ModifierWeights = ModifierWeights([0.40, 0.30, 0.20, 0.10]);

/// Pick blend weights from the arsenal and throwing hand. First match wins.
pub fn dynamic_weights(arsenal: &[PitchUsage], hand: Hand) -> ModifierWeights {
    if throws(arsenal, PitchType::SL) && throws(arsenal, PitchType::FF) {
        SLIDER_FASTBALL_WEIGHTS
    } else if throws(arsenal, PitchType::CU) {
        CURVEBALL_WEIGHTS
    } else if hand == Hand::Left {
        LEFTY_WEIGHTS
    } else {
        DEFAULT_WEIGHTS
    }
}

/// `clamp((1 + Σ w_i (m_i - 1)) * contextual, min, max)`.
pub fn aggregate(set: &ModifierSet, weights: ModifierWeights, min: f64, max: f64) -> f64 {
    let blended = 1.0
        + set
            .primary()
            .iter()
            .zip(weights.0)
            .map(|(m, w)| w * (m - 1.0))
            .sum::<f64>();
    (blended * set.contextual.product()).clamp(min, max)
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Everything the modifiers are derived from for one game.
pub struct ModifierInputs<'a> {
    pub pitcher: &'a PitcherIdentity,
    pub arsenal: &'a [PitchUsage],
    pub batters: &'a [BatterProfile],
    pub opponent: &'a str,
    pub park: &'a str,
}

pub fn derive(inputs: &ModifierInputs<'_>, reference: &ReferenceData, config: &Config) -> ModifierSet {
    let scorer = VulnerabilityScorer::new(&config.league, &config.pitch_weights);
    ModifierSet {
        matchup: matchup(&scorer, inputs.arsenal, inputs.batters, config.modifiers.matchup_scale),
        platoon: platoon(inputs.pitcher.hand, inputs.batters, &config.modifiers),
        park: park(reference, inputs.park),
        team: team(reference, inputs.opponent, &config.league, &config.modifiers),
        contextual: contextual(
            reference,
            &inputs.pitcher.name,
            inputs.opponent,
            &config.league,
            &config.modifiers,
        ),
    }
}

/// `1 + scale * S` with `S` the usage-weighted lineup vulnerability.
pub fn matchup(
    scorer: &VulnerabilityScorer<'_>,
    arsenal: &[PitchUsage],
    batters: &[BatterProfile],
    scale: f64,
) -> f64 {
    let thrown: Vec<&PitchUsage> = arsenal
        .iter()
        .filter(|p| p.usage.is_finite() && p.usage > 0.0)
        .collect();
    let total_usage: f64 = thrown.iter().map(|p| p.usage).sum();

    let score = if total_usage > 0.0 {
        thrown
            .iter()
            .map(|p| p.usage * scorer.lineup_mean(batters, p.pitch))
            .sum::<f64>()
            / total_usage
    } else {
        scorer.lineup_mean(batters, PitchType::Other)
    };
    1.0 + scale * score
}

fn platoon_factor(pitcher: Hand, batter: Hand, cfg: &ModifierConfig) -> f64 {
    match (pitcher, batter) {
        (Hand::Unknown | Hand::Switch, _) | (_, Hand::Unknown) => 1.0,
        (_, Hand::Switch) => cfg.platoon_switch,
        (p, b) if p == b => cfg.platoon_same_hand,
        _ => cfg.platoon_opposite_hand,
    }
}

/// Lineup mean of the per-batter handedness factor.
pub fn platoon(pitcher: Hand, batters: &[BatterProfile], cfg: &ModifierConfig) -> f64 {
    if batters.is_empty() {
        return 1.0;
    }
    batters
        .iter()
        .map(|b| platoon_factor(pitcher, b.batting_hand, cfg))
        .sum::<f64>()
        / batters.len() as f64
}

pub fn park(reference: &ReferenceData, park: &str) -> f64 {
    if park.trim().is_empty() {
        return 1.0;
    }
    reference.park_factor(park).unwrap_or(1.0)
}

pub fn team(
    reference: &ReferenceData,
    opponent: &str,
    league: &LeagueConstants,
    cfg: &ModifierConfig,
) -> f64 {
    match reference.team_trend(opponent) {
        Some(trend) => (trend.k_rate / league.k_rate_mean).clamp(cfg.team_min, cfg.team_max),
        None => 1.0,
    }
}

pub fn contextual(
    reference: &ReferenceData,
    pitcher: &str,
    opponent: &str,
    league: &LeagueConstants,
    cfg: &ModifierConfig,
) -> ContextualModifiers {
    let band = |x: f64| x.clamp(cfg.context_min, cfg.context_max);
    let trend = reference.team_trend(opponent);

    let chase_two_strike = trend
        .and_then(|t| t.chase_two_strike)
        .map(|chase| band(1.0 + cfg.chase_sensitivity * (chase / league.chase_two_strike - 1.0)))
        .unwrap_or(1.0);
    // Aggressive first-pitch swingers put the ball in play early.
    let first_pitch_aggression = trend
        .and_then(|t| t.first_pitch_swing)
        .map(|fps| band(1.0 - cfg.first_pitch_sensitivity * (fps / league.first_pitch_swing - 1.0)))
        .unwrap_or(1.0);
    let stuff = reference
        .stuff_plus(pitcher)
        .map(|s| band(1.0 + cfg.stuff_per_point * (s - 100.0)))
        .unwrap_or(1.0);

    ContextualModifiers {
        chase_two_strike,
        first_pitch_aggression,
        stuff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::TeamTrend;
    use kcast_core::config::default_pitch_weights;
    use proptest::prelude::*;

    fn usage(pitch: PitchType, usage: f64) -> PitchUsage {
        PitchUsage { pitch, usage }
    }

    fn hitter(hand: Hand, k: f64) -> BatterProfile {
        BatterProfile {
            name: "Test Hitter".into(),
            strikeout_rate: k,
            whiff_rate: 0.25,
            xwoba: 0.315,
            batting_hand: hand,
            plate_appearances: 300,
            is_fallback: false,
        }
    }

    fn lefty() -> PitcherIdentity {
        PitcherIdentity {
            id: "1".into(),
            name: "Test Lefty".into(),
            hand: Hand::Left,
        }
    }

    #[test]
    fn weight_selection_order() {
        let sl_ff = [usage(PitchType::SL, 0.3), usage(PitchType::FF, 0.5), usage(PitchType::CU, 0.2)];
        assert_eq!(dynamic_weights(&sl_ff, Hand::Left), SLIDER_FASTBALL_WEIGHTS);

        let cu = [usage(PitchType::SI, 0.6), usage(PitchType::CU, 0.4)];
        assert_eq!(dynamic_weights(&cu, Hand::Left), CURVEBALL_WEIGHTS);

        let plain = [usage(PitchType::SI, 0.7), usage(PitchType::CH, 0.3)];
        assert_eq!(dynamic_weights(&plain, Hand::Left), LEFTY_WEIGHTS);
        assert_eq!(dynamic_weights(&plain, Hand::Right), DEFAULT_WEIGHTS);
        assert_eq!(dynamic_weights(&[], Hand::Right), DEFAULT_WEIGHTS);
    }

    #[test]
    fn weights_sum_to_one() {
        for w in [SLIDER_FASTBALL_WEIGHTS, CURVEBALL_WEIGHTS, LEFTY_WEIGHTS, DEFAULT_WEIGHTS] {
            assert!((w.0.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn neutral_set_aggregates_to_one() {
        let total = aggregate(&ModifierSet::NEUTRAL, DEFAULT_WEIGHTS, 0.85, 1.15);
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn aggregate_blends_then_scales() {
        let set = ModifierSet {
            matchup: 1.10,
            park: 0.90,
            contextual: ContextualModifiers {
                stuff: 1.02,
                ..ContextualModifiers::NEUTRAL
            },
            ..ModifierSet::NEUTRAL
        };
        // 1 + 0.4 * 0.1 + 0.2 * -0.1 = 1.02, times 1.02
        let total = aggregate(&set, DEFAULT_WEIGHTS, 0.85, 1.15);
        assert!((total - 1.02 * 1.02).abs() < 1e-12);
    }

    #[test]
    fn platoon_factors() {
        let cfg = ModifierConfig::default();
        let batters = [hitter(Hand::Left, 0.2), hitter(Hand::Right, 0.2)];
        assert!((platoon(Hand::Left, &batters, &cfg) - 1.0).abs() < 1e-12);

        let all_switch = [hitter(Hand::Switch, 0.2)];
        assert_eq!(platoon(Hand::Right, &all_switch, &cfg), cfg.platoon_switch);
        assert_eq!(platoon(Hand::Unknown, &batters, &cfg), 1.0);
        assert_eq!(platoon(Hand::Right, &[], &cfg), 1.0);
        assert_eq!(
            platoon(Hand::Right, &[hitter(Hand::Right, 0.2)], &cfg),
            cfg.platoon_same_hand
        );
    }

    #[test]
    fn matchup_rewards_strikeout_prone_lineups() {
        let league = LeagueConstants::default();
        let weights = default_pitch_weights();
        let scorer = VulnerabilityScorer::new(&league, &weights);
        let arsenal = [usage(PitchType::FF, 0.55), usage(PitchType::SL, 0.45)];

        let whiffy = vec![hitter(Hand::Right, 0.31); 9];
        let contact = vec![hitter(Hand::Right, 0.14); 9];
        let hi = matchup(&scorer, &arsenal, &whiffy, 0.075);
        let lo = matchup(&scorer, &arsenal, &contact, 0.075);
        assert!(hi > 1.0 && lo < 1.0);
        assert!(hi <= 1.0 + 2.0 * 0.075);

        // Empty arsenal still scores, against the default weights.
        assert!(matchup(&scorer, &[], &whiffy, 0.075) > 1.0);
    }

    #[test]
    fn unknown_reference_entries_are_neutral() {
        let reference = ReferenceData::default();
        let league = LeagueConstants::default();
        let cfg = ModifierConfig::default();
        assert_eq!(park(&reference, ""), 1.0);
        assert_eq!(park(&reference, "Nowhere Field"), 1.0);
        assert_eq!(team(&reference, "XYZ", &league, &cfg), 1.0);
        assert_eq!(
            contextual(&reference, "Nobody", "XYZ", &league, &cfg),
            ContextualModifiers::NEUTRAL
        );
    }

    #[test]
    fn team_and_contextual_are_clamped() {
        let mut reference = ReferenceData::default();
        reference.team_trends.insert(
            "SEA".into(),
            TeamTrend {
                k_rate: 0.40,
                chase_two_strike: Some(0.60),
                first_pitch_swing: Some(0.10),
            },
        );
        reference.stuff_plus.insert("test lefty".into(), 140.0);
        let league = LeagueConstants::default();
        let cfg = ModifierConfig::default();

        assert_eq!(team(&reference, "sea", &league, &cfg), cfg.team_max);
        let ctx = contextual(&reference, "Test Lefty", "SEA", &league, &cfg);
        assert_eq!(ctx.chase_two_strike, cfg.context_max);
        assert_eq!(ctx.first_pitch_aggression, cfg.context_max);
        assert_eq!(ctx.stuff, cfg.context_max);
    }

    #[test]
    fn derive_uses_all_inputs() {
        let mut reference = ReferenceData::default();
        reference.park_factors.insert("petco park".into(), 1.04);
        let config = Config::default();
        let pitcher = lefty();
        let batters = vec![hitter(Hand::Left, 0.225); 9];
        let set = derive(
            &ModifierInputs {
                pitcher: &pitcher,
                arsenal: &[],
                batters: &batters,
                opponent: "SD",
                park: "Petco Park",
            },
            &reference,
            &config,
        );
        assert_eq!(set.park, 1.04);
        assert!((set.platoon - config.modifiers.platoon_same_hand).abs() < 1e-12);
        assert_eq!(set.team, 1.0);
    }

    proptest! {
        #[test]
        fn aggregate_stays_in_band(
            matchup in 0.0f64..3.0,
            platoon in 0.0f64..3.0,
            park in 0.0f64..3.0,
            team in 0.0f64..3.0,
            chase in 0.5f64..1.5,
            fps in 0.5f64..1.5,
            stuff in 0.5f64..1.5,
            pick in 0usize..4,
        ) {
            let weights = [SLIDER_FASTBALL_WEIGHTS, CURVEBALL_WEIGHTS, LEFTY_WEIGHTS, DEFAULT_WEIGHTS][pick];
            let set = ModifierSet {
                matchup,
                platoon,
                park,
                team,
                contextual: ContextualModifiers {
                    chase_two_strike: chase,
                    first_pitch_aggression: fps,
                    stuff,
                },
            };
            let total = aggregate(&set, weights, 0.85, 1.15);
            prop_assert!((0.85..=1.15).contains(&total));
        }
    }
}

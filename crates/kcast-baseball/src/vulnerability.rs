// Batter strikeout vulnerability against a pitch type.
//
// Each metric is z-scored against league constants and clipped, then the
// pitch type's weights combine them and `2 * tanh` squashes the result into
// [-2, 2]. Positive means more likely to strike out.

use std::collections::HashMap;

use kcast_core::config::{LeagueConstants, PitchWeights, DEFAULT_PITCH_WEIGHTS_KEY};

use crate::model::{BatterProfile, PitchType};

/// Bound applied to every z-score before weighting.
pub const Z_CLIP: f64 = 2.5;

const NEUTRAL_WEIGHTS: PitchWeights = PitchWeights::new(0.40, 0.40, 0.20);

/// Weights for `pitch`, falling back to the `default` entry, then to a
/// neutral built-in split.
pub fn weights_for(table: &HashMap<String, PitchWeights>, pitch: PitchType) -> PitchWeights {
    table
        .get(pitch.code())
        .or_else(|| table.get(DEFAULT_PITCH_WEIGHTS_KEY))
        .copied()
        .unwrap_or(NEUTRAL_WEIGHTS)
}

fn z(value: f64, mean: f64, sd: f64) -> f64 {
    ((value - mean) / sd).clamp(-Z_CLIP, Z_CLIP)
}

/// Scores a lineup against one pitch type at a time.
pub struct VulnerabilityScorer<'a> {
    league: &'a LeagueConstants,
    weights: &'a HashMap<String, PitchWeights>,
}

impl<'a> VulnerabilityScorer<'a> {
    pub fn new(league: &'a LeagueConstants, weights: &'a HashMap<String, PitchWeights>) -> Self {
        Self { league, weights }
    }

    /// One score per batter, in lineup order, each in [-2, 2].
    pub fn score_lineup(&self, batters: &[BatterProfile], pitch: PitchType) -> Vec<f64> {
        let w = weights_for(self.weights, pitch);
        let l = self.league;

        let k: Vec<f64> = batters
            .iter()
            .map(|b| z(b.strikeout_rate, l.k_rate_mean, l.k_rate_sd))
            .collect();
        let whiff: Vec<f64> = batters
            .iter()
            .map(|b| z(b.whiff_rate, l.whiff_rate_mean, l.whiff_rate_sd))
            .collect();
        // Weak contact makes a batter more vulnerable, so xwOBA is inverted.
        let contact: Vec<f64> = batters
            .iter()
            .map(|b| z(l.xwoba_mean, b.xwoba, l.xwoba_sd))
            .collect();

        k.iter()
            .zip(&whiff)
            .zip(&contact)
            .map(|((k, wh), c)| 2.0 * (w.strikeout * k + w.whiff * wh + w.contact * c).tanh())
            .collect()
    }

    pub fn score(&self, batter: &BatterProfile, pitch: PitchType) -> f64 {
        self.score_lineup(std::slice::from_ref(batter), pitch)[0]
    }

    /// Mean score of the lineup against `pitch`; 0.0 for an empty lineup.
    pub fn lineup_mean(&self, batters: &[BatterProfile], pitch: PitchType) -> f64 {
        if batters.is_empty() {
            return 0.0;
        }
        let scores = self.score_lineup(batters, pitch);
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hand;
    use kcast_core::config::default_pitch_weights;
    use proptest::prelude::*;

    fn batter(k: f64, whiff: f64, xwoba: f64) -> BatterProfile {
        BatterProfile {
            name: "Test Batter".into(),
            strikeout_rate: k,
            whiff_rate: whiff,
            xwoba,
            batting_hand: Hand::Right,
            plate_appearances: 400,
            is_fallback: false,
        }
    }

    #[test]
    fn league_average_batter_scores_zero() {
        let league = LeagueConstants::default();
        let weights = default_pitch_weights();
        let scorer = VulnerabilityScorer::new(&league, &weights);
        let avg = BatterProfile::league_average("Avg Guy", &league);
        assert!(scorer.score(&avg, PitchType::SL).abs() < 1e-12);
    }

    #[test]
    fn free_swinger_is_more_vulnerable_than_contact_hitter() {
        let league = LeagueConstants::default();
        let weights = default_pitch_weights();
        let scorer = VulnerabilityScorer::new(&league, &weights);
        let scores = scorer.score_lineup(
            &[batter(0.32, 0.34, 0.290), batter(0.12, 0.15, 0.360)],
            PitchType::FF,
        );
        assert!(scores[0] > 0.0);
        assert!(scores[1] < 0.0);
    }

    #[test]
    fn extreme_inputs_stay_bounded() {
        let league = LeagueConstants::default();
        let weights = default_pitch_weights();
        let scorer = VulnerabilityScorer::new(&league, &weights);
        let s = scorer.score(&batter(1.0, 1.0, 0.0), PitchType::SL);
        assert!(s > 1.9 && s <= 2.0);
        let s = scorer.score(&batter(0.0, 0.0, 2.0), PitchType::SL);
        assert!((-2.0..-1.9).contains(&s));
    }

    #[test]
    fn unknown_pitch_uses_default_weights() {
        let weights = default_pitch_weights();
        assert_eq!(
            weights_for(&weights, PitchType::Other),
            weights[DEFAULT_PITCH_WEIGHTS_KEY]
        );
        assert_eq!(weights_for(&HashMap::new(), PitchType::SL), NEUTRAL_WEIGHTS);
    }

    #[test]
    fn empty_lineup_mean_is_neutral() {
        let league = LeagueConstants::default();
        let weights = default_pitch_weights();
        let scorer = VulnerabilityScorer::new(&league, &weights);
        assert_eq!(scorer.lineup_mean(&[], PitchType::FF), 0.0);
    }

    proptest! {
        #[test]
        fn monotone_in_strikeout_rate(
            k1 in 0.0f64..1.0,
            k2 in 0.0f64..1.0,
            whiff in 0.0f64..1.0,
            xwoba in 0.1f64..0.6,
            pitch in prop::sample::select(vec![
                PitchType::FF, PitchType::SI, PitchType::SL, PitchType::CU, PitchType::Other,
            ]),
        ) {
            let league = LeagueConstants::default();
            let weights = default_pitch_weights();
            let scorer = VulnerabilityScorer::new(&league, &weights);
            let (lo, hi) = if k1 <= k2 { (k1, k2) } else { (k2, k1) };
            let a = scorer.score(&batter(lo, whiff, xwoba), pitch);
            let b = scorer.score(&batter(hi, whiff, xwoba), pitch);
            prop_assert!(a <= b + 1e-12);
            prop_assert!((-2.0..=2.0).contains(&a));
        }
    }
}

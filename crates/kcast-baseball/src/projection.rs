// Strikeout projection: EWMA baseline, market blend and Monte-Carlo simulation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use kcast_core::config::ProjectionTuning;

use crate::model::{MarketLine, MarketSource};
use crate::modifiers::ModifierSet;

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselineSource {
    Ewma,
    LeagueAverage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub value: f64,
    pub source: BaselineSource,
    pub logs_used: usize,
}

/// Adjusted exponentially weighted mean of `values` (oldest first).
///
/// The newest value has weight 1 and each older one is discounted by
/// `(1 - alpha)`, normalized by the sum of weights. Returns `None` for an
/// empty slice.
pub fn ewma(values: &[f64], alpha: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let decay = 1.0 - alpha;
    let mut weight = 1.0;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for v in values.iter().rev() {
        weighted_sum += weight * v;
        total_weight += weight;
        weight *= decay;
    }
    Some(weighted_sum / total_weight)
}

/// Sample standard deviation (N - 1 denominator). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// The most recent `max_game_logs` strikeout totals, oldest first.
fn recent(logs: &[u32], tuning: &ProjectionTuning) -> Vec<f64> {
    let start = logs.len().saturating_sub(tuning.max_game_logs);
    logs[start..].iter().map(|&k| f64::from(k)).collect()
}

pub fn baseline(logs: &[u32], tuning: &ProjectionTuning) -> Baseline {
    let recent = recent(logs, tuning);
    match ewma(&recent, tuning.ewma_alpha) {
        Some(value) => Baseline {
            value,
            source: BaselineSource::Ewma,
            logs_used: recent.len(),
        },
        None => Baseline {
            value: tuning.league_baseline,
            source: BaselineSource::LeagueAverage,
            logs_used: 0,
        },
    }
}

/// Simulation standard deviation: the default below the log threshold, else
/// the scaled sample deviation with a floor.
pub fn dispersion(logs: &[u32], tuning: &ProjectionTuning) -> f64 {
    let recent = recent(logs, tuning);
    if recent.len() < tuning.min_logs_for_dispersion {
        return tuning.default_dispersion;
    }
    let sd = sample_std(&recent).unwrap_or(0.0);
    (sd * tuning.dispersion_scale).max(tuning.dispersion_floor)
}

// ---------------------------------------------------------------------------
// Market blend
// ---------------------------------------------------------------------------

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `baseline * total * (floor + swing * sigmoid(line - reference))`
pub fn adjusted_mean(baseline: f64, total_modifier: f64, line: f64, tuning: &ProjectionTuning) -> f64 {
    let vegas_effect = sigmoid(line - tuning.market_reference_line);
    baseline * total_modifier * (tuning.market_floor + tuning.market_swing * vegas_effect)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Percentage of simulated outcomes strictly above `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverProbability {
    pub threshold: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub percentiles: Percentiles,
    pub prob_over: Vec<OverProbability>,
}

/// Linear-interpolated percentile of an ascending slice, `q` in [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Draw `draws` normal outcomes clipped to `[0, max]` and summarize them.
///
/// # Panics
///
/// When `mean` is not finite or `sd` is not a positive finite number.
pub fn simulate<R: Rng + ?Sized>(
    mean: f64,
    sd: f64,
    draws: usize,
    max: f64,
    thresholds: &[f64],
    rng: &mut R,
) -> Simulation {
    assert!(mean.is_finite(), "projected mean must be finite, got {mean}");
    assert!(
        sd.is_finite() && sd > 0.0,
        "dispersion must be positive and finite, got {sd}"
    );

    let mut outcomes: Vec<f64> = (0..draws.max(1))
        .map(|_| {
            let z: f64 = StandardNormal.sample(&mut *rng);
            (mean + sd * z).clamp(0.0, max)
        })
        .collect();
    outcomes.sort_by(f64::total_cmp);

    let n = outcomes.len() as f64;
    let prob_over = thresholds
        .iter()
        .map(|&threshold| {
            let above = outcomes.iter().filter(|&&x| x > threshold).count();
            OverProbability {
                threshold,
                percent: above as f64 / n * 100.0,
            }
        })
        .collect();

    Simulation {
        percentiles: Percentiles {
            p25: percentile(&outcomes, 0.25),
            p50: percentile(&outcomes, 0.50),
            p75: percentile(&outcomes, 0.75),
            p95: percentile(&outcomes, 0.95),
        },
        prob_over,
    }
}

/// Simulation RNG: derived from `seed` and the matchup when a seed is set,
/// otherwise from entropy.
pub fn game_rng(seed: Option<u64>, pitcher_id: &str, opponent: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&seed.to_le_bytes());
            hasher.update(pitcher_id.as_bytes());
            hasher.update(b":");
            hasher.update(opponent.to_ascii_uppercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
            StdRng::seed_from_u64(u64::from_le_bytes(bytes))
        }
        None => StdRng::from_entropy(),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Numeric core of one projection, before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub baseline: Baseline,
    pub mean: f64,
    pub dispersion: f64,
    pub simulation: Simulation,
}

pub struct ProjectionEngine<'a> {
    tuning: &'a ProjectionTuning,
    draws: usize,
}

impl<'a> ProjectionEngine<'a> {
    pub fn new(tuning: &'a ProjectionTuning, draws: usize) -> Self {
        Self { tuning, draws }
    }

    pub fn project<R: Rng + ?Sized>(
        &self,
        game_logs: &[u32],
        total_modifier: f64,
        line: f64,
        rng: &mut R,
    ) -> Projection {
        let baseline = baseline(game_logs, self.tuning);
        self.project_from(baseline, dispersion(game_logs, self.tuning), total_modifier, line, rng)
    }

    /// Project from an explicit baseline and dispersion.
    pub fn project_from<R: Rng + ?Sized>(
        &self,
        baseline: Baseline,
        dispersion: f64,
        total_modifier: f64,
        line: f64,
        rng: &mut R,
    ) -> Projection {
        let mean = adjusted_mean(baseline.value, total_modifier, line, self.tuning);
        let simulation = simulate(
            mean,
            dispersion,
            self.draws,
            self.tuning.max_strikeouts,
            &self.tuning.over_thresholds,
            rng,
        );
        Projection {
            baseline,
            mean,
            dispersion,
            simulation,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Where each input of a projection came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub lineup_source: String,
    pub lineup_cached: bool,
    pub market_source: MarketSource,
    pub batters_total: usize,
    pub fallback_batters: usize,
    pub game_logs_used: usize,
    pub baseline_source: BaselineSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub pitcher: String,
    pub pitcher_id: String,
    pub opponent: String,
    pub park: String,
    pub mean: f64,
    pub baseline: f64,
    pub total_modifier: f64,
    pub modifiers: ModifierSet,
    pub market_line: MarketLine,
    /// Projected mean minus the market line.
    pub edge: f64,
    pub percentiles: Percentiles,
    pub prob_over: Vec<OverProbability>,
    pub provenance: Provenance,
}

impl ProjectionResult {
    pub fn prob_over_at(&self, threshold: f64) -> Option<f64> {
        self.prob_over
            .iter()
            .find(|p| (p.threshold - threshold).abs() < 1e-9)
            .map(|p| p.percent)
    }
}

// Per-game projection pipeline and slate batching.
//
// Stages run in order: identity, lineup, batter stats, context, projection.
// Only the identity stage can fail a game; every later stage degrades to
// league-average or neutral inputs.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use kcast_core::cache::CacheStore;
use kcast_core::config::Config;
use kcast_core::resolver::FallbackResolver;
use kcast_core::retry::{with_retry, RetryPolicy};
use kcast_core::source::SharedSource;

use crate::lineup::LineupResolver;
use crate::model::{BatterProfile, GameRequest, PitchUsage, PitcherIdentity};
use crate::modifiers::{self, ModifierInputs};
use crate::projection::{game_rng, ProjectionEngine, ProjectionResult, Provenance};
use crate::reference::{team_key, ReferenceData};
use crate::stats::BatterStatResolver;
use crate::vegas::VegasLineResolver;

pub const IDENTITY_NAMESPACE: &str = "pitcher-identity";
pub const ARSENAL_NAMESPACE: &str = "pitch-arsenal";
pub const GAME_LOG_NAMESPACE: &str = "game-logs";
const NO_DATA_SOURCE: &str = "none";

/// Resolves a pitcher name to its canonical identity.
pub type PitcherDirectory = SharedSource<PitcherIdentity>;
/// Pitch mix keyed by pitcher id.
pub type ArsenalSource = SharedSource<Vec<PitchUsage>>;
/// Strikeouts per start keyed by pitcher id, oldest first.
pub type GameLogSource = SharedSource<Vec<u32>>;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Every provider the pipeline consults, in priority order per family.
#[derive(Clone, Default)]
pub struct Providers {
    pub identity: Vec<PitcherDirectory>,
    pub arsenal: Vec<ArsenalSource>,
    pub game_logs: Vec<GameLogSource>,
    pub lineups: Vec<SharedSource<Vec<String>>>,
    pub stats: Vec<SharedSource<BatterProfile>>,
    pub markets: Vec<SharedSource<f64>>,
}

fn retry_all<T: Send + 'static>(sources: Vec<SharedSource<T>>, policy: RetryPolicy) -> Vec<SharedSource<T>> {
    sources.into_iter().map(|s| with_retry(s, policy)).collect()
}

impl Providers {
    /// Wrap every provider in the retry decorator.
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        Self {
            identity: retry_all(self.identity, policy),
            arsenal: retry_all(self.arsenal, policy),
            game_logs: retry_all(self.game_logs, policy),
            lineups: retry_all(self.lineups, policy),
            stats: retry_all(self.stats, policy),
            markets: retry_all(self.markets, policy),
        }
    }
}

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolvingIdentity,
    ResolvingLineup,
    ResolvingBatterStats,
    ResolvingContext,
    Projecting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ResolvingIdentity => "resolving identity",
            Stage::ResolvingLineup => "resolving lineup",
            Stage::ResolvingBatterStats => "resolving batter stats",
            Stage::ResolvingContext => "resolving context",
            Stage::Projecting => "projecting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("unknown pitcher: {name}")]
    UnknownPitcher { name: String },

    /// The game's task died before producing a result.
    #[error("projection aborted: {reason}")]
    Aborted { reason: String },
}

impl ProjectionError {
    /// Stage the game failed in, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProjectionError::UnknownPitcher { .. } => Some(Stage::ResolvingIdentity),
            ProjectionError::Aborted { .. } => None,
        }
    }
}

/// Outcome of one game in a slate.
#[derive(Debug, Clone)]
pub struct GameReport {
    pub request: GameRequest,
    pub outcome: Result<ProjectionResult, ProjectionError>,
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

pub struct Projector {
    providers: Providers,
    cache: Arc<dyn CacheStore>,
    reference: Arc<ReferenceData>,
    config: Config,
}

impl Projector {
    pub fn new(
        providers: Providers,
        cache: Arc<dyn CacheStore>,
        reference: Arc<ReferenceData>,
        config: Config,
    ) -> Self {
        Self {
            providers,
            cache,
            reference,
            config,
        }
    }

    /// Run the full pipeline for one game.
    pub async fn project(&self, request: &GameRequest) -> Result<ProjectionResult, ProjectionError> {
        let cache = self.cache.as_ref();
        let ttl = &self.config.cache;
        let opponent = team_key(&request.opponent);

        // --- identity, arsenal, game logs ---
        info!(pitcher = %request.pitcher, stage = %Stage::ResolvingIdentity, "stage started");
        let identity = FallbackResolver::new(IDENTITY_NAMESPACE, cache, ttl.identity_ttl())
            .resolve(&request.pitcher, &self.providers.identity, |p: &PitcherIdentity| {
                !p.id.is_empty()
            })
            .await
            .ok_or_else(|| ProjectionError::UnknownPitcher {
                name: request.pitcher.clone(),
            })?
            .value;

        let arsenal_resolver = FallbackResolver::new(ARSENAL_NAMESPACE, cache, ttl.stats_ttl());
        let log_resolver = FallbackResolver::new(GAME_LOG_NAMESPACE, cache, ttl.stats_ttl());
        let (arsenal, game_logs) = tokio::join!(
            arsenal_resolver.resolve_or(
                &identity.id,
                &self.providers.arsenal,
                |a: &Vec<PitchUsage>| a.iter().all(|p| (0.0..=1.0).contains(&p.usage)),
                || (Vec::new(), NO_DATA_SOURCE.to_string()),
            ),
            log_resolver.resolve_or(
                &identity.id,
                &self.providers.game_logs,
                |_: &Vec<u32>| true,
                || (Vec::new(), NO_DATA_SOURCE.to_string()),
            ),
        );
        let (arsenal, game_logs) = (arsenal.value, game_logs.value);
        if game_logs.is_empty() {
            warn!(pitcher = %identity.name, "no game logs, using league baseline");
        }

        // --- lineup ---
        info!(pitcher = %identity.name, opponent = %opponent, stage = %Stage::ResolvingLineup, "stage started");
        let lineup = LineupResolver::new(
            &self.providers.lineups,
            cache,
            ttl.lineup_ttl(),
            &self.reference,
        )
        .resolve(&opponent)
        .await;

        // --- batter stats ---
        info!(batters = lineup.len(), stage = %Stage::ResolvingBatterStats, "stage started");
        let batters = BatterStatResolver::new(
            &self.providers.stats,
            cache,
            ttl.stats_ttl(),
            &self.config.league,
        )
        .resolve_lineup(&lineup)
        .await;
        let fallback_batters = batters.iter().filter(|b| b.is_fallback).count();
        if fallback_batters > 0 {
            warn!(
                opponent = %opponent,
                fallback_batters,
                "substituted league-average profiles"
            );
        }

        // --- context ---
        info!(stage = %Stage::ResolvingContext, "stage started");
        let market_line = VegasLineResolver::new(
            &self.providers.markets,
            cache,
            ttl.market_ttl(),
            &self.reference,
            self.config.market.default_line,
        )
        .resolve(&identity.name)
        .await;
        let modifier_set = modifiers::derive(
            &ModifierInputs {
                pitcher: &identity,
                arsenal: &arsenal,
                batters: &batters,
                opponent: &opponent,
                park: &request.park,
            },
            &self.reference,
            &self.config,
        );
        let total_modifier = modifiers::aggregate(
            &modifier_set,
            modifiers::dynamic_weights(&arsenal, identity.hand),
            self.config.projection.modifier_min,
            self.config.projection.modifier_max,
        );

        // --- projection ---
        info!(stage = %Stage::Projecting, total_modifier, line = market_line.value, "stage started");
        let mut rng = game_rng(self.config.simulation.seed, &identity.id, &opponent);
        let projection = ProjectionEngine::new(&self.config.projection, self.config.simulation.draws)
            .project(&game_logs, total_modifier, market_line.value, &mut rng);

        info!(
            pitcher = %identity.name,
            opponent = %opponent,
            mean = projection.mean,
            "projection complete"
        );

        Ok(ProjectionResult {
            pitcher: identity.name,
            pitcher_id: identity.id,
            opponent,
            park: request.park.clone(),
            mean: projection.mean,
            baseline: projection.baseline.value,
            total_modifier,
            modifiers: modifier_set,
            edge: projection.mean - market_line.value,
            market_line,
            percentiles: projection.simulation.percentiles,
            prob_over: projection.simulation.prob_over,
            provenance: Provenance {
                lineup_source: lineup.source,
                lineup_cached: lineup.cached,
                market_source: market_line.reported_source(),
                batters_total: batters.len(),
                fallback_batters,
                game_logs_used: projection.baseline.logs_used,
                baseline_source: projection.baseline.source,
            },
        })
    }

    /// Project every game concurrently, one task per game. Reports come back
    /// in input order; a failing or panicking game does not affect the rest.
    pub async fn project_slate(self: &Arc<Self>, requests: Vec<GameRequest>) -> Vec<GameReport> {
        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| {
                let projector = Arc::clone(self);
                tokio::spawn(async move { projector.project(&request).await })
            })
            .collect();

        let mut reports = Vec::with_capacity(requests.len());
        for (request, handle) in requests.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        "task cancelled".to_string()
                    };
                    error!(pitcher = %request.pitcher, "game task died: {reason}");
                    Err(ProjectionError::Aborted { reason })
                }
            };
            if let Err(e) = &outcome {
                warn!(pitcher = %request.pitcher, opponent = %request.opponent, "game failed: {e}");
            }
            reports.push(GameReport { request, outcome });
        }
        reports
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

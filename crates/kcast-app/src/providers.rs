// Assembles the concrete providers in priority order, each wrapped in the
// retry decorator.

use std::sync::Arc;

use tracing::info;

use kcast_baseball::orchestrator::Providers;
use kcast_baseball::reference::ReferenceData;
use kcast_core::config::Config;
use kcast_core::retry::RetryPolicy;
use kcast_core::source::SharedSource;

use crate::http::build_client;
use crate::mlb::{LastLineup, MlbApi, MlbGameLogs, MlbIdentity, PostedLineup, SeasonStats};
use crate::odds::OddsApi;
use crate::savant::{SavantArsenal, SavantStats};

pub fn build_providers(config: &Config, reference: Arc<ReferenceData>) -> anyhow::Result<Providers> {
    let http = build_client(&config.http)?;
    let season = config.sources.season;
    let mlb = Arc::new(MlbApi::new(
        http.clone(),
        season,
        reference,
        config.league.clone(),
    ));

    let mut markets: Vec<SharedSource<f64>> = Vec::new();
    match config.credentials.odds_api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            markets.push(Arc::new(OddsApi::new(http.clone(), key.trim().to_string())));
        }
        _ => info!("no odds API key configured, market lines come from the manual table"),
    }

    let providers = Providers {
        identity: vec![Arc::new(MlbIdentity(Arc::clone(&mlb)))],
        arsenal: vec![Arc::new(SavantArsenal::new(http.clone(), season))],
        game_logs: vec![Arc::new(MlbGameLogs(Arc::clone(&mlb)))],
        lineups: vec![
            Arc::new(PostedLineup(Arc::clone(&mlb))),
            Arc::new(LastLineup(Arc::clone(&mlb))),
        ],
        stats: vec![
            Arc::new(SavantStats::new(http, season, Arc::clone(&mlb))),
            Arc::new(SeasonStats(mlb)),
        ],
        markets,
    };

    Ok(providers.with_retry(RetryPolicy::from(&config.retry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odds_api_only_with_key() {
        let mut config = Config::default();
        let reference = Arc::new(ReferenceData::default());

        let providers = build_providers(&config, Arc::clone(&reference)).unwrap();
        assert!(providers.markets.is_empty());
        assert_eq!(providers.lineups.len(), 2);
        assert_eq!(providers.stats[0].name(), "savant");

        config.credentials.odds_api_key = Some("key".into());
        let providers = build_providers(&config, reference).unwrap();
        assert_eq!(providers.markets.len(), 1);
        assert_eq!(providers.markets[0].name(), "odds-api");
    }
}

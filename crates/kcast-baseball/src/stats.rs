// Batter stat resolution with league-average substitution.

use std::time::Duration;

use futures_util::future::join_all;
use tracing::debug;

use kcast_core::cache::CacheStore;
use kcast_core::config::LeagueConstants;
use kcast_core::resolver::FallbackResolver;
use kcast_core::source::SharedSource;

use crate::model::{BatterProfile, Lineup, LineupSlot};

pub const STATS_NAMESPACE: &str = "batter-stats";
pub const LEAGUE_AVERAGE_SOURCE: &str = "league-average";

pub struct BatterStatResolver<'a> {
    providers: &'a [SharedSource<BatterProfile>],
    cache: &'a dyn CacheStore,
    ttl: Duration,
    league: &'a LeagueConstants,
}

impl<'a> BatterStatResolver<'a> {
    pub fn new(
        providers: &'a [SharedSource<BatterProfile>],
        cache: &'a dyn CacheStore,
        ttl: Duration,
        league: &'a LeagueConstants,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
            league,
        }
    }

    /// Profile for one batter, trying providers in priority order. Falls back
    /// to a league-average profile flagged `is_fallback`.
    pub async fn resolve(&self, name: &str) -> BatterProfile {
        let league = self.league;
        FallbackResolver::new(STATS_NAMESPACE, self.cache, self.ttl)
            .resolve_or(name, self.providers, BatterProfile::is_plausible, || {
                (
                    BatterProfile::league_average(name, league),
                    LEAGUE_AVERAGE_SOURCE.to_string(),
                )
            })
            .await
            .value
    }

    async fn resolve_slot(&self, slot: &LineupSlot) -> BatterProfile {
        if slot.is_fallback {
            debug!(batter = %slot.name, "placeholder slot, using league average");
            return BatterProfile::league_average(&slot.name, self.league);
        }
        self.resolve(&slot.name).await
    }

    /// Profiles for every slot, fetched concurrently, in batting order.
    pub async fn resolve_lineup(&self, lineup: &Lineup) -> Vec<BatterProfile> {
        join_all(lineup.slots.iter().map(|slot| self.resolve_slot(slot))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hand;
    use async_trait::async_trait;
    use kcast_core::cache::MemoryCache;
    use kcast_core::source::{Source, SourceError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(6 * 3600);

    /// Knows only batters whose name starts with "Known".
    struct Partial {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Source<BatterProfile> for Partial {
        fn name(&self) -> &str {
            "savant"
        }

        async fn fetch(&self, name: &str) -> Result<Option<BatterProfile>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !name.starts_with("Known") {
                return Ok(None);
            }
            Ok(Some(BatterProfile {
                name: name.to_string(),
                strikeout_rate: 0.28,
                whiff_rate: 0.30,
                xwoba: 0.330,
                batting_hand: Hand::Left,
                plate_appearances: 512,
                is_fallback: false,
            }))
        }
    }

    /// Returns percentages instead of fractions.
    struct WrongUnits;

    #[async_trait]
    impl Source<BatterProfile> for WrongUnits {
        fn name(&self) -> &str {
            "mlb-season-stats"
        }

        async fn fetch(&self, name: &str) -> Result<Option<BatterProfile>, SourceError> {
            Ok(Some(BatterProfile {
                name: name.to_string(),
                strikeout_rate: 28.0,
                whiff_rate: 30.0,
                xwoba: 0.33,
                batting_hand: Hand::Right,
                plate_appearances: 100,
                is_fallback: false,
            }))
        }
    }

    fn lineup(names: &[&str], is_fallback: bool) -> Lineup {
        Lineup {
            slots: names
                .iter()
                .map(|n| LineupSlot {
                    name: n.to_string(),
                    is_fallback,
                })
                .collect(),
            source: "test".into(),
            cached: false,
        }
    }

    #[tokio::test]
    async fn unknown_batters_get_league_average() {
        let partial = Arc::new(Partial {
            calls: AtomicU32::new(0),
        });
        let providers: Vec<SharedSource<BatterProfile>> = vec![Arc::new(WrongUnits), partial.clone()];
        let cache = MemoryCache::new();
        let league = LeagueConstants::default();
        let resolver = BatterStatResolver::new(&providers, &cache, TTL, &league);

        let profiles = resolver
            .resolve_lineup(&lineup(&["Known Slugger", "Mystery Man"], false))
            .await;

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "Known Slugger");
        assert!(!profiles[0].is_fallback);
        assert_eq!(profiles[0].plate_appearances, 512);
        assert!(profiles[1].is_fallback);
        assert_eq!(profiles[1].strikeout_rate, league.k_rate_mean);
    }

    #[tokio::test]
    async fn placeholder_slots_skip_providers() {
        let partial = Arc::new(Partial {
            calls: AtomicU32::new(0),
        });
        let providers: Vec<SharedSource<BatterProfile>> = vec![partial.clone()];
        let cache = MemoryCache::new();
        let league = LeagueConstants::default();
        let resolver = BatterStatResolver::new(&providers, &cache, TTL, &league);

        let profiles = resolver
            .resolve_lineup(&lineup(&["Generic Batter 1", "Generic Batter 2"], true))
            .await;
        assert!(profiles.iter().all(|p| p.is_fallback));
        assert_eq!(partial.calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn resolved_profiles_are_cached() {
        let partial = Arc::new(Partial {
            calls: AtomicU32::new(0),
        });
        let providers: Vec<SharedSource<BatterProfile>> = vec![partial.clone()];
        let cache = MemoryCache::new();
        let league = LeagueConstants::default();
        let resolver = BatterStatResolver::new(&providers, &cache, TTL, &league);

        resolver.resolve("Known Slugger").await;
        resolver.resolve("known  slugger").await;
        assert_eq!(partial.calls.load(Ordering::SeqCst), 1);
    }
}

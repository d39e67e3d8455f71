// Opposing lineup resolution.
//
// Order: custom override from the reference data, then every lineup provider
// raced concurrently (first valid lineup wins), then nine generic
// placeholder batters flagged as fallback.

use std::time::Duration;

use tracing::{info, warn};

use kcast_core::cache::CacheStore;
use kcast_core::resolver::{FallbackResolver, Strategy};
use kcast_core::source::SharedSource;

use crate::model::{Lineup, LineupSlot};
use crate::reference::{team_key, ReferenceData};

pub const LINEUP_NAMESPACE: &str = "lineup";
pub const CUSTOM_OVERRIDE_SOURCE: &str = "custom-override";
pub const PLACEHOLDER_SOURCE: &str = "generic-placeholder";

pub const MIN_LINEUP: usize = 8;
pub const MAX_LINEUP: usize = 10;
const PLACEHOLDER_SIZE: usize = 9;

/// A lineup is 8 to 10 full names (two or more words) with no pitcher slot.
pub fn is_valid_lineup(names: &[String]) -> bool {
    (MIN_LINEUP..=MAX_LINEUP).contains(&names.len()) && names.iter().all(|n| is_batter_name(n))
}

fn is_batter_name(name: &str) -> bool {
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.last() {
        Some(last) => words.len() >= 2 && !last.eq_ignore_ascii_case("pitcher"),
        None => false,
    }
}

pub fn placeholder_names() -> Vec<String> {
    (1..=PLACEHOLDER_SIZE)
        .map(|i| format!("Generic Batter {i}"))
        .collect()
}

fn lineup_from(names: Vec<String>, source: String, cached: bool) -> Lineup {
    let is_fallback = source == PLACEHOLDER_SOURCE;
    Lineup {
        slots: names
            .into_iter()
            .map(|name| LineupSlot { name, is_fallback })
            .collect(),
        source,
        cached,
    }
}

pub struct LineupResolver<'a> {
    providers: &'a [SharedSource<Vec<String>>],
    cache: &'a dyn CacheStore,
    ttl: Duration,
    reference: &'a ReferenceData,
}

impl<'a> LineupResolver<'a> {
    pub fn new(
        providers: &'a [SharedSource<Vec<String>>],
        cache: &'a dyn CacheStore,
        ttl: Duration,
        reference: &'a ReferenceData,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
            reference,
        }
    }

    /// Resolve the batting order of `team` (abbreviation). Never fails.
    pub async fn resolve(&self, team: &str) -> Lineup {
        let team = team_key(team);

        if let Some(names) = self.reference.custom_lineup(&team) {
            if is_valid_lineup(names) {
                info!(team = %team, "using custom lineup override");
                return lineup_from(names.to_vec(), CUSTOM_OVERRIDE_SOURCE.to_string(), false);
            }
            warn!(team = %team, entries = names.len(), "ignoring invalid custom lineup override");
        }

        let resolved = FallbackResolver::new(LINEUP_NAMESPACE, self.cache, self.ttl)
            .with_strategy(Strategy::Race)
            .resolve_or(
                &team,
                self.providers,
                |names: &Vec<String>| is_valid_lineup(names),
                || (placeholder_names(), PLACEHOLDER_SOURCE.to_string()),
            )
            .await;

        lineup_from(resolved.value, resolved.source, resolved.cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kcast_core::cache::MemoryCache;
    use kcast_core::source::{Source, SourceError};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(2 * 3600);

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Player Number{i}")).collect()
    }

    struct Fixed {
        name: &'static str,
        delay_ms: u64,
        answer: Option<Vec<String>>,
    }

    #[async_trait]
    impl Source<Vec<String>> for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _team: &str) -> Result<Option<Vec<String>>, SourceError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            match &self.answer {
                Some(names) => Ok(Some(names.clone())),
                None => Err(SourceError::request(self.name, "connection refused")),
            }
        }
    }

    #[test]
    fn validator_rules() {
        assert!(is_valid_lineup(&names(8)));
        assert!(is_valid_lineup(&names(10)));
        assert!(!is_valid_lineup(&names(7)));
        assert!(!is_valid_lineup(&names(11)));

        let mut single_word = names(9);
        single_word[3] = "Ohtani".into();
        assert!(!is_valid_lineup(&single_word));

        let mut pitcher_slot = names(9);
        pitcher_slot[8] = "Starting PITCHER".into();
        assert!(!is_valid_lineup(&pitcher_slot));

        let mut pitcher_first_word = names(9);
        pitcher_first_word[0] = "Pitcher Smith".into();
        assert!(is_valid_lineup(&pitcher_first_word));
    }

    #[test]
    fn placeholders_are_valid() {
        assert!(is_valid_lineup(&placeholder_names()));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_override_wins() {
        let mut reference = ReferenceData::default();
        reference.custom_lineups.insert("PHI".into(), names(9));
        let providers: Vec<SharedSource<Vec<String>>> = vec![Arc::new(Fixed {
            name: "mlb-posted-lineup",
            delay_ms: 0,
            answer: Some(names(10)),
        })];
        let cache = MemoryCache::new();

        let lineup = LineupResolver::new(&providers, &cache, TTL, &reference)
            .resolve("phi")
            .await;
        assert_eq!(lineup.source, CUSTOM_OVERRIDE_SOURCE);
        assert_eq!(lineup.len(), 9);
        assert!(!lineup.is_fallback());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_override_falls_through_to_providers() {
        let mut reference = ReferenceData::default();
        reference.custom_lineups.insert("PHI".into(), names(3));
        let providers: Vec<SharedSource<Vec<String>>> = vec![Arc::new(Fixed {
            name: "mlb-posted-lineup",
            delay_ms: 0,
            answer: Some(names(9)),
        })];
        let cache = MemoryCache::new();

        let lineup = LineupResolver::new(&providers, &cache, TTL, &reference)
            .resolve("PHI")
            .await;
        assert_eq!(lineup.source, "mlb-posted-lineup");
    }

    #[tokio::test(start_paused = true)]
    async fn race_takes_first_valid_lineup() {
        let reference = ReferenceData::default();
        let providers: Vec<SharedSource<Vec<String>>> = vec![
            Arc::new(Fixed {
                name: "fast-but-short",
                delay_ms: 5,
                answer: Some(names(4)),
            }),
            Arc::new(Fixed {
                name: "slow",
                delay_ms: 300,
                answer: Some(names(9)),
            }),
            Arc::new(Fixed {
                name: "medium",
                delay_ms: 40,
                answer: Some(names(8)),
            }),
        ];
        let cache = MemoryCache::new();

        let lineup = LineupResolver::new(&providers, &cache, TTL, &reference)
            .resolve("NYM")
            .await;
        assert_eq!(lineup.source, "medium");
        assert_eq!(lineup.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_sources_give_placeholders() {
        let reference = ReferenceData::default();
        let providers: Vec<SharedSource<Vec<String>>> = vec![
            Arc::new(Fixed {
                name: "a",
                delay_ms: 0,
                answer: None,
            }),
            Arc::new(Fixed {
                name: "b",
                delay_ms: 0,
                answer: None,
            }),
        ];
        let cache = MemoryCache::new();
        let resolver = LineupResolver::new(&providers, &cache, TTL, &reference);

        let lineup = resolver.resolve("SEA").await;
        assert_eq!(lineup.len(), 9);
        assert_eq!(lineup.source, PLACEHOLDER_SOURCE);
        assert!(lineup.slots.iter().all(|s| s.is_fallback));

        // Served from cache on the next call, still flagged.
        let again = resolver.resolve("SEA").await;
        assert!(again.cached);
        assert!(again.is_fallback());
    }
}

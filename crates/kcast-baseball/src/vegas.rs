// Market strikeout line resolution.
//
// Providers are tried sequentially (they are rate limited). When none
// answers, the manual line table is consulted, then the configured default.

use std::time::Duration;

use tracing::warn;

use kcast_core::cache::CacheStore;
use kcast_core::resolver::FallbackResolver;
use kcast_core::source::SharedSource;

use crate::model::{MarketLine, MarketSource};
use crate::reference::ReferenceData;

pub const MARKET_NAMESPACE: &str = "market-line";

/// Strikeout props outside this range are treated as garbage.
pub fn is_plausible_line(line: &f64) -> bool {
    line.is_finite() && (0.5..=15.0).contains(line)
}

pub struct VegasLineResolver<'a> {
    providers: &'a [SharedSource<f64>],
    cache: &'a dyn CacheStore,
    ttl: Duration,
    reference: &'a ReferenceData,
    default_line: f64,
}

impl<'a> VegasLineResolver<'a> {
    pub fn new(
        providers: &'a [SharedSource<f64>],
        cache: &'a dyn CacheStore,
        ttl: Duration,
        reference: &'a ReferenceData,
        default_line: f64,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
            reference,
            default_line,
        }
    }

    pub async fn resolve(&self, pitcher: &str) -> MarketLine {
        let manual = self.reference.manual_line(pitcher);
        let default_line = self.default_line;

        let resolved = FallbackResolver::new(MARKET_NAMESPACE, self.cache, self.ttl)
            .resolve_or(pitcher, self.providers, is_plausible_line, || {
                let line = manual.filter(is_plausible_line).unwrap_or(default_line);
                (line, MarketSource::ManualFallback.tag().to_string())
            })
            .await;

        let source = MarketSource::from_tag(&resolved.source).unwrap_or_else(|| {
            warn!(source = %resolved.source, "unrecognized market source tag");
            MarketSource::ManualFallback
        });
        MarketLine {
            value: resolved.value,
            source,
            cached: resolved.cached,
        }
    }
}

// Fallback resolution of a single fact over a prioritized list of sources.
//
// Order of resolution:
// 1. Fresh cache entry (original source tag preserved, flagged as cached)
// 2. Providers, either strictly in priority order or raced concurrently
// 3. A static default supplied by the caller (`resolve_or` only)
//
// Whatever wins is written back to the cache before returning. Nothing in
// here returns an error: failed providers are logged and skipped.

use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheStore};
use crate::identity::CacheKey;
use crate::source::SharedSource;

/// How providers are attempted once the cache misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One at a time, in priority order. For rate-limited sources.
    Sequential,
    /// All at once; the first valid result to complete wins and the rest are
    /// cancelled.
    Race,
}

/// A resolved value with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// Tag of the source that originally produced the value.
    pub source: String,
    /// True when served from cache rather than fetched in this call.
    pub cached: bool,
}

/// Resolver for one family of facts (one cache namespace and TTL).
///
/// Holds only borrowed collaborators; cheap to build per call.
pub struct FallbackResolver<'a> {
    namespace: &'a str,
    cache: &'a dyn CacheStore,
    ttl: Duration,
    strategy: Strategy,
}

impl<'a> FallbackResolver<'a> {
    pub fn new(namespace: &'a str, cache: &'a dyn CacheStore, ttl: Duration) -> Self {
        Self {
            namespace,
            cache,
            ttl,
            strategy: Strategy::Sequential,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Resolve from cache or providers. `None` only when every provider
    /// failed or returned data rejected by `validate`.
    pub async fn resolve<T, V>(
        &self,
        identity: &str,
        providers: &[SharedSource<T>],
        validate: V,
    ) -> Option<Resolved<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        V: Fn(&T) -> bool + Sync,
    {
        let key = CacheKey::new(self.namespace, identity);

        if let Some(entry) = cache::read_fresh::<T>(self.cache, &key, self.ttl, Utc::now()) {
            if validate(&entry.value) {
                debug!(
                    namespace = self.namespace,
                    identity,
                    source = %entry.source,
                    "resolved from cache"
                );
                return Some(Resolved {
                    value: entry.value,
                    source: entry.source,
                    cached: true,
                });
            }
            warn!(
                namespace = self.namespace,
                identity, "cached entry failed validation, refetching"
            );
        }

        let (value, source) = match self.strategy {
            Strategy::Sequential => first_in_order(identity, providers, &validate).await,
            Strategy::Race => first_valid_to_complete(identity, providers, &validate).await,
        }?;

        info!(namespace = self.namespace, identity, source = %source, "resolved from provider");
        cache::write(self.cache, &key, &value, &source, Utc::now());
        Some(Resolved {
            value,
            source,
            cached: false,
        })
    }

    /// Like [`resolve`](Self::resolve), but falls back to `default` (value
    /// and source tag) when nothing resolves. The default is cached too, so
    /// failed sources are not retried within the TTL.
    pub async fn resolve_or<T, V, D>(
        &self,
        identity: &str,
        providers: &[SharedSource<T>],
        validate: V,
        default: D,
    ) -> Resolved<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        V: Fn(&T) -> bool + Sync,
        D: FnOnce() -> (T, String) + Send,
    {
        if let Some(resolved) = self.resolve(identity, providers, validate).await {
            return resolved;
        }

        let (value, source) = default();
        warn!(
            namespace = self.namespace,
            identity,
            source = %source,
            "all providers failed, using static default"
        );
        let key = CacheKey::new(self.namespace, identity);
        cache::write(self.cache, &key, &value, &source, Utc::now());
        Resolved {
            value,
            source,
            cached: false,
        }
    }
}

async fn first_in_order<T, V>(
    identity: &str,
    providers: &[SharedSource<T>],
    validate: &V,
) -> Option<(T, String)>
where
    T: Send + 'static,
    V: Fn(&T) -> bool + Sync,
{
    for provider in providers {
        match provider.fetch(identity).await {
            Ok(Some(value)) if validate(&value) => {
                return Some((value, provider.name().to_string()));
            }
            Ok(Some(_)) => warn!(source = provider.name(), identity, "rejected invalid result"),
            Ok(None) => debug!(source = provider.name(), identity, "no data"),
            Err(e) => warn!(source = provider.name(), identity, "provider failed: {e}"),
        }
    }
    None
}

async fn first_valid_to_complete<T, V>(
    identity: &str,
    providers: &[SharedSource<T>],
    validate: &V,
) -> Option<(T, String)>
where
    T: Send + 'static,
    V: Fn(&T) -> bool + Sync,
{
    let mut pending: FuturesUnordered<_> = providers
        .iter()
        .map(|provider| async move { (provider.name(), provider.fetch(identity).await) })
        .collect();

    // Returning drops `pending`, which cancels every call still in flight.
    while let Some((name, result)) = pending.next().await {
        match result {
            Ok(Some(value)) if validate(&value) => return Some((value, name.to_string())),
            Ok(Some(_)) => warn!(source = name, identity, "rejected invalid result"),
            Ok(None) => debug!(source = name, identity, "no data"),
            Err(e) => warn!(source = name, identity, "provider failed: {e}"),
        }
    }
    None
}

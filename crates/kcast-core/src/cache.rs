// Content-addressed cache with per-family TTL.
//
// Entries are stored as JSON alongside the tag of the source that produced
// them. A refresh replaces the whole entry; nothing is patched in place, so
// concurrent writers for the same key are last-writer-wins.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::identity::CacheKey;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A cache entry as persisted: untyped JSON value plus provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub value: serde_json::Value,
    pub source: String,
    pub stored_at: DateTime<Utc>,
}

/// A typed view of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub source: String,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// An entry is valid only while `now - stored_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            // A TTL too large for chrono never expires.
            Err(_) => true,
        }
    }
}

/// Oldest `stored_at` still readable under `max_ttl`; `None` when nothing can
/// expire.
pub fn expiry_cutoff(max_ttl: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(max_ttl).ok()?;
    now.checked_sub_signed(ttl)
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Key/value persistence shared by every resolver.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>>;
    fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<()>;
}

/// Read a typed entry and return it only if it is still fresh.
///
/// Store errors and entries that no longer deserialize are logged and
/// treated as a miss.
pub fn read_fresh<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &CacheKey,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Option<CacheEntry<T>> {
    let stored = match store.get(key) {
        Ok(Some(stored)) => stored,
        Ok(None) => return None,
        Err(e) => {
            warn!(%key, "cache read failed: {e:#}");
            return None;
        }
    };

    let value = match serde_json::from_value::<T>(stored.value) {
        Ok(value) => value,
        Err(e) => {
            warn!(%key, "discarding undecodable cache entry: {e}");
            return None;
        }
    };

    let entry = CacheEntry {
        value,
        source: stored.source,
        stored_at: stored.stored_at,
    };
    if entry.is_fresh(ttl, now) {
        Some(entry)
    } else {
        debug!(%key, stored_at = %entry.stored_at, "cache entry expired");
        None
    }
}

/// Serialize and store a value. Failures are logged, never propagated.
pub fn write<T: Serialize>(
    store: &dyn CacheStore,
    key: &CacheKey,
    value: &T,
    source: &str,
    now: DateTime<Utc>,
) {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            warn!(%key, "failed to serialize cache value: {e}");
            return;
        }
    };
    let entry = StoredEntry {
        value,
        source: source.to_string(),
        stored_at: now,
    };
    if let Err(e) = store.put(key, entry) {
        warn!(%key, "cache write failed: {e:#}");
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// SQLite-backed cache store.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`. Pass `":memory:"` for
    /// an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set cache pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_entries (
                key       TEXT PRIMARY KEY,
                value     TEXT NOT NULL,
                source    TEXT NOT NULL,
                stored_at TEXT NOT NULL
            );
            ",
        )
        .context("failed to create cache schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("cache mutex poisoned")
    }

    /// Delete every entry stored before `cutoff`. Returns the number removed.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE stored_at < ?1",
                params![timestamp(cutoff)],
            )
            .context("failed to purge cache entries")?;
        Ok(removed)
    }

    /// Number of stored entries, fresh or not.
    pub fn entry_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .context("failed to count cache entries")?;
        Ok(count as usize)
    }
}

impl CacheStore for SqliteCache {
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT value, source, stored_at FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .context("failed to query cache entry")?;

        let Some((value, source, stored_at)) = row else {
            return Ok(None);
        };
        let value = serde_json::from_str(&value).context("failed to decode cached value")?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .context("failed to parse cache timestamp")?
            .with_timezone(&Utc);

        Ok(Some(StoredEntry {
            value,
            source,
            stored_at,
        }))
    }

    fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<()> {
        let conn = self.conn();
        let value = serde_json::to_string(&entry.value).context("failed to encode cache value")?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, source, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.as_str(), value, entry.source, timestamp(entry.stored_at)],
        )
        .context("failed to write cache entry")?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local cache store, used in tests and when no database is wanted.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, StoredEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX_HOURS: Duration = Duration::from_secs(6 * 3600);

    fn key(identity: &str) -> CacheKey {
        CacheKey::new("market", identity)
    }

    #[test]
    fn round_trip_within_ttl_preserves_value_and_source() {
        let store = MemoryCache::new();
        let now = Utc::now();
        write(&store, &key("Paul Skenes"), &6.5_f64, "odds-api", now);

        let later = now + chrono::Duration::hours(5);
        let entry = read_fresh::<f64>(&store, &key("Paul Skenes"), SIX_HOURS, later)
            .expect("entry should still be fresh");
        assert_eq!(entry.value, 6.5);
        assert_eq!(entry.source, "odds-api");
        assert_eq!(entry.stored_at, now);
    }

    #[test]
    fn read_after_ttl_is_absent() {
        let store = MemoryCache::new();
        let now = Utc::now();
        write(&store, &key("Paul Skenes"), &6.5_f64, "odds-api", now);

        let expired = now + chrono::Duration::hours(6);
        assert!(read_fresh::<f64>(&store, &key("Paul Skenes"), SIX_HOURS, expired).is_none());
    }

    #[test]
    fn missing_key_is_absent() {
        let store = MemoryCache::new();
        assert!(read_fresh::<f64>(&store, &key("Nobody Here"), SIX_HOURS, Utc::now()).is_none());
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let store = MemoryCache::new();
        let now = Utc::now();
        write(&store, &key("Paul Skenes"), &"not a number", "odds-api", now);
        assert!(read_fresh::<f64>(&store, &key("Paul Skenes"), SIX_HOURS, now).is_none());
    }

    #[test]
    fn rewrite_replaces_entry_wholesale() {
        let store = MemoryCache::new();
        let now = Utc::now();
        write(&store, &key("Paul Skenes"), &6.5_f64, "odds-api", now);
        write(&store, &key("Paul Skenes"), &7.5_f64, "manual-fallback", now);

        let entry = read_fresh::<f64>(&store, &key("Paul Skenes"), SIX_HOURS, now).unwrap();
        assert_eq!(entry.value, 7.5);
        assert_eq!(entry.source, "manual-fallback");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sqlite_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let store = SqliteCache::open(path.to_str().unwrap()).unwrap();
        let now = Utc::now();

        write(
            &store,
            &key("Aaron Judge"),
            &vec!["a".to_string(), "b".to_string()],
            "savant",
            now,
        );
        let entry = read_fresh::<Vec<String>>(&store, &key("Aaron Judge"), SIX_HOURS, now).unwrap();
        assert_eq!(entry.value, vec!["a", "b"]);
        assert_eq!(entry.source, "savant");
        assert_eq!(store.entry_count().unwrap(), 1);

        // Reopen: entries survive the process.
        drop(store);
        let reopened = SqliteCache::open(path.to_str().unwrap()).unwrap();
        assert!(read_fresh::<Vec<String>>(&reopened, &key("Aaron Judge"), SIX_HOURS, now).is_some());
    }

    #[test]
    fn expiry_cutoff_follows_max_ttl() {
        let now = Utc::now();
        assert_eq!(expiry_cutoff(SIX_HOURS, now), Some(now - chrono::Duration::hours(6)));
        assert_eq!(expiry_cutoff(Duration::from_secs(u64::MAX), now), None);
    }

    #[test]
    fn sqlite_purge_removes_old_entries() {
        let store = SqliteCache::open(":memory:").unwrap();
        let now = Utc::now();
        write(&store, &key("old"), &1.0_f64, "odds-api", now - chrono::Duration::days(3));
        write(&store, &key("new"), &2.0_f64, "odds-api", now);

        let removed = store.purge_older_than(now - chrono::Duration::days(1)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.entry_count().unwrap(), 1);
    }
}

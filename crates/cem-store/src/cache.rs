//! Key-value TTL cache for tool results (web prices, densities, rates).
//!
//! Two interchangeable backends implement [`CacheBackend`]: the SQLite
//! [`Store`] and the in-process [`MemoryCache`]. [`CacheStore`] layers a
//! primary backend over an optional fallback.

use std::collections::{BTreeMap, HashMap};

use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cem_core::time::{expiry_after, now_unix_secs, unix_to_iso8601};

use crate::error::Result;
use crate::store::Store;

pub const TTL_PRODUCT_SECS: u64 = 3_600;
pub const TTL_MATERIAL_SECS: u64 = 7_200;
pub const TTL_DENSITY_SECS: u64 = 604_800;
pub const TTL_MANUFACTURING_SECS: u64 = 86_400;
pub const TTL_CURRENCY_SECS: u64 = 21_600;
pub const TTL_DEFAULT_SECS: u64 = TTL_PRODUCT_SECS;

// --- Keys ---

fn key_part(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn product_key(name: &str, quantity: u32) -> String {
    format!("product:{}:{quantity}", key_part(name))
}

pub fn material_key(name: &str, unit: &str) -> String {
    format!("material:{}:{}", key_part(name), key_part(unit))
}

pub fn density_key(material: &str, unit: &str) -> String {
    format!("density:{}:{}", key_part(material), key_part(unit))
}

pub fn manufacturing_key(method: &str, material: &str, weight_g: f64, complexity: &str) -> String {
    format!(
        "manufacturing:{}:{}:{weight_g:.1}:{}",
        key_part(method),
        key_part(material),
        key_part(complexity)
    )
}

pub fn currency_key(from: &str, to: &str) -> String {
    format!("currency:{}:{}", from.trim().to_uppercase(), to.trim().to_uppercase())
}

// --- Entries ---

/// Provenance stored alongside a cached value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub result_type: String,
    pub source: String,
    pub confidence: String,
}

impl Default for CacheMeta {
    fn default() -> Self {
        Self {
            result_type: "general".into(),
            source: "unknown".into(),
            confidence: "medium".into(),
        }
    }
}

impl CacheMeta {
    pub fn new(result_type: &str, source: &str, confidence: &str) -> Self {
        Self {
            result_type: result_type.into(),
            source: source.into(),
            confidence: confidence.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    #[serde(flatten)]
    pub meta: CacheMeta,
    pub created_at: u64,
    pub expires_at: u64,
    /// Hits including the read that returned this entry.
    pub hits: u64,
}

impl CacheEntry {
    pub fn remaining_ttl(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// The cached value with a `_cache_metadata` object merged in, as
    /// returned to tool callers.
    pub fn annotated_value(&self) -> Value {
        let meta = serde_json::json!({
            "cached_at": unix_to_iso8601(self.created_at),
            "hits": self.hits,
            "source": self.meta.source,
            "confidence": self.meta.confidence,
        });
        match &self.value {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert("_cache_metadata".into(), meta);
                Value::Object(map)
            }
            other => serde_json::json!({ "value": other, "_cache_metadata": meta }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub entries: u64,
    pub hits: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub total_entries: u64,
    pub expired_entries: u64,
    pub total_hits: u64,
    pub by_type: BTreeMap<String, TypeStats>,
}

// --- Backend trait ---

/// A TTL key-value cache. The `_at` methods take the current Unix time so
/// expiry is testable; the plain methods read the clock.
pub trait CacheBackend: Send {
    fn backend_name(&self) -> &'static str;

    /// Hit strictly before `expires_at`; increments the hit count.
    fn get_at(&mut self, key: &str, now: u64) -> Result<Option<CacheEntry>>;

    /// Insert or replace, resetting the hit count.
    fn set_at(&mut self, key: &str, value: &Value, ttl_secs: u64, meta: &CacheMeta, now: u64)
    -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<bool>;

    fn exists_at(&self, key: &str, now: u64) -> Result<bool>;

    /// Remove every entry, returning how many were removed.
    fn clear(&mut self) -> Result<u64>;

    /// Remove entries with `expires_at <= now`.
    fn clear_expired_at(&mut self, now: u64) -> Result<u64>;

    fn stats_at(&self, now: u64) -> Result<CacheStats>;

    fn get(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        self.get_at(key, now_unix_secs())
    }

    fn set(&mut self, key: &str, value: &Value, ttl_secs: u64, meta: &CacheMeta) -> Result<()> {
        self.set_at(key, value, ttl_secs, meta, now_unix_secs())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.exists_at(key, now_unix_secs())
    }

    fn clear_expired(&mut self) -> Result<u64> {
        self.clear_expired_at(now_unix_secs())
    }

    fn stats(&self) -> Result<CacheStats> {
        self.stats_at(now_unix_secs())
    }
}

// --- SQLite backend ---

impl CacheBackend for Store {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn get_at(&mut self, key: &str, now: u64) -> Result<Option<CacheEntry>> {
        let tx = self.conn().unchecked_transaction()?;
        let row = tx
            .query_row(
                "SELECT value, result_type, source, confidence, created_at, expires_at, hit_count
                 FROM tool_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        CacheMeta {
                            result_type: row.get(1)?,
                            source: row.get(2)?,
                            confidence: row.get(3)?,
                        },
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((raw, meta, created_at, expires_at, hit_count)) = row else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE tool_cache SET hit_count = hit_count + 1 WHERE key = ?1",
            [key],
        )?;
        tx.commit()?;

        Ok(Some(CacheEntry {
            value: serde_json::from_str(&raw)?,
            meta,
            created_at: created_at.max(0) as u64,
            expires_at: expires_at.max(0) as u64,
            hits: hit_count.max(0) as u64 + 1,
        }))
    }

    fn set_at(
        &mut self,
        key: &str,
        value: &Value,
        ttl_secs: u64,
        meta: &CacheMeta,
        now: u64,
    ) -> Result<()> {
        let expires_at = expiry_after(now, ttl_secs);
        self.conn().execute(
            "INSERT INTO tool_cache
                 (key, value, result_type, created_at, expires_at, hit_count, source, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 result_type = excluded.result_type,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at,
                 hit_count = 0,
                 source = excluded.source,
                 confidence = excluded.confidence",
            params![
                key,
                serde_json::to_string(value)?,
                meta.result_type,
                now as i64,
                expires_at.min(i64::MAX as u64) as i64,
                meta.source,
                meta.confidence,
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM tool_cache WHERE key = ?1", [key])?;
        Ok(n > 0)
    }

    fn exists_at(&self, key: &str, now: u64) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM tool_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now as i64],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn clear(&mut self) -> Result<u64> {
        let n = self.conn().execute("DELETE FROM tool_cache", [])?;
        Ok(n as u64)
    }

    fn clear_expired_at(&mut self, now: u64) -> Result<u64> {
        let n = self
            .conn()
            .execute("DELETE FROM tool_cache WHERE expires_at <= ?1", [now as i64])?;
        if n > 0 {
            tracing::info!(removed = n, "cleared expired cache entries");
        }
        Ok(n as u64)
    }

    fn stats_at(&self, now: u64) -> Result<CacheStats> {
        let mut stats = CacheStats {
            backend: self.backend_name().into(),
            ..CacheStats::default()
        };
        let mut stmt = self.conn().prepare(
            "SELECT result_type, COUNT(*), COALESCE(SUM(hit_count), 0),
                    SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END)
             FROM tool_cache GROUP BY result_type",
        )?;
        let rows = stmt
            .query_map([now as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (result_type, entries, hits, expired) in rows {
            let t = TypeStats {
                entries: entries.max(0) as u64,
                hits: hits.max(0) as u64,
            };
            stats.total_entries += t.entries;
            stats.total_hits += t.hits;
            stats.expired_entries += expired.max(0) as u64;
            stats.by_type.insert(result_type, t);
        }
        Ok(stats)
    }
}

// --- In-process backend ---

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    meta: CacheMeta,
    created_at: u64,
    expires_at: u64,
    hit_count: u64,
}

/// In-process TTL map. Stands in for a networked cache as the fast layer
/// in front of SQLite.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get_at(&mut self, key: &str, now: u64) -> Result<Option<CacheEntry>> {
        let Some(e) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        if e.expires_at <= now {
            self.entries.remove(key);
            return Ok(None);
        }
        e.hit_count += 1;
        Ok(Some(CacheEntry {
            value: e.value.clone(),
            meta: e.meta.clone(),
            created_at: e.created_at,
            expires_at: e.expires_at,
            hits: e.hit_count,
        }))
    }

    fn set_at(
        &mut self,
        key: &str,
        value: &Value,
        ttl_secs: u64,
        meta: &CacheMeta,
        now: u64,
    ) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.clone(),
                meta: meta.clone(),
                created_at: now,
                expires_at: expiry_after(now, ttl_secs),
                hit_count: 0,
            },
        );
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn exists_at(&self, key: &str, now: u64) -> Result<bool> {
        Ok(self.entries.get(key).is_some_and(|e| e.expires_at > now))
    }

    fn clear(&mut self) -> Result<u64> {
        let n = self.entries.len() as u64;
        self.entries.clear();
        Ok(n)
    }

    fn clear_expired_at(&mut self, now: u64) -> Result<u64> {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        Ok((before - self.entries.len()) as u64)
    }

    fn stats_at(&self, now: u64) -> Result<CacheStats> {
        let mut stats = CacheStats {
            backend: self.backend_name().into(),
            ..CacheStats::default()
        };
        for e in self.entries.values() {
            let t = stats.by_type.entry(e.meta.result_type.clone()).or_default();
            t.entries += 1;
            t.hits += e.hit_count;
            stats.total_entries += 1;
            stats.total_hits += e.hit_count;
            if e.expires_at <= now {
                stats.expired_entries += 1;
            }
        }
        Ok(stats)
    }
}

// --- Layered cache ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredStats {
    pub primary: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<CacheStats>,
}

/// A primary backend with an optional fallback. Reads fall through to the
/// fallback and repopulate the primary with the remaining TTL; writes go to
/// both. A failing layer is logged and skipped so one broken backend never
/// takes the tools down.
pub struct CacheStore {
    primary: Box<dyn CacheBackend>,
    fallback: Option<Box<dyn CacheBackend>>,
}

impl CacheStore {
    pub fn new(primary: Box<dyn CacheBackend>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(primary: Box<dyn CacheBackend>, fallback: Box<dyn CacheBackend>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    pub fn describe(&self) -> String {
        match &self.fallback {
            Some(f) => format!("{} -> {}", self.primary.backend_name(), f.backend_name()),
            None => self.primary.backend_name().to_string(),
        }
    }

    pub fn get_at(&mut self, key: &str, now: u64) -> Option<CacheEntry> {
        match self.primary.get_at(key, now) {
            Ok(Some(hit)) => return Some(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "primary cache read failed"),
        }
        let fallback = self.fallback.as_mut()?;
        let hit = match fallback.get_at(key, now) {
            Ok(hit) => hit?,
            Err(e) => {
                tracing::warn!(key, error = %e, "fallback cache read failed");
                return None;
            }
        };
        let ttl = hit.remaining_ttl(now);
        if let Err(e) = self.primary.set_at(key, &hit.value, ttl, &hit.meta, now) {
            tracing::warn!(key, error = %e, "cache repopulate failed");
        } else {
            tracing::debug!(key, ttl, "repopulated primary cache");
        }
        Some(hit)
    }

    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, now_unix_secs())
    }

    /// Returns true when at least one layer accepted the write.
    pub fn set_at(
        &mut self,
        key: &str,
        value: &Value,
        ttl_secs: u64,
        meta: &CacheMeta,
        now: u64,
    ) -> bool {
        let mut stored = match self.primary.set_at(key, value, ttl_secs, meta, now) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "primary cache write failed");
                false
            }
        };
        if let Some(fallback) = self.fallback.as_mut() {
            match fallback.set_at(key, value, ttl_secs, meta, now) {
                Ok(()) => stored = true,
                Err(e) => tracing::warn!(key, error = %e, "fallback cache write failed"),
            }
        }
        stored
    }

    pub fn set(&mut self, key: &str, value: &Value, ttl_secs: u64, meta: &CacheMeta) -> bool {
        self.set_at(key, value, ttl_secs, meta, now_unix_secs())
    }

    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let mut removed = self.primary.delete(key)?;
        if let Some(fallback) = self.fallback.as_mut() {
            removed |= fallback.delete(key)?;
        }
        Ok(removed)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let now = now_unix_secs();
        if self.primary.exists_at(key, now)? {
            return Ok(true);
        }
        match &self.fallback {
            Some(f) => f.exists_at(key, now),
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) -> Result<u64> {
        let mut n = self.primary.clear()?;
        if let Some(fallback) = self.fallback.as_mut() {
            n += fallback.clear()?;
        }
        Ok(n)
    }

    pub fn clear_expired_at(&mut self, now: u64) -> Result<u64> {
        let mut n = self.primary.clear_expired_at(now)?;
        if let Some(fallback) = self.fallback.as_mut() {
            n += fallback.clear_expired_at(now)?;
        }
        Ok(n)
    }

    pub fn clear_expired(&mut self) -> Result<u64> {
        self.clear_expired_at(now_unix_secs())
    }

    pub fn stats(&self) -> Result<LayeredStats> {
        let now = now_unix_secs();
        Ok(LayeredStats {
            primary: self.primary.stats_at(now)?,
            fallback: match &self.fallback {
                Some(f) => Some(f.stats_at(now)?),
                None => None,
            },
        })
    }
}

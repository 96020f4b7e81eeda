//! Concurrent response store with optional persistence.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::key::CacheKey;
use crate::config::CacheConfig;
use crate::http::response::Response;
use crate::observability::metrics;

/// Header added to responses served from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A stored response: everything the handler produced, headers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    /// Seconds since the epoch.
    created_at: u64,
}

impl CacheEntry {
    pub fn from_response(response: &Response) -> Self {
        Self {
            status: response.status_code(),
            headers: response.headers().clone(),
            body: response.body().clone(),
            created_at: now_secs(),
        }
    }

    /// Rebuild the response, marked as a cache hit.
    pub fn to_response(&self) -> Response {
        Response::new(self.status, self.body.clone())
            .with_headers(self.headers.clone())
            .with_header(X_CACHE, HeaderValue::from_static("HIT"))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    fn is_expired(&self, ttl: Option<Duration>, now: u64) -> bool {
        match ttl {
            Some(ttl) => now.saturating_sub(self.created_at) >= ttl.as_secs(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn aged(mut self, secs: u64) -> Self {
        self.created_at = self.created_at.saturating_sub(secs);
        self
    }
}

/// On-disk form of one entry. Headers whose values are not UTF-8 are not
/// persisted.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    key: CacheKey,
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    created_at: u64,
}

impl PersistedEntry {
    fn new(key: &CacheKey, entry: &CacheEntry) -> Self {
        Self {
            key: key.clone(),
            status: entry.status.as_u16(),
            headers: entry
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    let value = value.to_str().ok()?;
                    Some((name.as_str().to_string(), value.to_string()))
                })
                .collect(),
            body: entry.body.to_vec(),
            created_at: entry.created_at,
        }
    }

    fn into_entry(self) -> Option<(CacheKey, CacheEntry)> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).ok()?,
                HeaderValue::from_str(value).ok()?,
            );
        }
        Some((
            self.key,
            CacheEntry {
                status,
                headers,
                body: Bytes::from(self.body),
                created_at: self.created_at,
            },
        ))
    }
}

/// Point-in-time counters for the admin view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: u64,
}

/// A thread-safe response cache shared by every worker.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    enabled: AtomicBool,
    ttl_secs: AtomicU64,
    max_entries: usize,
    persistence_path: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: AtomicBool::new(config.enabled),
            ttl_secs: AtomicU64::new(config.ttl_secs),
            max_entries: config.max_entries,
            persistence_path: config.persistence_path.clone(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turning the cache off also drops what it holds.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::Relaxed);
        if was && !enabled {
            self.clear();
        }
        if was != enabled {
            tracing::info!(enabled, "Response cache toggled");
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self.ttl_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn set_ttl(&self, ttl: Option<Duration>) {
        self.ttl_secs
            .store(ttl.map(|t| t.as_secs()).unwrap_or(0), Ordering::Relaxed);
    }

    /// Look up a live entry. Expired entries are removed on sight.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        if !self.is_enabled() {
            return None;
        }

        // Clone out so the shard lock is released before any removal.
        let found = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        let ttl = self.ttl();
        let now = now_secs();

        let result = match found {
            Some(entry) if entry.is_expired(ttl, now) => {
                self.entries.remove_if(key, |_, e| e.is_expired(ttl, now));
                None
            }
            other => other,
        };

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(result.is_some());
        result
    }

    /// Store an entry. Ignored while disabled or when full of live entries.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        if !self.is_enabled() {
            return;
        }

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                tracing::debug!(
                    key = %key,
                    max_entries = self.max_entries,
                    "Response cache full, not storing"
                );
                return;
            }
        }

        self.entries.insert(key, Arc::new(entry));
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry produced by one binding.
    pub fn invalidate_binding(&self, binding: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.binding() != binding);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_secs: self.ttl_secs.load(Ordering::Relaxed),
        }
    }

    fn purge_expired(&self) {
        let ttl = self.ttl();
        if ttl.is_none() {
            return;
        }
        let now = now_secs();
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.persistence_path.as_deref()
    }

    /// Warm the cache from the snapshot file, if configured and present.
    ///
    /// Returns how many live entries were loaded.
    pub fn load_from_file(&self) -> io::Result<usize> {
        let Some(path) = &self.persistence_path else {
            return Ok(0);
        };
        if !self.is_enabled() || !path.exists() {
            return Ok(0);
        }

        let reader = BufReader::new(File::open(path)?);
        let persisted: Vec<PersistedEntry> = serde_json::from_reader(reader)?;

        let ttl = self.ttl();
        let now = now_secs();
        let mut loaded = 0;
        for (key, entry) in persisted.into_iter().filter_map(PersistedEntry::into_entry) {
            if entry.is_expired(ttl, now) || self.entries.len() >= self.max_entries {
                continue;
            }
            self.entries.insert(key, Arc::new(entry));
            loaded += 1;
        }

        tracing::info!(path = ?path, entries = loaded, "Loaded response cache snapshot");
        Ok(loaded)
    }

    /// Write the snapshot file, if configured. Returns entries written.
    pub fn save_to_file(&self) -> io::Result<usize> {
        let Some(path) = &self.persistence_path else {
            return Ok(0);
        };

        let snapshot: Vec<PersistedEntry> = self
            .entries
            .iter()
            .map(|r| PersistedEntry::new(r.key(), r.value()))
            .collect();

        // Write beside the target, then rename, so a crash never leaves half a file.
        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &snapshot)?;
        }
        fs::rename(&tmp, path)?;

        tracing::info!(path = ?path, entries = snapshot.len(), "Saved response cache snapshot");
        Ok(snapshot.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Params;
    use axum::http::header;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl_secs: 0,
            max_entries: 100,
            persistence_path: None,
        }
    }

    fn key(id: &str) -> CacheKey {
        let mut params = Params::new();
        params.push("id", id);
        CacheKey::new("item", &params, None)
    }

    fn entry(body: &'static str) -> CacheEntry {
        CacheEntry::from_response(&Response::text(body))
    }

    #[test]
    fn test_cache_operations() {
        let cache = ResponseCache::new(&config());
        assert!(cache.get(&key("1")).is_none());

        cache.put(key("1"), entry("one"));
        let hit = cache.get(&key("1")).unwrap();
        assert_eq!(hit.body(), &Bytes::from_static(b"one"));

        let response = hit.to_response();
        assert_eq!(response.headers().get(X_CACHE).unwrap(), "HIT");
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));

        assert!(cache.invalidate(&key("1")));
        assert!(cache.get(&key("1")).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(&CacheConfig {
            enabled: false,
            ..config()
        });
        cache.put(key("1"), entry("one"));
        assert!(cache.is_empty());
        assert!(cache.get(&key("1")).is_none());

        cache.set_enabled(true);
        cache.put(key("1"), entry("one"));
        assert_eq!(cache.len(), 1);

        cache.set_enabled(false);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = ResponseCache::new(&CacheConfig { ttl_secs: 60, ..config() });
        cache.put(key("old"), entry("stale").aged(120));
        cache.put(key("new"), entry("fresh"));

        assert!(cache.get(&key("old")).is_none());
        assert!(cache.get(&key("new")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn respects_max_entries() {
        let cache = ResponseCache::new(&CacheConfig { max_entries: 2, ..config() });
        cache.put(key("1"), entry("1"));
        cache.put(key("2"), entry("2"));
        cache.put(key("3"), entry("3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("3")).is_none());

        // Replacing an existing key is always allowed.
        cache.put(key("1"), entry("1b"));
        assert_eq!(cache.get(&key("1")).unwrap().body(), &Bytes::from_static(b"1b"));
    }

    #[test]
    fn invalidate_binding_only_touches_that_binding() {
        let cache = ResponseCache::new(&config());
        cache.put(key("1"), entry("1"));
        cache.put(CacheKey::new("other", &Params::new(), None), entry("x"));

        assert_eq!(cache.invalidate_binding("item"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn visible_across_threads() {
        let cache = Arc::new(ResponseCache::new(&config()));
        let writer = Arc::clone(&cache);
        std::thread::spawn(move || writer.put(key("1"), entry("shared")))
            .join()
            .unwrap();

        let reader = Arc::clone(&cache);
        let body = std::thread::spawn(move || reader.get(&key("1")).map(|e| e.body().clone()))
            .join()
            .unwrap();
        assert_eq!(body, Some(Bytes::from_static(b"shared")));
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let config = CacheConfig {
            persistence_path: Some(path.clone()),
            ..config()
        };

        let cache = ResponseCache::new(&config);
        cache.put(key("1"), entry("persisted"));
        assert_eq!(cache.save_to_file().unwrap(), 1);

        let warmed = ResponseCache::new(&config);
        assert_eq!(warmed.load_from_file().unwrap(), 1);
        let hit = warmed.get(&key("1")).unwrap();
        assert_eq!(hit.body(), &Bytes::from_static(b"persisted"));
        assert_eq!(hit.to_response().content_type(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn persistence_keeps_handler_headers() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            persistence_path: Some(dir.path().join("cache.json")),
            ..config()
        };

        let response = Response::text("tagged")
            .with_header(header::ETAG, HeaderValue::from_static("\"v1\""))
            .with_header(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"))
            .with_header(
                HeaderName::from_static("x-opaque"),
                HeaderValue::from_bytes(b"\xff").unwrap(),
            );
        let cache = ResponseCache::new(&config);
        cache.put(key("1"), CacheEntry::from_response(&response));
        cache.save_to_file().unwrap();

        let warmed = ResponseCache::new(&config);
        warmed.load_from_file().unwrap();
        let hit = warmed.get(&key("1")).unwrap().to_response();
        assert_eq!(hit.headers()[header::ETAG], "\"v1\"");
        assert_eq!(hit.headers()[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(hit.headers()[X_CACHE], "HIT");
        assert!(hit.headers().get("x-opaque").is_none());
    }

    #[test]
    fn missing_snapshot_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(&CacheConfig {
            persistence_path: Some(dir.path().join("absent.json")),
            ..config()
        });
        assert_eq!(cache.load_from_file().unwrap(), 0);
    }
}

pub mod keys;

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::generation::{GeneratedContent, GenerationMode};
use crate::persistence::{KeyValueStore, LoadReport, PersistenceError, Records};

pub use keys::{quality_bucket, CacheKey, ModeTtls};

const TTL_JITTER_RATIO: f64 = 0.1;
const DEFAULT_CAPACITY: usize = 1024;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const CACHE_NAMESPACE: &str = "content_cache";

type SharedFlight = Shared<BoxFuture<'static, GeneratedContent>>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttls: ModeTtls,
    pub ttl_jitter_ratio: f64,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttls: ModeTtls::default(),
            ttl_jitter_ratio: TTL_JITTER_RATIO,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: GeneratedContent,
    quality_score: f64,
    mode: GenerationMode,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        self.ttl.is_zero() || age >= self.ttl
    }

    fn into_live(self, key: CacheKey, now: DateTime<Utc>) -> Option<(CacheKey, Self)> {
        let usable = self.quality_score.is_finite() && !self.is_expired(now);
        usable.then_some((key, self))
    }
}

/// On-disk form of one entry; the record map is keyed by the rendered `CacheKey`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    key: CacheKey,
    payload: GeneratedContent,
    quality_score: f64,
    mode: GenerationMode,
    created_at: DateTime<Utc>,
    ttl_ms: u64,
}

enum FlightStep {
    Hit(GeneratedContent),
    Join(SharedFlight),
    Lead(SharedFlight),
}

/// How a `get_or_generate` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Cached,
    Leader,
    Follower,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    joined: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub joined: u64,
}

pub struct ContentCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedFlight>>>,
    config: CacheConfig,
    counters: CacheCounters,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            config,
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lookup(
        &self,
        entries: &mut LruCache<CacheKey, CacheEntry>,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> Option<GeneratedContent> {
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let mut payload = entry.payload.clone();
                payload.cache_hit = true;
                payload.quality_score = entry.quality_score;
                payload.generation_mode = entry.mode;
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(payload);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn get(&self, key: &CacheKey) -> Option<GeneratedContent> {
        let mut entries = self.entries.lock();
        self.lookup(&mut entries, key, Utc::now())
    }

    /// Stores `payload` unless `ttl` is zero. Returns whether it was stored.
    pub fn put(
        &self,
        key: CacheKey,
        payload: GeneratedContent,
        quality_score: f64,
        mode: GenerationMode,
        ttl: Duration,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let entry = CacheEntry {
            payload,
            quality_score,
            mode,
            created_at: Utc::now(),
            ttl,
        };

        let evicted = self.entries.lock().push(key.clone(), entry);
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        if let Some((old_key, _)) = evicted {
            if old_key != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %old_key, "cache entry evicted");
            }
        }
        true
    }

    /// Configured TTL for `mode` with jitter applied. Zero stays zero.
    pub fn ttl_for(&self, mode: GenerationMode) -> Duration {
        let base = self.config.ttls.for_mode(mode);
        apply_ttl_jitter(base, self.config.ttl_jitter_ratio)
    }

    /// Returns the cached value for `key`, joins an in-flight generation for it,
    /// or runs `produce` as the single leader. The registry entry is removed once
    /// `produce` resolves, so any cache write it performs is visible first.
    pub async fn get_or_generate<F>(&self, key: CacheKey, produce: F) -> (GeneratedContent, FlightRole)
    where
        F: Future<Output = GeneratedContent> + Send + 'static,
    {
        let step = {
            let mut registry = self.in_flight.lock();
            if let Some(flight) = registry.get(&key) {
                FlightStep::Join(flight.clone())
            } else {
                let cached = {
                    let mut entries = self.entries.lock();
                    self.lookup(&mut entries, &key, Utc::now())
                };
                match cached {
                    Some(content) => FlightStep::Hit(content),
                    None => {
                        let cleanup = Arc::clone(&self.in_flight);
                        let flight_key = key.clone();
                        let flight: SharedFlight = async move {
                            let result = produce.await;
                            cleanup.lock().remove(&flight_key);
                            result
                        }
                        .boxed()
                        .shared();
                        registry.insert(key.clone(), flight.clone());
                        FlightStep::Lead(flight)
                    }
                }
            }
        };

        match step {
            FlightStep::Hit(content) => (content, FlightRole::Cached),
            FlightStep::Join(flight) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight generation");
                (flight.await, FlightRole::Follower)
            }
            FlightStep::Lead(flight) => (flight.await, FlightRole::Leader),
        }
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn invalidate_item(&self, item: &str) -> usize {
        let mut entries = self.entries.lock();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(k, _)| k.item == item)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        if !expired.is_empty() {
            self.counters
                .expirations
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
        }
        expired.len()
    }

    /// Writes live entries to `store`, most recently used first.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<usize, PersistenceError> {
        let now = Utc::now();
        let mut records = Records::new();
        {
            let entries = self.entries.lock();
            for (rank, (key, entry)) in entries.iter().enumerate() {
                if entry.is_expired(now) {
                    continue;
                }
                let stored = StoredEntry {
                    key: key.clone(),
                    payload: entry.payload.clone(),
                    quality_score: entry.quality_score,
                    mode: entry.mode,
                    created_at: entry.created_at,
                    ttl_ms: u64::try_from(entry.ttl.as_millis()).unwrap_or(u64::MAX),
                };
                let mut value = serde_json::to_value(&stored).map_err(PersistenceError::Serialize)?;
                if let Some(object) = value.as_object_mut() {
                    object.insert("rank".to_string(), rank.into());
                }
                records.insert(key.to_string(), value);
            }
        }

        let count = records.len();
        if let Err(e) = store.write_all(CACHE_NAMESPACE, &records) {
            error!(error = %e, "failed to save content cache");
            return Err(e);
        }
        debug!(count, "content cache saved");
        Ok(count)
    }

    /// Restores entries saved by [`save`](Self::save). Expired and malformed
    /// records are skipped; a missing or unreadable store leaves the cache as is.
    pub fn load(&self, store: &dyn KeyValueStore) -> LoadReport {
        let records = match store.read_all(CACHE_NAMESPACE) {
            Ok(records) => records,
            Err(PersistenceError::NotFound(path)) => {
                debug!(path = %path, "no saved content cache");
                return LoadReport::default();
            }
            Err(e) => {
                warn!(error = %e, "content cache unreadable, starting empty");
                return LoadReport::default();
            }
        };

        let now = Utc::now();
        let mut report = LoadReport::default();
        let mut restored: Vec<(u64, CacheKey, CacheEntry)> = Vec::with_capacity(records.len());
        for (name, value) in records {
            let rank = value.get("rank").and_then(|r| r.as_u64()).unwrap_or(u64::MAX);
            let entry = match serde_json::from_value::<StoredEntry>(value) {
                Ok(stored) => CacheEntry {
                    payload: stored.payload,
                    quality_score: stored.quality_score,
                    mode: stored.mode,
                    created_at: stored.created_at,
                    ttl: Duration::from_millis(stored.ttl_ms),
                }
                .into_live(stored.key, now),
                Err(_) => None,
            };
            match entry {
                Some((key, entry)) => restored.push((rank, key, entry)),
                None => {
                    debug!(key = %name, "skipping stale or malformed cache record");
                    report.skipped += 1;
                }
            }
        }

        // least recently used first, so the saved order survives the reload
        restored.sort_by(|a, b| b.0.cmp(&a.0));
        let mut entries = self.entries.lock();
        for (_, key, entry) in restored {
            entries.push(key, entry);
            report.loaded += 1;
        }
        info!(loaded = report.loaded, skipped = report.skipped, "content cache loaded");
        report
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = cache.config.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = {
            let guard = self.entries.lock();
            (guard.len(), guard.cap().get())
        };
        CacheStats {
            entries,
            capacity,
            in_flight: self.in_flight.lock().len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            joined: self.counters.joined.load(Ordering::Relaxed),
        }
    }
}

fn apply_ttl_jitter(ttl: Duration, ratio: f64) -> Duration {
    if ttl.is_zero() || !ratio.is_finite() || ratio <= 0.0 {
        return ttl;
    }
    let ratio = ratio.min(0.5);
    let base_ms = ttl.as_millis() as f64;
    let factor = rand::rng().random_range(1.0 - ratio..=1.0 + ratio);
    Duration::from_millis((base_ms * factor).round().max(1.0) as u64)
}

use crate::clock::Clock;
use crate::error::PageviewsResult;
use crate::metrics::Metrics;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Storage key for the serialized cache blob.
pub const CACHE_KEY: &str = "views-cache-all";

/// Default freshness window for cached counts.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Persisted shape of the cache: one map of counts plus one timestamp.
///
/// The whole map shares a single timestamp; a write re-stamps everything.
/// Deserialization is the schema validation step: a blob that does not
/// parse into this shape is treated as corrupt and purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheBlob {
    views: HashMap<String, u64>,
    /// Milliseconds since the Unix epoch
    timestamp: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    views: HashMap<String, u64>,
    written_at: Option<SystemTime>,
}

/// Time-windowed local cache of last-known counts.
///
/// Best-effort by design: reads never block on I/O, storage failures are
/// swallowed and counted, and a stale or corrupt entry is indistinguishable
/// from an absent one. One fixed freshness window applies uniformly; there
/// is no per-slug TTL.
pub struct ViewsCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    metrics: Arc<Metrics>,
    state: RwLock<CacheState>,
}

impl ViewsCache {
    /// Create a cache over the given storage, warming it from any persisted
    /// blob that is still fresh. A stale or corrupt blob is removed.
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cache = Self {
            storage,
            clock,
            ttl,
            metrics,
            state: RwLock::new(CacheState::default()),
        };
        cache.warm_from_storage();
        cache
    }

    fn warm_from_storage(&self) {
        let blob = match self.storage.get_item(CACHE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<CacheBlob>(&raw) {
                Ok(blob) => blob,
                Err(e) => {
                    debug!(error = %e, "Corrupt cache blob, purging");
                    self.purge();
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Cache storage read failed");
                self.metrics.record_storage_failure();
                return;
            }
        };

        let written_at = UNIX_EPOCH + Duration::from_millis(blob.timestamp);
        if self.is_fresh(written_at) {
            let mut state = self.state.write().expect("cache lock poisoned");
            state.views = blob.views;
            state.written_at = Some(written_at);
            trace!(entries = state.views.len(), "Warmed cache from storage");
        } else {
            debug!("Persisted cache blob expired, purging");
            self.purge();
        }
    }

    fn is_fresh(&self, written_at: SystemTime) -> bool {
        match self.clock.now().duration_since(written_at) {
            Ok(age) => age < self.ttl,
            // written_at in the future (clock skew): treat as fresh
            Err(_) => true,
        }
    }

    /// Read the cached count for a slug.
    ///
    /// Returns `None` if the slug is unknown or the cache is past its
    /// freshness window; an expired cache is purged eagerly.
    pub fn read(&self, slug: &str) -> Option<u64> {
        {
            let state = self.state.read().expect("cache lock poisoned");
            match state.written_at {
                Some(written_at) if self.is_fresh(written_at) => {
                    return match state.views.get(slug).copied() {
                        Some(views) => {
                            self.metrics.record_cache_hit();
                            Some(views)
                        }
                        None => {
                            self.metrics.record_cache_miss();
                            None
                        }
                    };
                }
                Some(_) => {} // expired, fall through to purge
                None => {
                    self.metrics.record_cache_miss();
                    return None;
                }
            }
        }

        self.purge();
        self.metrics.record_cache_purge();
        self.metrics.record_cache_miss();
        None
    }

    /// Merge counts into the cache, re-stamp the freshness window, and
    /// persist. Last write wins; storage failures are swallowed.
    pub fn write(&self, counts: HashMap<String, u64>) {
        let now = self.clock.now();
        let blob = {
            let mut state = self.state.write().expect("cache lock poisoned");
            state.views.extend(counts);
            state.written_at = Some(now);
            CacheBlob {
                views: state.views.clone(),
                timestamp: now
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            }
        };

        self.persist(&blob);
    }

    /// Write a single count. Same semantics as `write`.
    pub fn write_one(&self, slug: &str, views: u64) {
        self.write(HashMap::from([(slug.to_string(), views)]));
    }

    fn persist(&self, blob: &CacheBlob) {
        let raw = match serde_json::to_string(blob) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Failed to serialize cache blob");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(CACHE_KEY, &raw) {
            debug!(error = %e, "Cache storage write failed");
            self.metrics.record_storage_failure();
        }
    }

    /// Drop all cached counts and remove the persisted blob.
    pub fn purge(&self) {
        {
            let mut state = self.state.write().expect("cache lock poisoned");
            state.views.clear();
            state.written_at = None;
        }
        if let Err(e) = self.storage.remove_item(CACHE_KEY) {
            debug!(error = %e, "Cache storage remove failed");
            self.metrics.record_storage_failure();
        }
    }

    /// Current cached counts, ignoring freshness. For diagnostics only.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.state
            .read()
            .expect("cache lock poisoned")
            .views
            .clone()
    }
}

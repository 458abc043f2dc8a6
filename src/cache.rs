//! Read cache - short-TTL memoization of evidence reads
//!
//! Entries expire lazily: an expired entry is purged by the read that finds
//! it stale. The whole cache is cleared when a watched log changes and when
//! the audio device goes idle.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Cache key for the streaming-service reader
pub const SPOTIFY_KEY: &str = "spotify";
/// Cache key for the AirPlay reader
pub const AIRPLAY_KEY: &str = "airplay";
/// Cache key for the radio reader
pub const RADIO_KEY: &str = "radio";

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

/// TTL cache keyed by evidence-source identifier
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone)]
pub struct ReadCache<V> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<V: Clone> ReadCache<V> {
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh value, purging it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(entry) => now.duration_since(entry.cached_at) < self.ttl,
            None => {
                trace!(key, "cache miss");
                return None;
            }
        };

        if fresh {
            trace!(key, "cache hit");
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            trace!(key, "cache entry expired");
            entries.remove(key);
            None
        }
    }

    /// Store a value stamped with the current time
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            cached_at: Instant::now(),
        };
        self.entries.lock().insert(key.into(), entry);
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            trace!(count = entries.len(), "clearing read cache");
            entries.clear();
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

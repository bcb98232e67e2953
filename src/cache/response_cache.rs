//! LLM response cache with TTL expiry and LRU eviction.
//!
//! Cache key is a SHA-256 digest of `(prompt, model, max_tokens, temperature)`.
//! Lookups are exact: no whitespace or case folding of the prompt. Entries
//! expire `ttl_secs` after they were stored and are evicted least-recently-used
//! first once the cache holds more than `max_size` entries.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CacheConfig;

/// A single cached LLM response.
#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    created_at: DateTime<Utc>,
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    expired: u64,
    evictions: u64,
}

/// Bounded exact-match response cache.
///
/// Every operation takes a single mutex, so no caller ever observes more than
/// `max_size` entries and recency order is the order in which calls acquired
/// the lock.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    ttl: TimeDelta,
    ttl_secs: u64,
    max_size: NonZeroUsize,
}

impl ResponseCache {
    /// Create a cache holding at most `max_size` entries for `ttl_secs` each.
    ///
    /// `max_size` is clamped to a minimum of 1.
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        let max_size = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_size),
                hits: 0,
                misses: 0,
                expired: 0,
                evictions: 0,
            }),
            ttl,
            ttl_secs,
            max_size,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl_secs)
    }

    /// Build a deterministic cache key over the request-shaping parameters.
    ///
    /// Strings are length-prefixed so that shifting characters between
    /// `prompt` and `model` cannot produce the same digest. `temperature` is
    /// hashed by its IEEE-754 bits.
    pub fn make_key(prompt: &str, model: &str, max_tokens: u32, temperature: f32) -> String {
        let mut hasher = Sha256::new();
        hasher.update((prompt.len() as u64).to_le_bytes());
        hasher.update(prompt.as_bytes());
        hasher.update((model.len() as u64).to_le_bytes());
        hasher.update(model.as_bytes());
        hasher.update(max_tokens.to_le_bytes());
        hasher.update(temperature.to_bits().to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a cached response. Returns `None` if the key is absent or expired.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    /// [`get`](Self::get) against an explicit clock reading.
    ///
    /// A hit promotes the entry to most-recently-used. An expired entry is
    /// removed and reported as a miss.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let age = state
            .entries
            .peek(key)
            .map(|entry| now.signed_duration_since(entry.created_at));
        match age {
            None => {
                state.misses += 1;
                None
            }
            Some(age) if age >= self.ttl => {
                debug!(key = %short(key), "Cache entry expired, removing");
                state.entries.pop(key);
                state.expired += 1;
                state.misses += 1;
                None
            }
            Some(_) => {
                state.hits += 1;
                state.entries.get(key).map(|entry| entry.response.clone())
            }
        }
    }

    /// Store a response, making it the most-recently-used entry.
    pub fn set(&self, key: impl Into<String>, response: impl Into<String>) {
        self.set_at(key, response, Utc::now());
    }

    /// [`set`](Self::set) against an explicit clock reading.
    ///
    /// Re-setting an existing key replaces its value and timestamp. Inserting
    /// past capacity evicts the least-recently-used entry.
    pub fn set_at(&self, key: impl Into<String>, response: impl Into<String>, now: DateTime<Utc>) {
        let key = key.into();
        let entry = CacheEntry {
            response: response.into(),
            created_at: now,
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        // `push` hands back either the replaced entry for this key or the
        // LRU entry it displaced.
        if let Some((displaced, _)) = state.entries.push(key.clone(), entry) {
            if displaced != key {
                debug!(key = %short(&displaced), "Evicting LRU cache entry");
                state.evictions += 1;
            }
        }
    }

    /// Whether `key` is stored, without touching its recency or expiring it.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    /// Remove all entries. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Return the number of entries currently in the cache.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Return `true` if the cache contains no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Return aggregate statistics about the cache.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            expired: state.expired,
            evictions: state.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }

    // -- private helpers ---------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub entries: usize,
    /// Lookups that returned a stored response.
    pub hits: u64,
    /// Lookups that found nothing usable, including expired entries.
    pub misses: u64,
    /// Entries dropped because their TTL had passed.
    pub expired: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub hit_rate: f64,
}

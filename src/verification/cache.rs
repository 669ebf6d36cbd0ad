//! Result caching for verification requests.
//!
//! Cache keys are content-stable fingerprints: two requests with the same
//! content, source, context, and strategy selection share an entry no
//! matter how the strategy list was ordered.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{Priority, VerificationRequest, VerificationResult};

/// Content-stable fingerprint of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Compute the fingerprint for a request.
    ///
    /// Strategy kinds are sorted before hashing, so the fingerprint is a
    /// fixed point: re-canonicalizing an already-canonical request changes
    /// nothing.
    pub fn for_request(request: &VerificationRequest) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(b"content:");
        hasher.update(request.content.as_bytes());
        hasher.update(b"\n");

        if let Some(source) = &request.source {
            hasher.update(b"source:");
            hasher.update(source.as_bytes());
            hasher.update(b"\n");
        }

        if let Some(context) = &request.context {
            hasher.update(b"context:");
            hasher.update(context.as_bytes());
            hasher.update(b"\n");
        }

        if let Some(strategies) = &request.strategies {
            let mut names: Vec<String> = strategies.iter().map(|k| k.to_string()).collect();
            names.sort();
            names.dedup();
            for name in names {
                hasher.update(b"strategy:");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
            }
        }

        let hash = hasher.finalize();
        Fingerprint(format!("{:x}", hash))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..16]) // Short form for display
    }
}

/// A cached verification result with access bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint this entry is stored under
    pub key: Fingerprint,
    /// The cached result
    pub result: VerificationResult,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Number of cache hits
    pub access_count: u64,
    /// When the entry was last read
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: Fingerprint, result: VerificationResult, ttl_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            result,
            created_at: now,
            ttl_ms,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// Check if the entry has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::milliseconds(self.ttl_ms as i64)
    }

    /// Record a cache hit.
    pub fn record_hit(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Deduplicating result cache owned by the verification engine.
///
/// Single writer per key under the cache lock; readers get cloned
/// snapshots. Entry mutation (access counters) happens under the same
/// write lock, so counts never race.
pub struct VerificationCache {
    entries: Arc<RwLock<HashMap<Fingerprint, CacheEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
    default_ttl_ms: u64,
}

impl VerificationCache {
    /// Create a cache with the given default TTL.
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            default_ttl_ms,
        }
    }

    /// Look up a fresh entry, bumping its access counters.
    ///
    /// Returns `None` for a miss or an expired entry.
    pub async fn get(&self, key: &Fingerprint) -> Option<VerificationResult> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.record_hit();
                stats.hits += 1;
                Some(entry.result.clone())
            }
            _ => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a result. Critical-priority requests get double TTL.
    pub async fn insert(
        &self,
        key: Fingerprint,
        result: VerificationResult,
        priority: Priority,
    ) {
        let ttl_ms = match priority {
            Priority::Critical => self.default_ttl_ms * 2,
            _ => self.default_ttl_ms,
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.clone(), CacheEntry::new(key, result, ttl_ms));

        let mut stats = self.stats.write().await;
        stats.entry_count = entries.len() as u64;
    }

    /// Access count for an entry, if present.
    pub async fn access_count(&self, key: &Fingerprint) -> Option<u64> {
        let entries = self.entries.read().await;
        entries.get(key).map(|e| e.access_count)
    }

    /// Drop expired entries.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));

        let mut stats = self.stats.write().await;
        stats.entry_count = entries.len() as u64;
    }

    /// Drop everything and reset statistics.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();

        let mut stats = self.stats.write().await;
        *stats = CacheStats::default();
    }

    /// Current statistics snapshot.
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Number of live (possibly expired but unswept) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

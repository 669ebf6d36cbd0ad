//! Content cache and per-domain rate limiting for the crawler.
//!
//! The content cache is URL-keyed with TTL, hit counters, and LRU
//! eviction under a byte budget. The domain table holds one token bucket
//! per domain with exponential backoff after throttling.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

use super::types::{DomainRateLimit, DomainStatus, WebContent};

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub cache_ttl_hours: i64,
    pub max_cache_size_mb: usize,
    pub requests_per_minute: u32,
    pub base_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            max_cache_size_mb: 100,
            requests_per_minute: 30,
            base_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        }
    }
}

/// What the caller should do before hitting a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainDecision {
    /// Proceed now
    Allow,
    /// Wait this many milliseconds (or skip, if the caller can't wait)
    Wait(u64),
    /// Domain is blocked by policy; do not fetch
    Blocked,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    content: WebContent,
    created_at: DateTime<Utc>,
    hit_count: u64,
    last_accessed: DateTime<Utc>,
    size_bytes: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_bytes: usize,
}

#[derive(Debug, Clone)]
struct DomainBucket {
    limit: DomainRateLimit,
    current_backoff_ms: u64,
}

/// Crawler-owned cache and rate-limit table.
pub struct NavigatorStore {
    config: StoreConfig,
    cache: RwLock<CacheState>,
    domains: Mutex<HashMap<String, DomainBucket>>,
}

impl NavigatorStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(CacheState::default()),
            domains: Mutex::new(HashMap::new()),
        }
    }

    // --- content cache ---

    /// Fresh cached content for a URL, bumping hit counters.
    pub async fn get_cached(&self, url: &str) -> Option<WebContent> {
        let ttl = Duration::hours(self.config.cache_ttl_hours);
        let now = Utc::now();
        let mut state = self.cache.write().await;
        match state.entries.get_mut(url) {
            Some(entry) if now - entry.created_at < ttl => {
                entry.hit_count += 1;
                entry.last_accessed = now;
                Some(entry.content.clone())
            }
            _ => None,
        }
    }

    /// Cache extracted content, evicting least-recently-used entries
    /// when the byte budget is exceeded.
    pub async fn store_content(&self, content: WebContent) {
        let size_bytes = content.content.len()
            + content.html.as_ref().map(String::len).unwrap_or(0);
        let now = Utc::now();
        let url = content.url.clone();

        let mut state = self.cache.write().await;
        if let Some(old) = state.entries.remove(&url) {
            state.total_bytes -= old.size_bytes;
        }
        state.entries.insert(
            url,
            CacheEntry {
                content,
                created_at: now,
                hit_count: 0,
                last_accessed: now,
                size_bytes,
            },
        );
        state.total_bytes += size_bytes;

        let budget = self.config.max_cache_size_mb * 1024 * 1024;
        while state.total_bytes > budget && state.entries.len() > 1 {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    if let Some(evicted) = state.entries.remove(&key) {
                        state.total_bytes -= evicted.size_bytes;
                    }
                }
                None => break,
            }
        }
    }

    /// Hit count for a cached URL.
    pub async fn hit_count(&self, url: &str) -> Option<u64> {
        self.cache.read().await.entries.get(url).map(|e| e.hit_count)
    }

    /// Bytes currently held by the cache.
    pub async fn cache_size_bytes(&self) -> usize {
        self.cache.read().await.total_bytes
    }

    /// Drop expired cache entries and reset rate-limit counters.
    pub async fn clear_caches(&self) {
        let ttl = Duration::hours(self.config.cache_ttl_hours);
        let now = Utc::now();

        let mut state = self.cache.write().await;
        state.entries.retain(|_, e| now - e.created_at < ttl);
        state.total_bytes = state.entries.values().map(|e| e.size_bytes).sum();
        drop(state);

        let mut domains = self.domains.lock().await;
        for bucket in domains.values_mut() {
            bucket.limit.requests_in_window = 0;
            bucket.limit.window_reset_at = now + Duration::minutes(1);
            if bucket.limit.status == DomainStatus::Throttled {
                bucket.limit.status = DomainStatus::Ok;
                bucket.limit.backoff_until = None;
            }
        }
    }

    // --- domain rate limiting ---

    /// Account for a request to `domain` and say whether it may proceed.
    pub async fn acquire_domain(&self, domain: &str) -> DomainDecision {
        let now = Utc::now();
        let mut domains = self.domains.lock().await;
        let bucket = domains.entry(domain.to_string()).or_insert_with(|| DomainBucket {
            limit: DomainRateLimit {
                domain: domain.to_string(),
                status: DomainStatus::Ok,
                requests_in_window: 0,
                window_reset_at: now + Duration::minutes(1),
                backoff_until: None,
                last_request_at: None,
            },
            current_backoff_ms: 0,
        });

        if bucket.limit.status == DomainStatus::Blocked {
            return DomainDecision::Blocked;
        }

        // Window rollover.
        if now > bucket.limit.window_reset_at {
            bucket.limit.requests_in_window = 0;
            bucket.limit.window_reset_at = now + Duration::minutes(1);
            // Recovery needs both the window and the backoff behind us.
            if bucket.limit.status == DomainStatus::Throttled {
                let backoff_done = bucket
                    .limit
                    .backoff_until
                    .map(|until| now >= until)
                    .unwrap_or(true);
                if backoff_done {
                    bucket.limit.status = DomainStatus::Ok;
                    bucket.limit.backoff_until = None;
                }
            }
        }

        if let Some(until) = bucket.limit.backoff_until {
            if now < until {
                let wait = (until - now).num_milliseconds().max(0) as u64;
                return DomainDecision::Wait(wait);
            }
        }

        bucket.limit.requests_in_window += 1;
        bucket.limit.last_request_at = Some(now);

        if bucket.limit.requests_in_window > self.config.requests_per_minute {
            let next_backoff = if bucket.current_backoff_ms == 0 {
                self.config.base_backoff_ms
            } else {
                ((bucket.current_backoff_ms as f64 * self.config.backoff_multiplier) as u64)
                    .min(self.config.max_backoff_ms)
            };
            bucket.current_backoff_ms = next_backoff;
            bucket.limit.status = DomainStatus::Throttled;
            bucket.limit.backoff_until =
                Some(now + Duration::milliseconds(next_backoff as i64));
            return DomainDecision::Wait(next_backoff);
        }

        bucket.current_backoff_ms = 0;
        DomainDecision::Allow
    }

    /// Apply a server-directed backoff (a 429 `Retry-After`).
    pub async fn record_retry_after(&self, domain: &str, retry_after_secs: u64) {
        let now = Utc::now();
        let mut domains = self.domains.lock().await;
        if let Some(bucket) = domains.get_mut(domain) {
            bucket.limit.status = DomainStatus::Throttled;
            bucket.limit.backoff_until =
                Some(now + Duration::seconds(retry_after_secs as i64));
        }
    }

    /// Block a domain outright.
    pub async fn block_domain(&self, domain: &str) {
        let now = Utc::now();
        let mut domains = self.domains.lock().await;
        let bucket = domains.entry(domain.to_string()).or_insert_with(|| DomainBucket {
            limit: DomainRateLimit {
                domain: domain.to_string(),
                status: DomainStatus::Ok,
                requests_in_window: 0,
                window_reset_at: now + Duration::minutes(1),
                backoff_until: None,
                last_request_at: None,
            },
            current_backoff_ms: 0,
        });
        bucket.limit.status = DomainStatus::Blocked;
    }

    /// Snapshot of a domain's rate-limit state.
    pub async fn domain_state(&self, domain: &str) -> Option<DomainRateLimit> {
        self.domains.lock().await.get(domain).map(|b| b.limit.clone())
    }
}

impl Default for NavigatorStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::types::{ContentMetadata, ContentQuality, QualityFactors};

    fn content(url: &str, body: &str) -> WebContent {
        WebContent {
            id: url.to_string(),
            url: url.to_string(),
            title: None,
            content: body.to_string(),
            html: None,
            status_code: 200,
            content_type: None,
            links: Vec::new(),
            images: Vec::new(),
            metadata: ContentMetadata::default(),
            content_hash: String::new(),
            extracted_at: Utc::now(),
            quality: ContentQuality::Medium,
            quality_factors: QualityFactors::default(),
        }
    }

    #[tokio::test]
    async fn test_cache_hits_update_counters() {
        let store = NavigatorStore::default();
        store.store_content(content("https://a.example/p", "body")).await;

        assert!(store.get_cached("https://a.example/p").await.is_some());
        assert!(store.get_cached("https://a.example/p").await.is_some());
        assert_eq!(store.hit_count("https://a.example/p").await, Some(2));
        assert!(store.get_cached("https://a.example/other").await.is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction_under_byte_budget() {
        let config = StoreConfig {
            // A zero-MB budget forces eviction down to a single entry.
            max_cache_size_mb: 0,
            ..StoreConfig::default()
        };
        let store = NavigatorStore::new(config);

        store.store_content(content("https://a.example/1", &"x".repeat(512))).await;
        store.store_content(content("https://a.example/2", &"y".repeat(512))).await;
        store.store_content(content("https://a.example/3", &"z".repeat(512))).await;

        let state = store.cache.read().await;
        assert_eq!(state.entries.len(), 1);
        assert!(state.entries.contains_key("https://a.example/3"));
    }

    #[tokio::test]
    async fn test_domain_allows_until_limit() {
        let config = StoreConfig {
            requests_per_minute: 2,
            ..StoreConfig::default()
        };
        let store = NavigatorStore::new(config);

        assert_eq!(store.acquire_domain("a.example").await, DomainDecision::Allow);
        assert_eq!(store.acquire_domain("a.example").await, DomainDecision::Allow);
        assert!(matches!(
            store.acquire_domain("a.example").await,
            DomainDecision::Wait(_)
        ));

        let state = store.domain_state("a.example").await.unwrap();
        assert_eq!(state.status, DomainStatus::Throttled);
        assert!(state.backoff_until.is_some());
    }

    #[tokio::test]
    async fn test_backoff_grows_and_caps() {
        let config = StoreConfig {
            requests_per_minute: 0,
            base_backoff_ms: 1_000,
            backoff_multiplier: 10.0,
            max_backoff_ms: 5_000,
            ..StoreConfig::default()
        };
        let store = NavigatorStore::new(config);

        let DomainDecision::Wait(first) = store.acquire_domain("a.example").await else {
            panic!("expected throttle");
        };
        assert_eq!(first, 1_000);

        // Force the backoff window open so the next request throttles again.
        {
            let mut domains = store.domains.lock().await;
            let bucket = domains.get_mut("a.example").unwrap();
            bucket.limit.backoff_until = Some(Utc::now() - Duration::seconds(1));
        }

        let DomainDecision::Wait(second) = store.acquire_domain("a.example").await else {
            panic!("expected throttle");
        };
        assert_eq!(second, 5_000);
    }

    #[tokio::test]
    async fn test_window_rollover_recovers_domain() {
        let config = StoreConfig {
            requests_per_minute: 1,
            ..StoreConfig::default()
        };
        let store = NavigatorStore::new(config);

        assert_eq!(store.acquire_domain("a.example").await, DomainDecision::Allow);
        assert!(matches!(
            store.acquire_domain("a.example").await,
            DomainDecision::Wait(_)
        ));

        // Rewind the window and backoff as if a minute had passed.
        {
            let mut domains = store.domains.lock().await;
            let bucket = domains.get_mut("a.example").unwrap();
            bucket.limit.window_reset_at = Utc::now() - Duration::seconds(1);
            bucket.limit.backoff_until = Some(Utc::now() - Duration::seconds(1));
        }

        assert_eq!(store.acquire_domain("a.example").await, DomainDecision::Allow);
        let state = store.domain_state("a.example").await.unwrap();
        assert_eq!(state.status, DomainStatus::Ok);
        assert_eq!(state.requests_in_window, 1);
    }

    #[tokio::test]
    async fn test_blocked_domain_stays_blocked() {
        let store = NavigatorStore::default();
        store.block_domain("bad.example").await;

        assert_eq!(
            store.acquire_domain("bad.example").await,
            DomainDecision::Blocked
        );
    }

    #[tokio::test]
    async fn test_retry_after_applies_backoff() {
        let store = NavigatorStore::default();
        store.acquire_domain("a.example").await;
        store.record_retry_after("a.example", 30).await;

        assert!(matches!(
            store.acquire_domain("a.example").await,
            DomainDecision::Wait(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_caches_resets_counters() {
        let config = StoreConfig {
            requests_per_minute: 1,
            ..StoreConfig::default()
        };
        let store = NavigatorStore::new(config);
        store.store_content(content("https://a.example/p", "body")).await;
        store.acquire_domain("a.example").await;
        store.acquire_domain("a.example").await;

        store.clear_caches().await;

        let state = store.domain_state("a.example").await.unwrap();
        assert_eq!(state.status, DomainStatus::Ok);
        assert_eq!(state.requests_in_window, 0);
        // Unexpired content survives the sweep.
        assert!(store.get_cached("https://a.example/p").await.is_some());
    }
}

//! Web navigator: rate-limited, robots-aware, cycle-safe crawling.
//!
//! [`WebNavigator`] is the facade the rest of the system talks to. It
//! owns the content extractor, the traversal engine, the content cache,
//! and the per-domain rate-limit table.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::health::HealthStatus;

pub mod extractor;
pub mod robots;
pub mod store;
pub mod traversal;
pub mod types;

pub use extractor::{
    content_hash, sanitize_html, score_quality, validate_url, ContentExtractor, FetchedPage,
    HttpPageFetcher, PageFetcher,
};
pub use robots::RobotsCache;
pub use store::{DomainDecision, NavigatorStore, StoreConfig};
pub use traversal::TraversalEngine;
pub use types::{
    host_of, normalize_url, ContentExtractionConfig, ContentMetadata, ContentQuality,
    DomainRateLimit, DomainStatus, ImageInfo, LinkInfo, PageEdge, PageNode, PageStatus,
    QualityFactors, TraversalConfig, TraversalResult, TraversalStats, TraversalStrategy,
    WebContent,
};

/// Error-rate EMA smoothing factor.
const ERROR_RATE_ALPHA: f64 = 0.1;

/// Response-time samples retained.
const RESPONSE_WINDOW: usize = 100;

/// Fetch failures in a row before the navigator reports unhealthy.
const FAILURE_THRESHOLD: u32 = 5;

/// Point-in-time navigator health.
#[derive(Debug, Clone)]
pub struct NavigatorHealthReport {
    pub status: HealthStatus,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub consecutive_failures: u32,
    pub cache_size_bytes: usize,
}

#[derive(Debug, Default)]
struct HealthState {
    response_times: VecDeque<u64>,
    error_rate: f64,
    consecutive_failures: u32,
}

/// Facade over extraction, traversal, caching, and rate limiting.
pub struct WebNavigator {
    extractor: Arc<ContentExtractor>,
    store: Arc<NavigatorStore>,
    traversal: TraversalEngine,
    health: RwLock<HealthState>,
    /// Error rate above which health degrades
    error_rate_threshold: f64,
}

impl WebNavigator {
    /// Create a navigator with the production HTTP fetcher.
    pub fn new(extraction: ContentExtractionConfig, store: StoreConfig) -> Self {
        let extractor = Arc::new(ContentExtractor::new(extraction));
        Self::assemble(extractor, store)
    }

    /// Create a navigator over a custom fetcher.
    pub fn with_fetcher(
        fetcher: Arc<dyn PageFetcher>,
        extraction: ContentExtractionConfig,
        store: StoreConfig,
    ) -> Self {
        let extractor = Arc::new(ContentExtractor::with_fetcher(fetcher, extraction));
        Self::assemble(extractor, store)
    }

    fn assemble(extractor: Arc<ContentExtractor>, store: StoreConfig) -> Self {
        let store = Arc::new(NavigatorStore::new(store));
        let traversal = TraversalEngine::new(Arc::clone(&extractor), Arc::clone(&store));
        Self {
            extractor,
            store,
            traversal,
            health: RwLock::new(HealthState::default()),
            error_rate_threshold: 0.5,
        }
    }

    /// Extract one URL, serving repeats from the content cache.
    pub async fn extract(&self, url: &str) -> Result<WebContent> {
        if let Some(normalized) = normalize_url(url) {
            if let Some(cached) = self.store.get_cached(&normalized).await {
                return Ok(cached);
            }
        }

        let started = Instant::now();
        match self.extractor.extract(url).await {
            Ok(content) => {
                self.record_success(started.elapsed().as_millis() as u64).await;
                let mut stored = content.clone();
                if let Some(normalized) = normalize_url(url) {
                    stored.url = normalized;
                }
                self.store.store_content(stored).await;
                Ok(content)
            }
            Err(err) => {
                self.record_failure().await;
                Err(err)
            }
        }
    }

    /// Crawl from a start URL under the given traversal config.
    pub async fn traverse(
        &self,
        start_url: &str,
        config: &TraversalConfig,
    ) -> Result<TraversalResult> {
        let started = Instant::now();
        let result = self.traversal.traverse(start_url, config).await;
        match &result {
            Ok(r) if r.stats.errors_encountered == 0 => {
                self.record_success(started.elapsed().as_millis() as u64).await;
            }
            Ok(_) => {
                // Partial success still counts as liveness.
                self.record_success(started.elapsed().as_millis() as u64).await;
            }
            Err(_) => self.record_failure().await,
        }
        result
    }

    /// Drop expired cache entries and reset rate-limit counters.
    pub async fn clear_caches(&self) {
        self.store.clear_caches().await;
    }

    /// Rate-limit state for a domain, if it has been seen.
    pub async fn domain_state(&self, domain: &str) -> Option<DomainRateLimit> {
        self.store.domain_state(domain).await
    }

    /// Block a domain from all future fetches.
    pub async fn block_domain(&self, domain: &str) {
        self.store.block_domain(domain).await;
    }

    async fn record_success(&self, response_time_ms: u64) {
        let mut state = self.health.write().await;
        if state.response_times.len() == RESPONSE_WINDOW {
            state.response_times.pop_front();
        }
        state.response_times.push_back(response_time_ms);
        state.error_rate *= 1.0 - ERROR_RATE_ALPHA;
        state.consecutive_failures = 0;
    }

    async fn record_failure(&self) {
        let mut state = self.health.write().await;
        state.error_rate = state.error_rate * (1.0 - ERROR_RATE_ALPHA) + ERROR_RATE_ALPHA;
        state.consecutive_failures += 1;
    }

    /// Synthesized health: unhealthy when the fetch path keeps failing,
    /// degraded when the error rate crosses the threshold.
    pub async fn health(&self) -> NavigatorHealthReport {
        let state = self.health.read().await;
        let avg_response_time_ms = if state.response_times.is_empty() {
            0.0
        } else {
            state.response_times.iter().sum::<u64>() as f64 / state.response_times.len() as f64
        };

        let status = if state.consecutive_failures >= FAILURE_THRESHOLD {
            HealthStatus::Unhealthy
        } else if state.error_rate > self.error_rate_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        NavigatorHealthReport {
            status,
            error_rate: state.error_rate,
            avg_response_time_ms,
            consecutive_failures: state.consecutive_failures,
            cache_size_bytes: self.store.cache_size_bytes().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OnePageFetcher;

    #[async_trait]
    impl PageFetcher for OnePageFetcher {
        async fn fetch(
            &self,
            url: &str,
            _config: &ContentExtractionConfig,
        ) -> Result<FetchedPage> {
            Ok(FetchedPage {
                final_url: url.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                content_length: None,
                body: "<html><body><p>A steady page of text</p></body></html>".to_string(),
                retry_after_secs: None,
            })
        }
    }

    struct AlwaysFailsFetcher;

    #[async_trait]
    impl PageFetcher for AlwaysFailsFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _config: &ContentExtractionConfig,
        ) -> Result<FetchedPage> {
            Err(crate::error::Error::domain_not_found("example.com"))
        }
    }

    fn navigator(fetcher: Arc<dyn PageFetcher>) -> WebNavigator {
        let extraction = ContentExtractionConfig {
            respect_robots_txt: false,
            ..ContentExtractionConfig::default()
        };
        WebNavigator::with_fetcher(fetcher, extraction, StoreConfig::default())
    }

    #[tokio::test]
    async fn test_extract_caches_by_url() {
        let nav = navigator(Arc::new(OnePageFetcher));

        let first = nav.extract("https://example.com/page").await.unwrap();
        let second = nav.extract("https://example.com/page").await.unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(
            nav.store.hit_count("https://example.com/page").await,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_healthy_until_failures_accumulate() {
        let nav = navigator(Arc::new(AlwaysFailsFetcher));
        assert_eq!(nav.health().await.status, HealthStatus::Healthy);

        for _ in 0..FAILURE_THRESHOLD {
            let _ = nav.extract("https://example.com/x").await;
        }

        let health = nav.health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.consecutive_failures, FAILURE_THRESHOLD);
    }

    #[tokio::test]
    async fn test_recovery_after_success() {
        let nav = navigator(Arc::new(OnePageFetcher));
        nav.record_failure().await;
        nav.record_failure().await;

        nav.extract("https://example.com/page").await.unwrap();

        let health = nav.health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.consecutive_failures, 0);
    }
}

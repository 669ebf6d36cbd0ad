//! Cycle-safe, bounded web traversal over the content extractor.
//!
//! The frontier is ordered by the configured strategy (BFS, DFS, or
//! relevance). Identity in the visited set is the normalized URL, so
//! link cycles terminate. Per-URL failures are recorded on the graph
//! node and never abort the traversal.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::extractor::ContentExtractor;
use super::store::{DomainDecision, NavigatorStore};
use super::types::{
    host_of, normalize_url, PageEdge, PageNode, PageStatus, TraversalConfig, TraversalResult,
    TraversalStats, TraversalStrategy, WebContent,
};

#[derive(Debug, Clone)]
struct FrontierItem {
    url: String,
    normalized: String,
    depth: usize,
    relevance: f64,
}

/// Walks a site graph within depth and page budgets.
pub struct TraversalEngine {
    extractor: Arc<ContentExtractor>,
    store: Arc<NavigatorStore>,
}

enum PageResult {
    Fetched(Box<WebContent>, u64),
    Skipped(String),
    Failed(String),
}

impl TraversalEngine {
    pub fn new(extractor: Arc<ContentExtractor>, store: Arc<NavigatorStore>) -> Self {
        Self { extractor, store }
    }

    /// Run a traversal from `start_url` under `config`.
    pub async fn traverse(
        &self,
        start_url: &str,
        config: &TraversalConfig,
    ) -> Result<TraversalResult> {
        let started = Instant::now();
        let session_id = Uuid::new_v4().to_string();

        let start_normalized = normalize_url(start_url)
            .ok_or_else(|| Error::InvalidInput(format!("unparseable start url: {start_url}")))?;
        let start_host = host_of(start_url)
            .ok_or_else(|| Error::InvalidInput(format!("start url has no host: {start_url}")))?;

        let max_depth = config.max_depth.max(1);
        let max_pages = config.max_pages.max(1);

        let mut frontier: VecDeque<FrontierItem> = VecDeque::new();
        frontier.push_back(FrontierItem {
            url: start_url.to_string(),
            normalized: start_normalized.clone(),
            depth: 0,
            relevance: 1.0,
        });

        let mut visited: HashSet<String> = HashSet::new();
        let mut nodes: HashMap<String, PageNode> = HashMap::new();
        let mut edges: Vec<PageEdge> = Vec::new();
        let mut pages: Vec<WebContent> = Vec::new();
        let mut stats = TraversalStats::default();
        let mut depth_distribution: HashMap<usize, usize> = HashMap::new();
        let mut load_times: Vec<u64> = Vec::new();
        let mut max_depth_hit = false;
        let mut page_limit_hit = false;
        let mut last_request: HashMap<String, Instant> = HashMap::new();

        info!(session_id = %session_id, start = %start_url, "traversal started");

        while !frontier.is_empty() {
            if visited.len() >= max_pages {
                page_limit_hit = true;
                break;
            }

            let wave = self.take_wave(&mut frontier, config, &visited);
            if wave.is_empty() {
                continue;
            }

            // Per-domain politeness delay before the wave fires.
            for item in &wave {
                if let Some(domain) = host_of(&item.url) {
                    if let Some(at) = last_request.get(&domain) {
                        let elapsed = at.elapsed();
                        let delay = Duration::from_millis(config.delay_ms);
                        if elapsed < delay {
                            tokio::time::sleep(delay - elapsed).await;
                        }
                    }
                    last_request.insert(domain, Instant::now());
                }
            }

            let results = join_all(wave.iter().map(|item| self.visit(item, config))).await;

            for (item, (result, rate_limited)) in wave.into_iter().zip(results) {
                stats.rate_limit_encounters += rate_limited;
                visited.insert(item.normalized.clone());
                match result {
                    PageResult::Fetched(content, load_ms) => {
                        stats.pages_visited += 1;
                        stats.total_content_bytes += content.content.len();
                        stats.max_depth_reached = stats.max_depth_reached.max(item.depth);
                        *depth_distribution.entry(item.depth).or_insert(0) += 1;
                        load_times.push(load_ms);

                        nodes.insert(
                            item.normalized.clone(),
                            PageNode {
                                url: item.normalized.clone(),
                                depth: item.depth,
                                status: PageStatus::Visited,
                                error: None,
                            },
                        );

                        if item.depth < max_depth {
                            self.enqueue_links(
                                &content,
                                &item,
                                config,
                                &start_host,
                                &visited,
                                &mut frontier,
                                &mut edges,
                                &mut nodes,
                            );
                        } else if !content.links.is_empty() {
                            max_depth_hit = true;
                        }

                        pages.push(*content);
                    }
                    PageResult::Skipped(reason) => {
                        stats.pages_skipped += 1;
                        nodes.insert(
                            item.normalized.clone(),
                            PageNode {
                                url: item.normalized.clone(),
                                depth: item.depth,
                                status: PageStatus::Skipped,
                                error: Some(reason),
                            },
                        );
                    }
                    PageResult::Failed(message) => {
                        stats.errors_encountered += 1;
                        nodes.insert(
                            item.normalized.clone(),
                            PageNode {
                                url: item.normalized.clone(),
                                depth: item.depth,
                                status: PageStatus::Error,
                                error: Some(message),
                            },
                        );
                    }
                }
            }
        }

        if !frontier.is_empty() && visited.len() >= max_pages {
            page_limit_hit = true;
        }

        stats.processing_time_ms = (started.elapsed().as_millis() as u64).max(1);
        stats.avg_page_load_time_ms = if load_times.is_empty() {
            0.0
        } else {
            load_times.iter().sum::<u64>() as f64 / load_times.len() as f64
        };

        info!(
            session_id = %session_id,
            visited = stats.pages_visited,
            errors = stats.errors_encountered,
            "traversal finished"
        );

        Ok(TraversalResult {
            session_id,
            start_url: start_url.to_string(),
            pages,
            stats,
            nodes: nodes.into_values().collect(),
            edges,
            completed_at: Utc::now(),
            depth_distribution,
            max_depth_hit,
            page_limit_hit,
        })
    }

    /// Pop the next batch from the frontier: one item per domain, at
    /// most `max_concurrent_requests`, ordered by the strategy. DFS is
    /// inherently sequential, so its wave size is one.
    fn take_wave(
        &self,
        frontier: &mut VecDeque<FrontierItem>,
        config: &TraversalConfig,
        visited: &HashSet<String>,
    ) -> Vec<FrontierItem> {
        let limit = match config.strategy {
            TraversalStrategy::Dfs => 1,
            _ => config.max_concurrent_requests.max(1),
        };

        let mut wave: Vec<FrontierItem> = Vec::new();
        let mut wave_domains: HashSet<String> = HashSet::new();
        let mut deferred: Vec<FrontierItem> = Vec::new();

        while wave.len() < limit && !frontier.is_empty() {
            let item = match config.strategy {
                TraversalStrategy::Bfs => frontier.pop_front(),
                TraversalStrategy::Dfs => frontier.pop_back(),
                TraversalStrategy::RelevanceBased => {
                    let best = frontier
                        .iter()
                        .enumerate()
                        .max_by(|(_, a), (_, b)| {
                            a.relevance
                                .partial_cmp(&b.relevance)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .map(|(i, _)| i);
                    best.and_then(|i| frontier.remove(i))
                }
            };
            let Some(item) = item else { break };

            if visited.contains(&item.normalized)
                || wave.iter().any(|w| w.normalized == item.normalized)
            {
                continue;
            }

            // BFS depth ordering: never mix depths in one wave.
            if let Some(first) = wave.first() {
                if config.strategy == TraversalStrategy::Bfs && item.depth != first.depth {
                    deferred.push(item);
                    break;
                }
            }

            let domain = host_of(&item.url).unwrap_or_default();
            if !wave_domains.insert(domain) {
                deferred.push(item);
                continue;
            }
            wave.push(item);
        }

        // Deferred items go back to the head in their original order.
        for item in deferred.into_iter().rev() {
            frontier.push_front(item);
        }
        wave
    }

    /// Visit one URL: policy checks, domain rate limit, cache, extract.
    ///
    /// Returns the outcome plus how many rate-limit encounters occurred.
    async fn visit(
        &self,
        item: &FrontierItem,
        config: &TraversalConfig,
    ) -> (PageResult, usize) {
        if let Some(reason) = self.skip_reason(&item.url, config) {
            return (PageResult::Skipped(reason), 0);
        }

        let domain = match host_of(&item.url) {
            Some(domain) => domain,
            None => return (PageResult::Failed("url has no host".to_string()), 0),
        };

        let mut rate_limited = 0;
        match self.store.acquire_domain(&domain).await {
            DomainDecision::Allow => {}
            DomainDecision::Blocked => {
                return (
                    PageResult::Skipped(format!("domain {domain} is blocked")),
                    0,
                );
            }
            DomainDecision::Wait(ms) => {
                rate_limited += 1;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }

        if let Some(cached) = self.store.get_cached(&item.normalized).await {
            debug!(url = %item.url, "content cache hit");
            return (PageResult::Fetched(Box::new(cached), 0), rate_limited);
        }

        let load_started = Instant::now();
        let result = match self.extractor.extract(&item.url).await {
            Ok(mut content) => {
                let load_ms = load_started.elapsed().as_millis() as u64;
                content.url = item.normalized.clone();
                self.store.store_content(content.clone()).await;
                PageResult::Fetched(Box::new(content), load_ms)
            }
            Err(Error::RobotsDisallow { .. }) => {
                PageResult::Skipped("disallowed by robots.txt".to_string())
            }
            Err(Error::RateLimitExceeded(message)) => {
                rate_limited += 1;
                self.store.record_retry_after(&domain, 60).await;
                PageResult::Failed(message)
            }
            Err(err) => PageResult::Failed(err.to_string()),
        };
        (result, rate_limited)
    }

    /// Policy reason to skip a URL, if any.
    fn skip_reason(&self, url: &str, config: &TraversalConfig) -> Option<String> {
        let domain = host_of(url)?;

        if config
            .blocked_domains
            .iter()
            .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
        {
            return Some(format!("domain {domain} is on the blocklist"));
        }
        if !config.allowed_domains.is_empty()
            && !config
                .allowed_domains
                .iter()
                .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
        {
            return Some(format!("domain {domain} is not on the allowlist"));
        }
        if config.exclude_patterns.iter().any(|p| url.contains(p.as_str())) {
            return Some("url matches an exclude pattern".to_string());
        }
        if !config.include_patterns.is_empty()
            && !config.include_patterns.iter().any(|p| url.contains(p.as_str()))
        {
            return Some("url matches no include pattern".to_string());
        }
        None
    }

    /// Push a visited page's links onto the frontier.
    #[allow(clippy::too_many_arguments)]
    fn enqueue_links(
        &self,
        content: &WebContent,
        item: &FrontierItem,
        config: &TraversalConfig,
        start_host: &str,
        visited: &HashSet<String>,
        frontier: &mut VecDeque<FrontierItem>,
        edges: &mut Vec<PageEdge>,
        nodes: &mut HashMap<String, PageNode>,
    ) {
        for link in &content.links {
            let Some(normalized) = normalize_url(&link.url) else {
                continue;
            };
            let Some(link_host) = host_of(&link.url) else {
                continue;
            };

            let external = link_host != start_host;
            if external && (config.same_domain_only || !config.follow_external_links) {
                continue;
            }

            edges.push(PageEdge {
                from: item.normalized.clone(),
                to: normalized.clone(),
                link_text: link.text.clone(),
            });

            if visited.contains(&normalized)
                || frontier.iter().any(|f| f.normalized == normalized)
            {
                continue;
            }

            nodes.entry(normalized.clone()).or_insert_with(|| PageNode {
                url: normalized.clone(),
                depth: item.depth + 1,
                status: PageStatus::Pending,
                error: None,
            });

            frontier.push_back(FrontierItem {
                url: link.url.clone(),
                normalized,
                depth: item.depth + 1,
                relevance: link.relevance,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::extractor::{FetchedPage, PageFetcher};
    use crate::navigator::types::ContentExtractionConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a small in-memory site.
    struct SiteFetcher {
        pages: HashMap<String, String>,
        fetches: AtomicUsize,
    }

    impl SiteFetcher {
        fn new(pages: Vec<(&str, &str)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for SiteFetcher {
        async fn fetch(
            &self,
            url: &str,
            _config: &ContentExtractionConfig,
        ) -> crate::error::Result<FetchedPage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    final_url: url.to_string(),
                    status: 200,
                    content_type: Some("text/html".to_string()),
                    content_length: Some(body.len()),
                    body: body.clone(),
                    retry_after_secs: None,
                }),
                None => Ok(FetchedPage {
                    final_url: url.to_string(),
                    status: 404,
                    content_type: None,
                    content_length: None,
                    body: String::new(),
                    retry_after_secs: None,
                }),
            }
        }
    }

    fn engine_for(pages: Vec<(&str, &str)>) -> TraversalEngine {
        let config = ContentExtractionConfig {
            respect_robots_txt: false,
            ..ContentExtractionConfig::default()
        };
        let extractor = Arc::new(ContentExtractor::with_fetcher(
            Arc::new(SiteFetcher::new(pages)),
            config,
        ));
        TraversalEngine::new(extractor, Arc::new(NavigatorStore::default()))
    }

    fn fast_config() -> TraversalConfig {
        TraversalConfig {
            delay_ms: 0,
            ..TraversalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cycle_terminates_with_unique_visits() {
        // page1 -> page2 -> page1: the classic two-node cycle.
        let engine = engine_for(vec![
            (
                "https://example.com/page1",
                r#"<html><body><p>First page body text</p><a href="/page2">next</a></body></html>"#,
            ),
            (
                "https://example.com/page2",
                r#"<html><body><p>Second page body text</p><a href="/page1">back</a></body></html>"#,
            ),
        ]);

        let config = TraversalConfig {
            max_depth: 3,
            max_pages: 10,
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/page1", &config).await.unwrap();

        assert_eq!(result.stats.pages_visited, 2);
        assert_eq!(result.stats.errors_encountered, 0);
        assert_eq!(result.stats.max_depth_reached, 1);

        // Cycle safety: every node is unique.
        let mut urls: Vec<&str> = result.nodes.iter().map(|n| n.url.as_str()).collect();
        urls.sort();
        let before = urls.len();
        urls.dedup();
        assert_eq!(urls.len(), before);

        // The back-edge is recorded even though the target was visited.
        assert!(result
            .edges
            .iter()
            .any(|e| e.from.ends_with("/page2") && e.to.ends_with("/page1")));
    }

    #[tokio::test]
    async fn test_max_depth_bounds_traversal() {
        let engine = engine_for(vec![
            (
                "https://example.com/a",
                r#"<html><body><a href="/b">b</a></body></html>"#,
            ),
            (
                "https://example.com/b",
                r#"<html><body><a href="/c">c</a></body></html>"#,
            ),
            (
                "https://example.com/c",
                r#"<html><body><p>leaf</p></body></html>"#,
            ),
        ]);

        let config = TraversalConfig {
            max_depth: 1,
            max_pages: 10,
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/a", &config).await.unwrap();

        // Depth 1 visits the start and its direct links only.
        assert_eq!(result.stats.pages_visited, 2);
        assert_eq!(result.stats.max_depth_reached, 1);
        assert!(result.max_depth_hit);
        assert!(result.stats.max_depth_reached <= config.max_depth);
    }

    #[tokio::test]
    async fn test_max_pages_bounds_traversal() {
        let engine = engine_for(vec![
            (
                "https://example.com/hub",
                r#"<html><body>
                    <a href="/p1">1</a><a href="/p2">2</a>
                    <a href="/p3">3</a><a href="/p4">4</a>
                </body></html>"#,
            ),
            ("https://example.com/p1", "<html><body>one</body></html>"),
            ("https://example.com/p2", "<html><body>two</body></html>"),
            ("https://example.com/p3", "<html><body>three</body></html>"),
            ("https://example.com/p4", "<html><body>four</body></html>"),
        ]);

        let config = TraversalConfig {
            max_depth: 2,
            max_pages: 3,
            max_concurrent_requests: 1,
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/hub", &config).await.unwrap();

        assert!(result.stats.pages_visited <= 3);
        assert!(result.page_limit_hit);
    }

    #[tokio::test]
    async fn test_external_links_not_followed_by_default() {
        let engine = engine_for(vec![(
            "https://example.com/start",
            r#"<html><body><a href="https://elsewhere.net/page">off-site</a></body></html>"#,
        )]);

        let result = engine
            .traverse("https://example.com/start", &fast_config())
            .await
            .unwrap();

        assert_eq!(result.stats.pages_visited, 1);
        assert!(result.edges.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_recorded_and_traversal_continues() {
        let engine = engine_for(vec![
            (
                "https://example.com/start",
                r#"<html><body><a href="/gone">missing</a><a href="/ok">fine</a></body></html>"#,
            ),
            ("https://example.com/ok", "<html><body>still here</body></html>"),
        ]);

        let config = TraversalConfig {
            max_depth: 2,
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/start", &config).await.unwrap();

        assert_eq!(result.stats.pages_visited, 2);
        assert_eq!(result.stats.errors_encountered, 1);

        let error_node = result
            .nodes
            .iter()
            .find(|n| n.status == PageStatus::Error)
            .unwrap();
        assert!(error_node.url.ends_with("/gone"));
        assert!(error_node.error.as_deref().unwrap_or("").contains("404"));
    }

    #[tokio::test]
    async fn test_blocked_domain_skipped() {
        let engine = engine_for(vec![(
            "https://example.com/start",
            "<html><body>hello</body></html>",
        )]);

        let config = TraversalConfig {
            blocked_domains: vec!["example.com".to_string()],
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/start", &config).await.unwrap();

        assert_eq!(result.stats.pages_visited, 0);
        assert_eq!(result.stats.pages_skipped, 1);
    }

    #[tokio::test]
    async fn test_depth_distribution_recorded() {
        let engine = engine_for(vec![
            (
                "https://example.com/root",
                r#"<html><body><a href="/l1">one</a><a href="/l2">two</a></body></html>"#,
            ),
            ("https://example.com/l1", "<html><body>leaf one</body></html>"),
            ("https://example.com/l2", "<html><body>leaf two</body></html>"),
        ]);

        let config = TraversalConfig {
            max_depth: 1,
            ..fast_config()
        };
        let result = engine.traverse("https://example.com/root", &config).await.unwrap();

        assert_eq!(result.depth_distribution.get(&0), Some(&1));
        assert_eq!(result.depth_distribution.get(&1), Some(&2));
    }
}

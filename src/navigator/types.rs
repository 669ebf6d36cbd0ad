//! Data model for extracted content, traversals, and domain rate limits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A hyperlink found on an extracted page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub url: String,
    pub text: String,
    /// Same host as the page the link was found on
    pub internal: bool,
    /// Crawl-ordering hint in [0, 1]
    pub relevance: f64,
}

/// An image found on an extracted page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Metadata pulled from a page's head and meta tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content_length: usize,
    pub last_modified: Option<String>,
    /// `og:*` properties
    #[serde(default)]
    pub open_graph: HashMap<String, String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub domain: Option<String>,
    pub is_secure: bool,
}

/// Coarse quality band for extracted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentQuality {
    High,
    Medium,
    Low,
    Unknown,
}

/// The factor scores behind a quality band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFactors {
    pub length: f64,
    pub readability: f64,
    pub uniqueness: f64,
    pub freshness: f64,
    pub overall: f64,
}

/// Sanitized content extracted from one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebContent {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    /// Sanitized text content
    pub content: String,
    /// Sanitized HTML, kept only when requested
    pub html: Option<String>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub links: Vec<LinkInfo>,
    pub images: Vec<ImageInfo>,
    pub metadata: ContentMetadata,
    /// Stable digest of the normalized text, for deduplication
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
    pub quality: ContentQuality,
    pub quality_factors: QualityFactors,
}

/// Extraction behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentExtractionConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_redirects: u32,
    pub verify_ssl: bool,
    pub include_images: bool,
    pub include_links: bool,
    pub include_metadata: bool,
    pub include_html: bool,
    pub strip_navigation: bool,
    pub strip_ads: bool,
    /// Bytes; enforced before and after the body read
    pub max_content_length: usize,
    pub sanitize_html: bool,
    pub detect_malicious: bool,
    pub respect_robots_txt: bool,
}

impl Default for ContentExtractionConfig {
    fn default() -> Self {
        Self {
            user_agent: "arbiter-navigator/0.1".to_string(),
            timeout_ms: 10_000,
            max_redirects: 5,
            verify_ssl: true,
            include_images: true,
            include_links: true,
            include_metadata: true,
            include_html: false,
            strip_navigation: true,
            strip_ads: true,
            max_content_length: 5 * 1024 * 1024,
            sanitize_html: true,
            detect_malicious: true,
            respect_robots_txt: true,
        }
    }
}

/// Frontier ordering for a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    #[default]
    Bfs,
    Dfs,
    RelevanceBased,
}

/// Traversal behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// At least 1
    pub max_depth: usize,
    /// At least 1
    pub max_pages: usize,
    pub strategy: TraversalStrategy,
    pub same_domain_only: bool,
    pub respect_robots_txt: bool,
    /// Minimum gap between requests to one domain
    pub delay_ms: u64,
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    /// Substring patterns a URL must match (any), when non-empty
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Substring patterns that exclude a URL (any)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    pub follow_external_links: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 50,
            strategy: TraversalStrategy::Bfs,
            same_domain_only: true,
            respect_robots_txt: true,
            delay_ms: 100,
            max_concurrent_requests: 4,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_external_links: false,
        }
    }
}

/// Visit state of one URL in the traversal graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Visited,
    Pending,
    Skipped,
    Error,
}

/// Node in the traversal graph, keyed by normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageNode {
    pub url: String,
    pub depth: usize,
    pub status: PageStatus,
    pub error: Option<String>,
}

/// Directed edge recording which link led where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEdge {
    pub from: String,
    pub to: String,
    pub link_text: String,
}

/// Counters accumulated during a traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalStats {
    pub pages_visited: usize,
    pub pages_skipped: usize,
    pub errors_encountered: usize,
    pub max_depth_reached: usize,
    pub processing_time_ms: u64,
    pub total_content_bytes: usize,
    pub avg_page_load_time_ms: f64,
    pub rate_limit_encounters: usize,
}

/// Everything a finished (or cancelled) traversal produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalResult {
    pub session_id: String,
    pub start_url: String,
    pub pages: Vec<WebContent>,
    pub stats: TraversalStats,
    pub nodes: Vec<PageNode>,
    pub edges: Vec<PageEdge>,
    pub completed_at: DateTime<Utc>,
    /// Pages visited per depth
    pub depth_distribution: HashMap<usize, usize>,
    pub max_depth_hit: bool,
    pub page_limit_hit: bool,
}

/// Rate-limit state of one crawled domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Ok,
    Throttled,
    Blocked,
}

/// Per-domain request bucket with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRateLimit {
    pub domain: String,
    pub status: DomainStatus,
    pub requests_in_window: u32,
    pub window_reset_at: DateTime<Utc>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Normalize a URL for visited-set identity: lowercase the host, drop
/// the fragment, strip a trailing slash from the path.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    let host = url.host_str()?.to_lowercase();
    url.set_host(Some(&host)).ok()?;

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Host component of a URL, lowercased.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_url_cases() {
        assert_eq!(
            normalize_url("https://Example.COM/Page/#section"),
            Some("https://example.com/Page".to_string())
        );
        assert_eq!(
            normalize_url("https://example.com/page/"),
            Some("https://example.com/page".to_string())
        );
        // Root slash is preserved.
        assert_eq!(
            normalize_url("https://example.com/"),
            Some("https://example.com/".to_string())
        );
        assert_eq!(normalize_url("not a url"), None);
    }

    #[test]
    fn test_normalize_url_is_idempotent() {
        let once = normalize_url("https://Example.com/a/b/#frag").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://Sub.Example.com/path"),
            Some("sub.example.com".to_string())
        );
        assert_eq!(host_of("garbage"), None);
    }

    #[test]
    fn test_traversal_result_serde_round_trip() {
        let result = TraversalResult {
            session_id: "s1".to_string(),
            start_url: "https://example.com/".to_string(),
            pages: Vec::new(),
            stats: TraversalStats::default(),
            nodes: vec![PageNode {
                url: "https://example.com/".to_string(),
                depth: 0,
                status: PageStatus::Visited,
                error: None,
            }],
            edges: Vec::new(),
            completed_at: Utc::now(),
            depth_distribution: HashMap::from([(0, 1)]),
            max_depth_hit: false,
            page_limit_hit: false,
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: TraversalResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes.len(), 1);
        assert_eq!(back.depth_distribution.get(&0), Some(&1));
    }
}

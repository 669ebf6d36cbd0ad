//! Per-origin robots.txt cache.
//!
//! `/robots.txt` is fetched at most once per TTL per origin. Only the
//! `User-agent: *` group's `Disallow` rules are applied; fetch failures
//! are treated as "no rules" so an unreachable robots file never blocks
//! a crawl.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::extractor::PageFetcher;
use super::types::ContentExtractionConfig;

/// How long parsed rules stay fresh.
const ROBOTS_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone)]
struct RobotsEntry {
    disallow: Vec<String>,
    fetched_at: DateTime<Utc>,
}

/// Parse the `User-agent: *` group's Disallow prefixes.
pub fn parse_rules(body: &str) -> Vec<String> {
    let mut disallow = Vec::new();
    let mut in_wildcard_group = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                in_wildcard_group = value == "*";
            }
            "disallow" if in_wildcard_group => {
                if !value.is_empty() {
                    disallow.push(value.to_string());
                }
            }
            _ => {}
        }
    }

    disallow
}

/// Whether a path clears the given Disallow prefixes.
pub fn path_allowed(path: &str, disallow: &[String]) -> bool {
    !disallow.iter().any(|rule| path.starts_with(rule.as_str()))
}

/// Origin-keyed cache of parsed robots rules.
pub struct RobotsCache {
    entries: Arc<RwLock<HashMap<String, RobotsEntry>>>,
    ttl: Duration,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::hours(ROBOTS_TTL_HOURS),
        }
    }

    /// Whether the crawler may fetch this URL.
    pub async fn is_allowed(
        &self,
        url: &Url,
        fetcher: &dyn PageFetcher,
        config: &ContentExtractionConfig,
    ) -> bool {
        let origin = url.origin().ascii_serialization();
        let path = url.path().to_string();

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&origin) {
                if Utc::now() - entry.fetched_at < self.ttl {
                    return path_allowed(&path, &entry.disallow);
                }
            }
        }

        let robots_url = format!("{}/robots.txt", origin);
        let disallow = match fetcher.fetch(&robots_url, config).await {
            Ok(page) if page.status == 200 => parse_rules(&page.body),
            // Missing or failing robots.txt imposes no rules.
            _ => Vec::new(),
        };

        let allowed = path_allowed(&path, &disallow);
        let mut entries = self.entries.write().await;
        entries.insert(
            origin,
            RobotsEntry {
                disallow,
                fetched_at: Utc::now(),
            },
        );
        allowed
    }

    /// Drop every cached ruleset.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of origins with cached rules.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

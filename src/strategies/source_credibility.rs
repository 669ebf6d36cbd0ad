//! Source credibility strategy.
//!
//! Extracts the sources cited in a claim and scores each against weighted
//! credibility factors. Per-source analyses are cached for 24 hours, so
//! repeated verification of the same URL is deterministic and cheap.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio::sync::RwLock;
use url::Url;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::VerificationStrategy;

/// Most sources analyzed per request.
const MAX_SOURCES: usize = 10;

/// Per-source analysis cache lifetime.
const ANALYSIS_TTL_HOURS: i64 = 24;

/// Short English words that produce "and.com"-style false positives when
/// scanning for bare domains.
const DOMAIN_WORD_BLACKLIST: &[&str] = &[
    "and", "the", "was", "are", "for", "not", "but", "you", "all", "can", "had", "has", "her",
    "his", "its", "one", "our", "out", "she", "too", "use", "will", "with", "this", "that",
    "from", "they", "been", "have", "more", "when", "who", "did", "get", "may", "him", "old",
    "see", "now", "way", "than", "then",
];

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("invalid regex")
});

static BARE_DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-zA-Z0-9][a-zA-Z0-9-]*)\.(com|org|net|gov|edu|io|co)\b")
        .expect("invalid regex")
});

/// Weighted factor scores for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredibilityAnalysis {
    pub source: String,
    pub domain_reputation: f64,
    pub content_type: f64,
    pub source_age: f64,
    pub authority: f64,
    pub bias_reliability: f64,
    pub technical: f64,
    /// Weighted average of the factors above
    pub credibility_score: f64,
}

#[derive(Debug, Clone)]
struct CachedAnalysis {
    analysis: CredibilityAnalysis,
    cached_at: DateTime<Utc>,
}

/// Scores claim sources against weighted credibility factors.
pub struct SourceCredibilityStrategy {
    analysis_cache: Arc<RwLock<HashMap<String, CachedAnalysis>>>,
    health: StrategyHealth,
}

impl SourceCredibilityStrategy {
    pub fn new() -> Self {
        Self {
            analysis_cache: Arc::new(RwLock::new(HashMap::new())),
            health: StrategyHealth::new(),
        }
    }

    /// Pull URLs and bare domains out of the claim text, capped at
    /// [`MAX_SOURCES`]. Bare domains whose label is an ordinary English
    /// word are skipped.
    pub fn extract_sources(&self, text: &str) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();

        for m in URL_PATTERN.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
            if !sources.contains(&url) {
                sources.push(url);
            }
        }

        for cap in BARE_DOMAIN_PATTERN.captures_iter(text) {
            let label = cap[1].to_lowercase();
            if DOMAIN_WORD_BLACKLIST.contains(&label.as_str()) {
                continue;
            }
            let domain = format!("https://{}.{}", label, &cap[2]);
            let already = sources.iter().any(|s| s.contains(&format!("{}.{}", label, &cap[2])));
            if !already {
                sources.push(domain);
            }
        }

        sources.truncate(MAX_SOURCES);
        sources
    }

    /// Analyze one source, consulting the 24-hour cache first.
    pub async fn analyze_source(&self, source: &str) -> CredibilityAnalysis {
        let now = Utc::now();
        {
            let cache = self.analysis_cache.read().await;
            if let Some(cached) = cache.get(source) {
                if now - cached.cached_at < Duration::hours(ANALYSIS_TTL_HOURS) {
                    return cached.analysis.clone();
                }
            }
        }

        let analysis = score_source(source);
        let mut cache = self.analysis_cache.write().await;
        cache.insert(
            source.to_string(),
            CachedAnalysis {
                analysis: analysis.clone(),
                cached_at: now,
            },
        );
        analysis
    }

    /// Drop expired cached analyses.
    pub async fn cleanup_cache(&self) {
        let now = Utc::now();
        let mut cache = self.analysis_cache.write().await;
        cache.retain(|_, c| now - c.cached_at < Duration::hours(ANALYSIS_TTL_HOURS));
    }
}

impl Default for SourceCredibilityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn host_of(source: &str) -> Option<String> {
    Url::parse(source)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

const INSTITUTIONAL_SUFFIXES: &[&str] = &[".gov", ".edu", ".int", ".mil"];
const SUSPICIOUS_HOSTS: &[&str] = &["bit.ly", "tinyurl.com", "t.co", "goo.gl"];
const SUSPICIOUS_SUFFIXES: &[&str] = &[".xyz", ".click", ".top", ".loan"];
const NEWS_HOSTS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "npr.org",
    "nytimes.com",
    "theguardian.com",
];
const SOCIAL_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "reddit.com",
    "instagram.com",
    "tiktok.com",
];
const BLOG_HOSTS: &[&str] = &["medium.com", "substack.com", "blogspot.com", "wordpress.com"];
const AUTHORITY_HOSTS: &[&str] = &[
    "wikipedia.org",
    "nature.com",
    "science.org",
    "who.int",
    "nih.gov",
    "nasa.gov",
];

fn suffix_match(host: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| host.ends_with(s))
}

fn host_match(host: &str, hosts: &[&str]) -> bool {
    hosts
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

/// Compute the weighted factor scores for a source URL.
///
/// Pure function of the URL string, so two analyses of the same source
/// always agree.
pub fn score_source(source: &str) -> CredibilityAnalysis {
    let host = host_of(source);
    let valid = host.is_some();
    let host = host.unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let domain_reputation = if suffix_match(&host, INSTITUTIONAL_SUFFIXES)
        || host_match(&host, AUTHORITY_HOSTS)
    {
        0.9
    } else if host_match(&host, SUSPICIOUS_HOSTS) || suffix_match(&host, SUSPICIOUS_SUFFIXES) {
        0.2
    } else if suffix_match(&host, &[".com", ".co", ".io", ".net"]) {
        0.7
    } else if host.is_empty() {
        0.2
    } else {
        0.5
    };

    let content_type = if host.ends_with(".gov") {
        0.95
    } else if host.ends_with(".edu") {
        0.9
    } else if host_match(&host, NEWS_HOSTS) || host.contains("news") {
        0.8
    } else if host_match(&host, SOCIAL_HOSTS) {
        0.3
    } else if host_match(&host, BLOG_HOSTS) {
        0.4
    } else {
        0.6
    };

    // Established domains tend to be short and flat; deep or digit-laden
    // hosts read as younger.
    let labels = host.split('.').count();
    let source_age = if host_match(&host, AUTHORITY_HOSTS) || host_match(&host, NEWS_HOSTS) {
        0.9
    } else if labels <= 2 && !host.chars().any(|c| c.is_ascii_digit()) {
        0.7
    } else {
        0.5
    };

    let authority = if host_match(&host, AUTHORITY_HOSTS) || suffix_match(&host, INSTITUTIONAL_SUFFIXES)
    {
        0.9
    } else if labels <= 2 {
        0.7
    } else {
        0.5
    };

    let bias_reliability = if host_match(&host, NEWS_HOSTS) || host_match(&host, AUTHORITY_HOSTS) {
        0.9
    } else if host_match(&host, SOCIAL_HOSTS) {
        0.3
    } else if host_match(&host, BLOG_HOSTS) {
        0.4
    } else {
        0.6
    };

    let technical = if !valid {
        0.2
    } else if source.starts_with("https://") {
        0.8
    } else {
        0.4
    };

    let credibility_score = domain_reputation * 0.25
        + content_type * 0.2
        + source_age * 0.15
        + authority * 0.15
        + bias_reliability * 0.15
        + technical * 0.1;

    CredibilityAnalysis {
        source: source.to_string(),
        domain_reputation,
        content_type,
        source_age,
        authority,
        bias_reliability,
        technical,
        credibility_score,
    }
}

fn verdict_for_score(score: f64) -> Verdict {
    if score >= 0.8 {
        Verdict::VerifiedTrue
    } else if score >= 0.6 {
        Verdict::PartiallyTrue
    } else if score < 0.3 {
        Verdict::VerifiedFalse
    } else {
        Verdict::Unverified
    }
}

#[async_trait]
impl VerificationStrategy for SourceCredibilityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SourceCredibility
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();

        let mut text = request.content.clone();
        if let Some(source) = &request.source {
            text.push(' ');
            text.push_str(source);
        }

        let sources = self.extract_sources(&text);
        if sources.is_empty() {
            let elapsed = start.elapsed().as_millis() as u64;
            self.health.record_success(elapsed).await;
            return Ok(StrategyOutcome::unverified(
                self.kind(),
                "No sources to evaluate",
                elapsed,
            ));
        }

        let mut total = 0.0;
        for source in &sources {
            let analysis = self.analyze_source(source).await;
            total += analysis.credibility_score;
        }
        let average = total / sources.len() as f64;
        let verdict = verdict_for_score(average);

        let elapsed = start.elapsed().as_millis() as u64;
        self.health.record_success(elapsed).await;

        tracing::debug!(
            sources = sources.len(),
            score = average,
            "source credibility evaluated"
        );

        Ok(StrategyOutcome::new(
            self.kind(),
            verdict,
            average,
            format!(
                "{} source(s) evaluated, average credibility {:.2}",
                sources.len(),
                average
            ),
            elapsed,
        )
        .with_evidence_count(sources.len()))
    }

    async fn is_available(&self) -> bool {
        self.health.is_available().await
    }

    async fn health(&self) -> StrategyHealthSnapshot {
        self.health.snapshot().await
    }
}

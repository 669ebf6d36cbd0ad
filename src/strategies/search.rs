//! Search provider adapters for cross-reference verification.
//!
//! Every adapter normalizes its provider's response into
//! [`SearchReference`] values so the cross-reference strategy can treat
//! DuckDuckGo, Brave, Google Custom Search, and Bing interchangeably.
//! When no provider is configured the deterministic mock stands in.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default abortable timeout for a single provider call.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5_000;

/// A normalized search result with a support judgment for the query claim.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReference {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Source quality in [0, 1], derived from the domain
    pub quality: f64,
    /// Whether this reference supports the claim
    pub supports: bool,
    /// Confidence of the support judgment in [0, 1]
    pub confidence: f64,
}

/// A search backend usable by the cross-reference strategy.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logging and reasoning lines.
    fn name(&self) -> &str;

    /// Execute a search and normalize the results against the claim.
    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>>;
}

fn build_http_client(timeout_ms: u64) -> Client {
    match Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(_) => Client::new(),
    }
}

/// Words too common to carry signal in support matching.
const STOP_WORDS: &[&str] = &[
    "the", "and", "that", "this", "with", "from", "have", "has", "was", "were", "are", "for",
    "not", "but", "its", "his", "her", "their", "they", "them", "then", "than", "what", "when",
    "where", "which", "will", "would", "could", "should", "been", "being", "into", "over",
    "under", "about", "after", "before", "because",
];

/// Terms whose presence flips a keyword match into a refutation.
const NEGATION_MARKERS: &[&str] = &[
    "false", "myth", "debunked", "hoax", "incorrect", "untrue", "misleading", "disproven",
    "no evidence", "not true",
];

fn content_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Keyword-heuristic support detection.
///
/// Returns `(supports, confidence)` for a reference text against a claim.
/// TODO: swap in an NLP entailment backend behind this same signature once
/// one is selected.
pub fn reference_supports(claim: &str, reference_text: &str) -> (bool, f64) {
    let claim_words = content_words(claim);
    if claim_words.is_empty() {
        return (false, 0.0);
    }

    let haystack = reference_text.to_lowercase();
    let matched = claim_words
        .iter()
        .filter(|w| haystack.contains(w.as_str()))
        .count();
    let overlap = matched as f64 / claim_words.len() as f64;

    let negated = NEGATION_MARKERS.iter().any(|m| haystack.contains(m));
    if negated && overlap >= 0.2 {
        return (false, overlap.clamp(0.0, 1.0));
    }

    (overlap >= 0.3, overlap.clamp(0.0, 1.0))
}

/// Domain-derived source quality in [0, 1].
pub fn domain_quality(url: &str) -> f64 {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();

    if host.ends_with(".gov") || host.ends_with(".edu") {
        0.9
    } else if host.ends_with(".org") {
        0.7
    } else if host.is_empty() {
        0.3
    } else {
        0.5
    }
}

fn normalize(claim: &str, url: String, title: String, snippet: String) -> SearchReference {
    let combined = format!("{} {}", title, snippet);
    let (supports, confidence) = reference_supports(claim, &combined);
    let quality = domain_quality(&url);
    SearchReference {
        url,
        title,
        snippet,
        quality,
        supports,
        confidence,
    }
}

// --- DuckDuckGo Instant Answers (no API key) ---

pub struct DuckDuckGoProvider {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoResponse {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoTopic {
    #[serde(rename = "FirstURL", default)]
    first_url: String,
    #[serde(rename = "Text", default)]
    text: String,
}

impl DuckDuckGoProvider {
    const DEFAULT_BASE_URL: &'static str = "https://api.duckduckgo.com";

    pub fn new() -> Self {
        Self {
            http: build_http_client(DEFAULT_SEARCH_TIMEOUT_MS),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for DuckDuckGoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>> {
        let response = self
            .http
            .get(format!("{}/", self.base_url))
            .query(&[("q", claim), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("duckduckgo: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(Error::http_error(status, format!("{}/", self.base_url)));
        }

        let body: DuckDuckGoResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("duckduckgo response: {e}")))?;

        let mut refs = Vec::new();
        if !body.abstract_url.is_empty() {
            refs.push(normalize(
                claim,
                body.abstract_url,
                body.heading,
                body.abstract_text,
            ));
        }
        for topic in body.related_topics.into_iter().take(5) {
            if !topic.first_url.is_empty() {
                refs.push(normalize(claim, topic.first_url, String::new(), topic.text));
            }
        }
        Ok(refs)
    }
}

// --- Brave Search ---

pub struct BraveProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl BraveProvider {
    const DEFAULT_BASE_URL: &'static str = "https://api.search.brave.com/res/v1";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: build_http_client(DEFAULT_SEARCH_TIMEOUT_MS),
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Construct from `BRAVE_SEARCH_API_KEY`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var("BRAVE_SEARCH_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>> {
        let url = format!("{}/web/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", claim)])
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("brave: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(Error::http_error(status, url));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("brave response: {e}")))?;

        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(5)
            .filter(|r| !r.url.is_empty())
            .map(|r| normalize(claim, r.url, r.title, r.description))
            .collect())
    }
}

// --- Google Custom Search ---

pub struct GoogleSearchProvider {
    http: Client,
    api_key: String,
    engine_id: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleSearchProvider {
    const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com/customsearch/v1";

    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            http: build_http_client(DEFAULT_SEARCH_TIMEOUT_MS),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Construct from `GOOGLE_SEARCH_API_KEY` + `GOOGLE_SEARCH_ENGINE_ID`.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("GOOGLE_SEARCH_API_KEY").ok().filter(|k| !k.is_empty())?;
        let cx = std::env::var("GOOGLE_SEARCH_ENGINE_ID").ok().filter(|k| !k.is_empty())?;
        Some(Self::new(key, cx))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", claim),
            ])
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("google: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(Error::http_error(status, self.base_url.clone()));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("google response: {e}")))?;

        Ok(body
            .items
            .into_iter()
            .take(5)
            .filter(|i| !i.link.is_empty())
            .map(|i| normalize(claim, i.link, i.title, i.snippet))
            .collect())
    }
}

// --- Bing Web Search ---

pub struct BingProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages", default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingResult>,
}

#[derive(Debug, Deserialize)]
struct BingResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    snippet: String,
}

impl BingProvider {
    const DEFAULT_BASE_URL: &'static str = "https://api.bing.microsoft.com/v7.0";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: build_http_client(DEFAULT_SEARCH_TIMEOUT_MS),
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Construct from `BING_SEARCH_API_KEY`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var("BING_SEARCH_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BingProvider {
    fn name(&self) -> &str {
        "bing"
    }

    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", claim)])
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("bing: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(Error::http_error(status, url));
        }

        let body: BingResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("bing response: {e}")))?;

        Ok(body
            .web_pages
            .map(|w| w.value)
            .unwrap_or_default()
            .into_iter()
            .take(5)
            .filter(|r| !r.url.is_empty())
            .map(|r| normalize(claim, r.url, r.name, r.snippet))
            .collect())
    }
}

// --- Deterministic mock fallback ---

/// Offline stand-in used when no provider is configured or every
/// configured provider fails. Deterministic per claim so repeated
/// verifications agree.
pub struct MockSearchProvider;

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, claim: &str) -> Result<Vec<SearchReference>> {
        let mut hasher = Sha256::new();
        hasher.update(claim.as_bytes());
        let digest = hasher.finalize();

        // Derive stable pseudo-votes from the claim digest.
        let refs = (0..3)
            .map(|i| {
                let byte = digest[i] as f64 / 255.0;
                SearchReference {
                    url: format!("https://reference-{}.example.org/{:02x}", i, digest[i]),
                    title: format!("Reference {} for claim", i + 1),
                    snippet: claim.chars().take(80).collect(),
                    quality: 0.5 + byte * 0.4,
                    supports: digest[i] % 4 != 0,
                    confidence: 0.4 + byte * 0.4,
                }
            })
            .collect();
        Ok(refs)
    }
}

/// All providers constructable from the environment, in preference order.
pub fn providers_from_env() -> Vec<Box<dyn SearchProvider>> {
    let mut providers: Vec<Box<dyn SearchProvider>> = Vec::new();
    providers.push(Box::new(DuckDuckGoProvider::new()));
    if let Some(p) = BraveProvider::from_env() {
        providers.push(Box::new(p));
    }
    if let Some(p) = GoogleSearchProvider::from_env() {
        providers.push(Box::new(p));
    }
    if let Some(p) = BingProvider::from_env() {
        providers.push(Box::new(p));
    }
    providers
}

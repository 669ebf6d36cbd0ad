//! Content extraction: fetch, parse, sanitize, and score a single URL.
//!
//! Fetching sits behind the [`PageFetcher`] trait so traversal and tests
//! can run against canned pages; [`HttpPageFetcher`] is the production
//! implementation over reqwest.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::robots::RobotsCache;
use super::types::{
    host_of, ContentExtractionConfig, ContentMetadata, ContentQuality, ImageInfo, LinkInfo,
    QualityFactors, WebContent,
};

/// Raw response handed back by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Declared Content-Length, when the server sent one
    pub content_length: Option<usize>,
    pub body: String,
    /// Seconds from a 429 Retry-After header
    pub retry_after_secs: Option<u64>,
}

/// Abstraction over page fetching.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, config: &ContentExtractionConfig) -> Result<FetchedPage>;
}

/// Production fetcher over reqwest.
pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(config: &ContentExtractionConfig) -> Self {
        let builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ))
            .danger_accept_invalid_certs(!config.verify_ssl);
        let http = match builder.build() {
            Ok(client) => client,
            Err(_) => reqwest::Client::new(),
        };
        Self { http }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, config: &ContentExtractionConfig) -> Result<FetchedPage> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(config.timeout_ms)
            } else if e.is_connect() {
                Error::domain_not_found(host_of(url).unwrap_or_else(|| url.to_string()))
            } else {
                Error::dependency_unavailable(format!("http client: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_length = response.content_length().map(|l| l as usize);
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        // Declared size is checked before the body is pulled.
        if let Some(length) = content_length {
            if length > config.max_content_length {
                return Err(Error::content_too_large(length, config.max_content_length));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Internal(format!("body read: {e}")))?;

        Ok(FetchedPage {
            final_url,
            status,
            content_type,
            content_length,
            body,
            retry_after_secs,
        })
    }
}

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("invalid regex")
});

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("invalid regex"));

static NAV_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(nav|header|footer|aside)\b[^>]*>.*?</(nav|header|footer|aside)>")
        .expect("invalid regex")
});

static AD_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(div|section)\b[^>]*(class|id)\s*=\s*"[^"]*\b(ad|ads|advert|sponsor|banner)\b[^"]*"[^>]*>.*?</(div|section)>"#)
        .expect("invalid regex")
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\son\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("invalid regex")
});

static JAVASCRIPT_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(href|src)\s*=\s*("|')?\s*javascript:[^"'>\s]*"#).expect("invalid regex")
});

/// Schemes the extractor refuses outright.
const FORBIDDEN_SCHEMES: &[&str] = &["javascript", "data", "file", "ftp", "vbscript"];

/// Validate the target URL: http(s) only, nothing executable.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|_| Error::InvalidInput(format!("unparseable url: {raw}")))?;

    let scheme = url.scheme().to_lowercase();
    if FORBIDDEN_SCHEMES.contains(&scheme.as_str()) {
        return Err(Error::MaliciousContent(format!(
            "refusing {scheme}: scheme"
        )));
    }
    if scheme != "http" && scheme != "https" {
        return Err(Error::InvalidInput(format!(
            "unsupported scheme: {scheme}"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidInput(format!("url has no host: {raw}")));
    }
    Ok(url)
}

/// Remove script blocks, event handlers, and javascript: references.
pub fn sanitize_html(html: &str) -> String {
    let html = SCRIPT_BLOCK.replace_all(html, "");
    let html = EVENT_HANDLER.replace_all(&html, "");
    JAVASCRIPT_HREF.replace_all(&html, "").into_owned()
}

/// Strip non-content blocks before text extraction.
fn strip_chrome(html: &str, config: &ContentExtractionConfig) -> String {
    let mut html = SCRIPT_BLOCK.replace_all(html, " ").into_owned();
    html = STYLE_BLOCK.replace_all(&html, " ").into_owned();
    if config.strip_navigation {
        html = NAV_BLOCKS.replace_all(&html, " ").into_owned();
    }
    if config.strip_ads {
        html = AD_BLOCKS.replace_all(&html, " ").into_owned();
    }
    html
}

/// Collapse whitespace so hashing is layout-independent.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable digest of normalized text. Identical content always hashes
/// identically, whatever markup surrounded it.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

fn extract_title(doc: &Html) -> Option<String> {
    let sel = selector("title");
    doc.select(&sel)
        .next()
        .map(|t| normalize_text(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn extract_metadata(doc: &Html, url: &Url, text_len: usize) -> ContentMetadata {
    let mut metadata = ContentMetadata {
        title: extract_title(doc),
        content_length: text_len,
        domain: url.host_str().map(|h| h.to_lowercase()),
        is_secure: url.scheme() == "https",
        ..ContentMetadata::default()
    };

    let meta_sel = selector("meta");
    for element in doc.select(&meta_sel) {
        let value = element.value();
        let content = match value.attr("content") {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => continue,
        };

        if let Some(name) = value.attr("name") {
            match name.to_lowercase().as_str() {
                "description" => metadata.description = Some(content),
                "author" => metadata.author = Some(content),
                "last-modified" => metadata.last_modified = Some(content),
                _ => {}
            }
        } else if let Some(property) = value.attr("property") {
            let property = property.to_lowercase();
            if property == "article:published_time" {
                metadata.published_date = Some(content);
            } else if let Some(key) = property.strip_prefix("og:") {
                metadata.open_graph.insert(key.to_string(), content);
            }
        }
    }

    let html_sel = selector("html");
    if let Some(html_el) = doc.select(&html_sel).next() {
        if let Some(lang) = html_el.value().attr("lang") {
            metadata.language = Some(lang.to_string());
        }
    }

    metadata
}

/// Link relevance hint: descriptive anchor text on a same-host link
/// ranks higher than bare or offsite references.
fn link_relevance(text: &str, internal: bool) -> f64 {
    let mut score: f64 = 0.3;
    if internal {
        score += 0.3;
    }
    let words = text.split_whitespace().count();
    if words >= 2 {
        score += 0.2;
    }
    if words >= 5 {
        score += 0.1;
    }
    score.min(1.0)
}

fn extract_links(doc: &Html, base: &Url) -> Vec<LinkInfo> {
    let sel = selector("a[href]");
    let base_host = base.host_str().map(|h| h.to_lowercase());
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in doc.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let resolved_str = resolved.to_string();
        if !seen.insert(resolved_str.clone()) {
            continue;
        }

        let text = normalize_text(&element.text().collect::<String>());
        let internal = resolved.host_str().map(|h| h.to_lowercase()) == base_host;
        let relevance = link_relevance(&text, internal);
        links.push(LinkInfo {
            url: resolved_str,
            text,
            internal,
            relevance,
        });
    }
    links
}

fn extract_images(doc: &Html, base: &Url) -> Vec<ImageInfo> {
    let sel = selector("img[src]");
    let mut images = Vec::new();
    for element in doc.select(&sel) {
        let value = element.value();
        let Some(src) = value.attr("src") else {
            continue;
        };
        let Ok(resolved) = base.join(src) else {
            continue;
        };
        images.push(ImageInfo {
            url: resolved.to_string(),
            alt: value.attr("alt").map(|a| a.to_string()),
            width: value.attr("width").and_then(|w| w.parse().ok()),
            height: value.attr("height").and_then(|h| h.parse().ok()),
        });
    }
    images
}

/// Quality scoring from length, readability, uniqueness, and freshness.
pub fn score_quality(text: &str, metadata: &ContentMetadata) -> (ContentQuality, QualityFactors) {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len();

    let length = (word_count as f64 / 400.0).min(1.0);

    // Readable prose sits in a band of average sentence lengths.
    let sentences = text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count();
    let readability = if sentences == 0 {
        0.0
    } else {
        let avg = word_count as f64 / sentences as f64;
        if (8.0..=30.0).contains(&avg) {
            0.8
        } else if (4.0..=45.0).contains(&avg) {
            0.5
        } else {
            0.2
        }
    };

    let uniqueness = if word_count == 0 {
        0.0
    } else {
        let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
        unique.len() as f64 / word_count as f64
    };

    let freshness = match metadata
        .published_date
        .as_deref()
        .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
    {
        Some(published) => {
            let age_days = (Utc::now() - published.with_timezone(&Utc)).num_days();
            if age_days <= 30 {
                0.9
            } else if age_days <= 365 {
                0.6
            } else {
                0.3
            }
        }
        None => 0.5,
    };

    let overall = length * 0.35 + readability * 0.25 + uniqueness * 0.2 + freshness * 0.2;
    let factors = QualityFactors {
        length,
        readability,
        uniqueness,
        freshness,
        overall,
    };

    let quality = if word_count == 0 {
        ContentQuality::Unknown
    } else if overall >= 0.65 {
        ContentQuality::High
    } else if overall >= 0.4 {
        ContentQuality::Medium
    } else {
        ContentQuality::Low
    };

    (quality, factors)
}

/// Fetch + parse + sanitize + score a single URL.
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    robots: Arc<RobotsCache>,
    config: ContentExtractionConfig,
}

impl ContentExtractor {
    /// Create an extractor with the production HTTP fetcher.
    pub fn new(config: ContentExtractionConfig) -> Self {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(&config));
        Self::with_fetcher(fetcher, config)
    }

    /// Create an extractor over a custom fetcher.
    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, config: ContentExtractionConfig) -> Self {
        Self {
            robots: Arc::new(RobotsCache::new()),
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ContentExtractionConfig {
        &self.config
    }

    /// Extract one URL: validate, honor robots, fetch, enforce size
    /// limits, then parse. A 429 surfaces as `RateLimitExceeded` so the
    /// traversal can record the encounter and back off.
    pub async fn extract(&self, raw_url: &str) -> Result<WebContent> {
        let url = validate_url(raw_url)?;

        if self.config.respect_robots_txt {
            let allowed = self
                .robots
                .is_allowed(&url, self.fetcher.as_ref(), &self.config)
                .await;
            if !allowed {
                return Err(Error::robots_disallow(raw_url));
            }
        }

        let page = self.fetcher.fetch(url.as_str(), &self.config).await?;

        if page.status == 429 {
            return Err(Error::rate_limit(format!(
                "429 from {}, retry after {}s",
                url,
                page.retry_after_secs.unwrap_or(60)
            )));
        }
        if page.status >= 400 {
            return Err(Error::http_error(page.status, raw_url));
        }
        if page.body.len() > self.config.max_content_length {
            return Err(Error::content_too_large(
                page.body.len(),
                self.config.max_content_length,
            ));
        }

        Ok(self.parse(&url, &page))
    }

    /// Parse an already-fetched page into [`WebContent`].
    pub fn parse(&self, url: &Url, page: &FetchedPage) -> WebContent {
        let stripped = strip_chrome(&page.body, &self.config);
        let doc = Html::parse_document(&stripped);

        let body_sel = selector("body");
        let raw_text = match doc.select(&body_sel).next() {
            Some(body) => body.text().collect::<Vec<_>>().join(" "),
            None => doc.root_element().text().collect::<Vec<_>>().join(" "),
        };
        let text = normalize_text(&raw_text);

        let links = if self.config.include_links {
            extract_links(&doc, url)
        } else {
            Vec::new()
        };
        let images = if self.config.include_images {
            extract_images(&doc, url)
        } else {
            Vec::new()
        };
        let metadata = if self.config.include_metadata {
            extract_metadata(&doc, url, text.len())
        } else {
            ContentMetadata {
                content_length: text.len(),
                domain: url.host_str().map(|h| h.to_lowercase()),
                is_secure: url.scheme() == "https",
                ..ContentMetadata::default()
            }
        };

        let html = if self.config.include_html {
            let html = if self.config.sanitize_html {
                sanitize_html(&page.body)
            } else {
                page.body.clone()
            };
            Some(html)
        } else {
            None
        };

        let (quality, quality_factors) = score_quality(&text, &metadata);
        let title = metadata.title.clone();

        WebContent {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            title,
            content_hash: content_hash(&text),
            content: text,
            html,
            status_code: page.status,
            content_type: page.content_type.clone(),
            links,
            images,
            metadata,
            extracted_at: Utc::now(),
            quality,
            quality_factors,
        }
    }
}

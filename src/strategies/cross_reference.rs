//! Cross-reference strategy.
//!
//! Pulls checkable claims out of the request, fans each out to the
//! configured search providers, and derives a verdict from how many of
//! the deduplicated references support the claim.

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::search::{MockSearchProvider, SearchProvider, SearchReference, DEFAULT_SEARCH_TIMEOUT_MS};
use super::VerificationStrategy;

/// Most claims extracted from one request.
const MAX_CLAIMS: usize = 5;

/// Minimum references required before a consensus is meaningful.
const MIN_REFERENCES: usize = 2;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d").expect("invalid regex"));

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{4}|january|february|march|april|may|june|july|august|september|october|november|december)\b")
        .expect("invalid regex")
});

static STATISTICAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(percent|%|average|median|mean|rate|ratio|majority|minority|increase|decrease|doubled|halved)\b")
        .expect("invalid regex")
});

static FACTUAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(is|are|was|were|has|have|discovered|invented|founded|located|capital|largest|smallest|first|oldest)\b")
        .expect("invalid regex")
});

/// Configuration for cross-reference consensus.
#[derive(Debug, Clone)]
pub struct CrossReferenceConfig {
    /// Consensus ratio at or above which the claim is verified true
    pub min_consensus: f64,
    /// Abortable timeout applied to each provider call
    pub provider_timeout_ms: u64,
}

impl Default for CrossReferenceConfig {
    fn default() -> Self {
        Self {
            min_consensus: 0.6,
            provider_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
        }
    }
}

/// Verifies claims against independent search references.
pub struct CrossReferenceStrategy {
    providers: Vec<Box<dyn SearchProvider>>,
    config: CrossReferenceConfig,
    health: StrategyHealth,
}

impl CrossReferenceStrategy {
    /// Create with an explicit provider list.
    pub fn new(providers: Vec<Box<dyn SearchProvider>>) -> Self {
        Self {
            providers,
            config: CrossReferenceConfig::default(),
            health: StrategyHealth::new(),
        }
    }

    /// Create with all providers the environment configures.
    pub fn from_env() -> Self {
        Self::new(super::search::providers_from_env())
    }

    /// Override the consensus configuration.
    pub fn with_config(mut self, config: CrossReferenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract checkable claims: sentences carrying numbers, dates,
    /// statistical terms, or factual indicators. Falls back to the whole
    /// content when no sentence qualifies.
    pub fn extract_claims(&self, content: &str) -> Vec<String> {
        let mut claims: Vec<String> = content
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| s.len() > 10)
            .filter(|s| {
                NUMBER_PATTERN.is_match(s)
                    || DATE_PATTERN.is_match(s)
                    || STATISTICAL_PATTERN.is_match(s)
                    || FACTUAL_PATTERN.is_match(s)
            })
            .map(str::to_string)
            .collect();

        if claims.is_empty() {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                claims.push(trimmed.to_string());
            }
        }

        claims.truncate(MAX_CLAIMS);
        claims
    }

    /// Query every provider for one claim, each behind its own timeout.
    /// Provider errors and timeouts drop that provider's results; the
    /// deterministic mock fills in when nothing else answered.
    async fn gather_references(&self, claim: &str) -> Vec<SearchReference> {
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);

        let calls = self.providers.iter().map(|provider| {
            let name = provider.name().to_string();
            async move {
                match tokio::time::timeout(timeout, provider.search(claim)).await {
                    Ok(Ok(refs)) => refs,
                    Ok(Err(err)) => {
                        tracing::debug!(provider = %name, error = %err, "search provider failed");
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::debug!(provider = %name, "search provider timed out");
                        Vec::new()
                    }
                }
            }
        });

        let mut references: Vec<SearchReference> =
            join_all(calls).await.into_iter().flatten().collect();

        if references.is_empty() {
            references = MockSearchProvider
                .search(claim)
                .await
                .unwrap_or_default();
        }

        references
    }
}

#[async_trait]
impl VerificationStrategy for CrossReferenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CrossReference
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();
        let claims = self.extract_claims(&request.content);

        let mut references: Vec<SearchReference> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        for claim in &claims {
            for reference in self.gather_references(claim).await {
                if seen_urls.insert(reference.url.clone()) {
                    references.push(reference);
                }
            }
        }

        let elapsed = start.elapsed().as_millis() as u64;

        if references.len() < MIN_REFERENCES {
            self.health.record_success(elapsed).await;
            return Ok(StrategyOutcome::new(
                self.kind(),
                Verdict::InsufficientData,
                0.3,
                format!(
                    "Only {} reference(s) found, need at least {}",
                    references.len(),
                    MIN_REFERENCES
                ),
                elapsed,
            )
            .with_evidence_count(references.len()));
        }

        let supporting = references.iter().filter(|r| r.supports).count();
        let total = references.len();
        let consensus = supporting as f64 / total as f64;
        let avg_confidence =
            references.iter().map(|r| r.confidence).sum::<f64>() / total as f64;

        let (verdict, confidence) = if consensus >= self.config.min_consensus {
            (Verdict::VerifiedTrue, consensus * avg_confidence)
        } else if consensus <= 1.0 - self.config.min_consensus {
            (Verdict::VerifiedFalse, (1.0 - consensus) * avg_confidence)
        } else {
            (Verdict::Contradictory, avg_confidence * 0.5)
        };

        self.health.record_success(elapsed).await;

        tracing::debug!(
            claims = claims.len(),
            references = total,
            supporting,
            consensus,
            "cross-reference consensus computed"
        );

        Ok(StrategyOutcome::new(
            self.kind(),
            verdict,
            confidence,
            format!(
                "{} of {} references support the claim (consensus {:.2})",
                supporting, total, consensus
            ),
            elapsed,
        )
        .with_evidence_count(total))
    }

    async fn is_available(&self) -> bool {
        self.health.is_available().await
    }

    async fn health(&self) -> StrategyHealthSnapshot {
        self.health.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct StubProvider {
        refs: Vec<SearchReference>,
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, _claim: &str) -> Result<Vec<SearchReference>> {
            Ok(self.refs.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl SearchProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _claim: &str) -> Result<Vec<SearchReference>> {
            Err(Error::dependency_unavailable("stub outage"))
        }
    }

    fn reference(url: &str, supports: bool, confidence: f64) -> SearchReference {
        SearchReference {
            url: url.to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
            quality: 0.7,
            supports,
            confidence,
        }
    }

    #[test]
    fn test_extract_claims_picks_factual_sentences() {
        let strategy = CrossReferenceStrategy::new(vec![]);
        let claims = strategy.extract_claims(
            "The tower was built in 1889. It is lovely at night! Hello there.",
        );
        assert_eq!(claims.len(), 2);
        assert!(claims[0].contains("1889"));
    }

    #[test]
    fn test_extract_claims_caps_at_five() {
        let strategy = CrossReferenceStrategy::new(vec![]);
        let text = (0..8)
            .map(|i| format!("Fact number {} is recorded here", i))
            .collect::<Vec<_>>()
            .join(". ");
        assert_eq!(strategy.extract_claims(&text).len(), MAX_CLAIMS);
    }

    #[tokio::test]
    async fn test_consensus_true() {
        let provider = StubProvider {
            refs: vec![
                reference("https://a.org", true, 0.8),
                reference("https://b.org", true, 0.9),
                reference("https://c.org", false, 0.7),
            ],
        };
        let strategy = CrossReferenceStrategy::new(vec![Box::new(provider)]);
        let request = VerificationRequest::new("The Earth orbits the Sun every 365 days");

        let outcome = strategy.verify(&request).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::VerifiedTrue);
        assert_eq!(outcome.evidence_count, 3);
        // consensus 2/3 * avg 0.8
        assert!((outcome.confidence - (2.0 / 3.0) * 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_consensus_false() {
        let provider = StubProvider {
            refs: vec![
                reference("https://a.org", false, 0.8),
                reference("https://b.org", false, 0.8),
                reference("https://c.org", false, 0.8),
            ],
        };
        let strategy = CrossReferenceStrategy::new(vec![Box::new(provider)]);
        let request = VerificationRequest::new("The Moon is made of cheese and was found in 1969");

        let outcome = strategy.verify(&request).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::VerifiedFalse);
        assert!((outcome.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_split_consensus_is_contradictory() {
        let provider = StubProvider {
            refs: vec![
                reference("https://a.org", true, 0.8),
                reference("https://b.org", false, 0.8),
            ],
        };
        let strategy = CrossReferenceStrategy::new(vec![Box::new(provider)]);
        let request = VerificationRequest::new("Coffee is healthy, studies show a 50% effect");

        let outcome = strategy.verify(&request).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Contradictory);
    }

    #[tokio::test]
    async fn test_duplicate_urls_are_deduplicated() {
        let provider = StubProvider {
            refs: vec![
                reference("https://same.org", true, 0.8),
                reference("https://same.org", true, 0.8),
            ],
        };
        let strategy = CrossReferenceStrategy::new(vec![Box::new(provider)]);
        let request = VerificationRequest::new("A fact stated once is repeated twice in 2020");

        let outcome = strategy.verify(&request).await.unwrap();
        // One unique reference is below the minimum, so no consensus.
        assert_eq!(outcome.verdict, Verdict::InsufficientData);
        assert_eq!(outcome.evidence_count, 1);
    }

    #[tokio::test]
    async fn test_all_providers_failing_falls_back_to_mock() {
        let strategy = CrossReferenceStrategy::new(vec![Box::new(FailingProvider)]);
        let request = VerificationRequest::new("The Nile is the longest river at 6650 km");

        let outcome = strategy.verify(&request).await.unwrap();
        // The mock supplies three deterministic references per claim.
        assert!(outcome.evidence_count >= MIN_REFERENCES);
        assert_ne!(outcome.verdict, Verdict::Unverified);
    }
}

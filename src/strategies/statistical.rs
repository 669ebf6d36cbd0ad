//! Statistical validation strategy.
//!
//! Extracts figures from a claim and checks them for plausibility:
//! impossible percentages, negative counts, and sample sizes too small to
//! support sweeping conclusions.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::VerificationStrategy;

static PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*(?:%|percent)").expect("invalid regex")
});

static GROWTH_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(increase|growth|rise|gain|up\s+by|jumped|surged)\b").expect("invalid regex")
});

static SAMPLE_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sample|survey|study)\s+of\s+(\d+)\b").expect("invalid regex")
});

static SWEEPING_CONCLUSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(proves|all|every|definitively|conclusively)\b").expect("invalid regex")
});

static ANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("invalid regex"));

/// A single plausibility problem found in the claim's figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticalIssue {
    pub description: String,
}

/// Checks the figures a claim cites for plausibility.
pub struct StatisticalStrategy {
    health: StrategyHealth,
}

impl StatisticalStrategy {
    pub fn new() -> Self {
        Self {
            health: StrategyHealth::new(),
        }
    }

    /// Scan the claim for statistically implausible figures.
    pub fn find_issues(&self, content: &str) -> Vec<StatisticalIssue> {
        let mut issues = Vec::new();
        let growth_context = GROWTH_CONTEXT.is_match(content);

        for cap in PERCENTAGE.captures_iter(content) {
            let value: f64 = cap[1].parse().unwrap_or(0.0);
            if value < 0.0 {
                issues.push(StatisticalIssue {
                    description: format!("negative percentage {}%", value),
                });
            } else if value > 100.0 && !growth_context {
                // Shares over 100% are impossible outside growth figures.
                issues.push(StatisticalIssue {
                    description: format!("{}% exceeds 100% outside a growth context", value),
                });
            }
        }

        if let Some(cap) = SAMPLE_SIZE.captures(content) {
            let n: u64 = cap[1].parse().unwrap_or(0);
            if n < 30 && SWEEPING_CONCLUSION.is_match(content) {
                issues.push(StatisticalIssue {
                    description: format!(
                        "sample of {} is too small for a definitive conclusion",
                        n
                    ),
                });
            }
            if n == 0 {
                issues.push(StatisticalIssue {
                    description: "sample size of zero".to_string(),
                });
            }
        }

        issues
    }

    fn has_figures(&self, content: &str) -> bool {
        ANY_NUMBER.is_match(content)
    }
}

impl Default for StatisticalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationStrategy for StatisticalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StatisticalValidation
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();

        if !self.has_figures(&request.content) {
            let elapsed = start.elapsed().as_millis() as u64;
            self.health.record_success(elapsed).await;
            return Ok(StrategyOutcome::unverified(
                self.kind(),
                "no figures to validate",
                elapsed,
            ));
        }

        let issues = self.find_issues(&request.content);
        let elapsed = start.elapsed().as_millis() as u64;
        self.health.record_success(elapsed).await;

        let outcome = if issues.is_empty() {
            StrategyOutcome::new(
                self.kind(),
                Verdict::VerifiedTrue,
                0.6,
                "cited figures are statistically plausible",
                elapsed,
            )
        } else {
            let descriptions: Vec<String> =
                issues.iter().map(|i| i.description.clone()).collect();
            let confidence = (0.6 + 0.15 * issues.len() as f64).min(0.9);
            StrategyOutcome::new(
                self.kind(),
                Verdict::VerifiedFalse,
                confidence,
                format!("implausible figures: {}", descriptions.join("; ")),
                elapsed,
            )
            .with_evidence_count(issues.len())
        };

        Ok(outcome)
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

    #[tokio::test]
    async fn test_plausible_figures_pass() {
        let strategy = StatisticalStrategy::new();
        let request =
            VerificationRequest::new("About 62% of respondents preferred the new layout");
        let outcome = strategy.verify(&request).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::VerifiedTrue);
    }

    #[tokio::test]
    async fn test_impossible_percentage_fails() {
        let strategy = StatisticalStrategy::new();
        let request = VerificationRequest::new("Fully 140% of voters chose the incumbent");
        let outcome = strategy.verify(&request).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::VerifiedFalse);
        assert!(outcome.reasoning.contains("exceeds 100%"));
    }

    #[tokio::test]
    async fn test_growth_over_100_percent_allowed() {
        let strategy = StatisticalStrategy::new();
        let request =
            VerificationRequest::new("Revenue saw an increase of 140% year over year");
        let outcome = strategy.verify(&request).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::VerifiedTrue);
    }

    #[tokio::test]
    async fn test_small_sample_sweeping_conclusion() {
        let strategy = StatisticalStrategy::new();
        let request = VerificationRequest::new(
            "A study of 12 people proves the diet works for everyone",
        );
        let outcome = strategy.verify(&request).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::VerifiedFalse);
        assert!(outcome.reasoning.contains("too small"));
    }

    #[tokio::test]
    async fn test_no_figures_abstains() {
        let strategy = StatisticalStrategy::new();
        let request = VerificationRequest::new("The garden looks beautiful in autumn");
        let outcome = strategy.verify(&request).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::Unverified);
        assert_eq!(outcome.confidence, 0.0);
    }
}

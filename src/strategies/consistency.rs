//! Consistency check strategy.
//!
//! Scans a claim for internal contradictions: sentence pairs where one
//! negates the other, clashing absolute quantifiers, and the same figure
//! stated with different values.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Instant;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::VerificationStrategy;

static NEGATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not|never|no|none|isn't|aren't|wasn't|weren't|doesn't|don't|didn't|cannot|can't)\b")
        .expect("invalid regex")
});

static UNIVERSAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all|every|always|everyone|everything)\b").expect("invalid regex")
});

static NEGATIVE_UNIVERSAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(none|never|no\s+one|nothing|nobody)\b").expect("invalid regex")
});

static NUMBER_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]+)\s+(?:is|was|measures|costs|weighs|equals)\s+(\d+(?:\.\d+)?)")
        .expect("invalid regex")
});

fn split_sentences(content: &str) -> Vec<String> {
    content
        .split(['.', '!', '?', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn content_words(sentence: &str) -> HashSet<String> {
    sentence
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Detects self-contradicting claims.
pub struct ConsistencyStrategy {
    health: StrategyHealth,
}

impl ConsistencyStrategy {
    pub fn new() -> Self {
        Self {
            health: StrategyHealth::new(),
        }
    }

    /// Find contradictions within the claim text. Each finding is a
    /// human-readable description.
    pub fn find_contradictions(&self, content: &str) -> Vec<String> {
        let sentences = split_sentences(content);
        let mut findings = Vec::new();

        // Negated restatements: high word overlap, opposite polarity.
        for i in 0..sentences.len() {
            for j in (i + 1)..sentences.len() {
                let words_a = content_words(&sentences[i]);
                let words_b = content_words(&sentences[j]);
                if words_a.is_empty() || words_b.is_empty() {
                    continue;
                }
                let shared = words_a.intersection(&words_b).count();
                let overlap = shared as f64 / words_a.len().min(words_b.len()) as f64;

                let neg_a = NEGATION_PATTERN.is_match(&sentences[i]);
                let neg_b = NEGATION_PATTERN.is_match(&sentences[j]);

                if overlap >= 0.6 && neg_a != neg_b {
                    findings.push(format!(
                        "\"{}\" conflicts with \"{}\"",
                        sentences[i], sentences[j]
                    ));
                }
            }
        }

        // Universal quantifier clashes across the whole claim.
        if UNIVERSAL_PATTERN.is_match(content) && NEGATIVE_UNIVERSAL_PATTERN.is_match(content) {
            findings.push("claim mixes universal and negative-universal quantifiers".to_string());
        }

        // Same subject stated with two different figures.
        let mut figures: HashMap<String, HashSet<String>> = HashMap::new();
        for cap in NUMBER_MENTION.captures_iter(content) {
            figures
                .entry(cap[1].to_lowercase())
                .or_default()
                .insert(cap[2].to_string());
        }
        for (subject, values) in figures {
            if values.len() > 1 {
                let mut values: Vec<String> = values.into_iter().collect();
                values.sort();
                findings.push(format!(
                    "\"{}\" is given conflicting values: {}",
                    subject,
                    values.join(", ")
                ));
            }
        }

        findings
    }
}

impl Default for ConsistencyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationStrategy for ConsistencyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ConsistencyCheck
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();
        let findings = self.find_contradictions(&request.content);
        let sentence_count = split_sentences(&request.content).len();
        let elapsed = start.elapsed().as_millis() as u64;
        self.health.record_success(elapsed).await;

        let outcome = if !findings.is_empty() {
            let confidence = (0.6 + 0.1 * findings.len() as f64).min(0.9);
            StrategyOutcome::new(
                self.kind(),
                Verdict::Contradictory,
                confidence,
                format!("internal contradictions found: {}", findings.join("; ")),
                elapsed,
            )
            .with_evidence_count(findings.len())
        } else if sentence_count < 2 {
            // A single statement has nothing to be inconsistent with.
            StrategyOutcome::unverified(
                self.kind(),
                "single statement, no internal consistency to check",
                elapsed,
            )
        } else {
            StrategyOutcome::new(
                self.kind(),
                Verdict::VerifiedTrue,
                0.6,
                format!("{} statements are mutually consistent", sentence_count),
                elapsed,
            )
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

//! Logical validation strategy.
//!
//! Scores the argumentative structure of a claim: overgeneralization,
//! circular reasoning, false dichotomies, and appeals that substitute for
//! evidence all reduce the soundness score.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::VerificationStrategy;

static OVERGENERALIZATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all|every|always|never|no\s+one|everyone|nothing|everything)\b")
        .expect("invalid regex")
});

static CIRCULAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(because\s+it\s+is|because\s+they\s+are|by\s+definition\s+true)\b")
        .expect("invalid regex")
});

static FALSE_DICHOTOMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(either\b.{3,60}\bor\b|only\s+two\s+(choices|options))").expect("invalid regex")
});

static APPEAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(everyone\s+knows|obviously|clearly|undeniably|it\s+is\s+known)\b")
        .expect("invalid regex")
});

static CONDITIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bif\b.{3,80}\bthen\b").expect("invalid regex")
});

/// One detected weakness in the claim's reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFlaw {
    pub kind: &'static str,
    pub penalty_tenths: u8,
}

/// Evaluates the logical soundness of claim structure.
pub struct LogicalStrategy {
    health: StrategyHealth,
}

impl LogicalStrategy {
    pub fn new() -> Self {
        Self {
            health: StrategyHealth::new(),
        }
    }

    /// Scan for reasoning flaws.
    pub fn find_flaws(&self, content: &str) -> Vec<LogicalFlaw> {
        let mut flaws = Vec::new();

        if OVERGENERALIZATION.is_match(content) {
            flaws.push(LogicalFlaw {
                kind: "overgeneralization",
                penalty_tenths: 2,
            });
        }
        if CIRCULAR.is_match(content) {
            flaws.push(LogicalFlaw {
                kind: "circular reasoning",
                penalty_tenths: 3,
            });
        }
        if FALSE_DICHOTOMY.is_match(content) {
            flaws.push(LogicalFlaw {
                kind: "false dichotomy",
                penalty_tenths: 2,
            });
        }
        if APPEAL.is_match(content) {
            flaws.push(LogicalFlaw {
                kind: "appeal in place of evidence",
                penalty_tenths: 1,
            });
        }

        flaws
    }
}

impl Default for LogicalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationStrategy for LogicalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LogicalValidation
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();
        let flaws = self.find_flaws(&request.content);
        let well_formed_conditional = CONDITIONAL.is_match(&request.content);

        let mut score: f64 = 0.7;
        for flaw in &flaws {
            score -= flaw.penalty_tenths as f64 / 10.0;
        }
        if well_formed_conditional {
            score += 0.1;
        }
        let score = score.clamp(0.0, 1.0);

        let verdict = if flaws.is_empty() {
            Verdict::VerifiedTrue
        } else if score >= 0.4 {
            Verdict::PartiallyTrue
        } else {
            Verdict::VerifiedFalse
        };

        let reasoning = if flaws.is_empty() {
            "no logical flaws detected".to_string()
        } else {
            let kinds: Vec<&str> = flaws.iter().map(|f| f.kind).collect();
            format!("reasoning weaknesses: {}", kinds.join(", "))
        };

        let elapsed = start.elapsed().as_millis() as u64;
        self.health.record_success(elapsed).await;

        Ok(StrategyOutcome::new(self.kind(), verdict, score, reasoning, elapsed)
            .with_evidence_count(flaws.len()))
    }

    async fn is_available(&self) -> bool {
        self.health.is_available().await
    }

    async fn health(&self) -> StrategyHealthSnapshot {
        self.health.snapshot().await
    }
}

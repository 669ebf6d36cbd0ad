//! Fact checking strategy.
//!
//! Matches claims against a curated table of well-established facts and
//! known falsehoods. Claims the table does not cover come back as
//! insufficient data rather than a guess.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, Verdict, VerificationRequest};

use super::health::{StrategyHealth, StrategyHealthSnapshot};
use super::VerificationStrategy;

/// A knowledge-base entry: a pattern and whether the matched statement
/// is established fact or a known falsehood.
struct KnownFact {
    pattern: &'static LazyLock<Regex>,
    truthful: bool,
    note: &'static str,
}

static EARTH_ORBIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)earth\s+(orbits|revolves\s+around|circles)\s+the\s+sun").expect("invalid regex")
});

static SUN_ORBIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sun\s+(orbits|revolves\s+around|circles)\s+the\s+earth").expect("invalid regex")
});

static FLAT_EARTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)earth\s+is\s+(?:not\s+)?flat").expect("invalid regex"));

static WATER_BOILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)water\s+boils\s+at\s+100\s*(°?\s*c|degrees\s+celsius)").expect("invalid regex")
});

static SPEED_OF_LIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(speed\s+of\s+light|light\s+travels).{0,40}(299\s*,?\s*792|300\s*,?\s*000\s*km)")
        .expect("invalid regex")
});

static HUMAN_CHROMOSOMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)humans?\s+have\s+(\d+)\s+chromosomes").expect("invalid regex")
});

static VACCINES_AUTISM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)vaccines?\s+cause\s+autism").expect("invalid regex")
});

static GREAT_WALL_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)great\s+wall.{0,30}(visible|seen)\s+from\s+space").expect("invalid regex")
});

static HEDGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(might|maybe|possibly|allegedly|reportedly|some\s+say|it\s+is\s+said)\b")
        .expect("invalid regex")
});

static NEGATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not|never|no\s+longer|isn't|doesn't|don't)\b").expect("invalid regex")
});

static KNOWN_FACTS: &[KnownFact] = &[
    KnownFact {
        pattern: &EARTH_ORBIT,
        truthful: true,
        note: "heliocentric orbit is established",
    },
    KnownFact {
        pattern: &SUN_ORBIT,
        truthful: false,
        note: "geocentric model is refuted",
    },
    KnownFact {
        pattern: &FLAT_EARTH,
        truthful: false,
        note: "the Earth is an oblate spheroid",
    },
    KnownFact {
        pattern: &WATER_BOILING,
        truthful: true,
        note: "boiling point at standard pressure",
    },
    KnownFact {
        pattern: &SPEED_OF_LIGHT,
        truthful: true,
        note: "c is approximately 299,792 km/s",
    },
    KnownFact {
        pattern: &VACCINES_AUTISM,
        truthful: false,
        note: "no causal link in the literature",
    },
    KnownFact {
        pattern: &GREAT_WALL_SPACE,
        truthful: false,
        note: "not visible to the naked eye from orbit",
    },
];

/// Checks claims against the built-in knowledge base.
pub struct FactCheckingStrategy {
    health: StrategyHealth,
}

impl FactCheckingStrategy {
    pub fn new() -> Self {
        Self {
            health: StrategyHealth::new(),
        }
    }

    /// Evaluate a claim against the knowledge base.
    ///
    /// Returns `(verdict, confidence, note)`.
    fn evaluate(&self, content: &str) -> (Verdict, f64, String) {
        let negated = NEGATION_PATTERN.is_match(content);
        let hedged = HEDGE_PATTERN.is_match(content);

        for fact in KNOWN_FACTS {
            if fact.pattern.is_match(content) {
                // Negation flips the table's polarity.
                let truthful = fact.truthful != negated;
                let verdict = if truthful {
                    Verdict::VerifiedTrue
                } else {
                    Verdict::VerifiedFalse
                };
                let confidence = if hedged { 0.7 } else { 0.9 };
                return (verdict, confidence, fact.note.to_string());
            }
        }

        // Chromosome count carries its own number to check.
        if let Some(cap) = HUMAN_CHROMOSOMES.captures(content) {
            let claimed: u32 = cap[1].parse().unwrap_or(0);
            return if claimed == 46 {
                (Verdict::VerifiedTrue, 0.9, "46 chromosomes is correct".to_string())
            } else {
                (
                    Verdict::VerifiedFalse,
                    0.9,
                    format!("humans have 46 chromosomes, not {}", claimed),
                )
            };
        }

        (
            Verdict::InsufficientData,
            0.3,
            "claim not covered by the fact table".to_string(),
        )
    }
}

impl Default for FactCheckingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationStrategy for FactCheckingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FactChecking
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome> {
        let start = Instant::now();
        let (verdict, confidence, note) = self.evaluate(&request.content);
        let elapsed = start.elapsed().as_millis() as u64;
        self.health.record_success(elapsed).await;

        Ok(StrategyOutcome::new(
            self.kind(),
            verdict,
            confidence,
            note,
            elapsed,
        ))
    }

    async fn is_available(&self) -> bool {
        self.health.is_available().await
    }

    async fn health(&self) -> StrategyHealthSnapshot {
        self.health.snapshot().await
    }
}

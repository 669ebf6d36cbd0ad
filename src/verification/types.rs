//! Core types for verification requests, outcomes, and results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Maximum accepted claim content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 10_000;

/// The categorical judgment about a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The claim is supported by the evidence
    VerifiedTrue,
    /// The claim is contradicted by the evidence
    VerifiedFalse,
    /// Parts of the claim hold, parts do not
    PartiallyTrue,
    /// Strategies disagree without a clear majority
    Contradictory,
    /// Not enough evidence to decide either way
    InsufficientData,
    /// No strategy produced a usable outcome
    Unverified,
    /// The request itself failed
    Error,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerifiedTrue => write!(f, "VerifiedTrue"),
            Self::VerifiedFalse => write!(f, "VerifiedFalse"),
            Self::PartiallyTrue => write!(f, "PartiallyTrue"),
            Self::Contradictory => write!(f, "Contradictory"),
            Self::InsufficientData => write!(f, "InsufficientData"),
            Self::Unverified => write!(f, "Unverified"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Request priority. Orders batch scheduling and scales cache TTL.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// The verification strategies known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FactChecking,
    SourceCredibility,
    CrossReference,
    ConsistencyCheck,
    LogicalValidation,
    StatisticalValidation,
}

impl StrategyKind {
    /// All strategy kinds in their fixed execution/tie-break order.
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::FactChecking,
        StrategyKind::SourceCredibility,
        StrategyKind::CrossReference,
        StrategyKind::ConsistencyCheck,
        StrategyKind::LogicalValidation,
        StrategyKind::StatisticalValidation,
    ];

    /// Position in the fixed priority order. Lower ranks first.
    pub fn priority_rank(&self) -> usize {
        Self::ALL
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FactChecking => write!(f, "fact_checking"),
            Self::SourceCredibility => write!(f, "source_credibility"),
            Self::CrossReference => write!(f, "cross_reference"),
            Self::ConsistencyCheck => write!(f, "consistency_check"),
            Self::LogicalValidation => write!(f, "logical_validation"),
            Self::StatisticalValidation => write!(f, "statistical_validation"),
        }
    }
}

/// An immutable verification request.
///
/// Created by the caller, consumed once by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Opaque request identifier
    pub id: String,
    /// The claim to verify (non-empty, at most [`MAX_CONTENT_LENGTH`] chars)
    pub content: String,
    /// Where the claim came from, if known
    pub source: Option<String>,
    /// Surrounding conversational or task context
    pub context: Option<String>,
    /// Scheduling priority
    pub priority: Priority,
    /// Explicit strategy selection; `None` means all registered strategies
    pub strategies: Option<Vec<StrategyKind>>,
    /// Per-request deadline in milliseconds
    pub timeout_ms: Option<u64>,
    /// Caller metadata, passed through untouched
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VerificationRequest {
    /// Create a new request for the given claim content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            source: None,
            context: None,
            priority: Priority::Medium,
            strategies: None,
            timeout_ms: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the claim source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the surrounding context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict verification to the given strategies.
    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One strategy's self-reported verdict for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    /// Which strategy produced this outcome
    pub strategy: StrategyKind,
    /// The strategy's verdict
    pub verdict: Verdict,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable reasoning
    pub reasoning: String,
    /// Wall-clock processing time, clamped to at least 1ms so a run
    /// is distinguishable from "not run"
    pub processing_time_ms: u64,
    /// Number of evidence items consulted
    pub evidence_count: usize,
}

impl StrategyOutcome {
    /// Create a new outcome. Confidence is clamped to [0, 1] and
    /// processing time to >= 1ms.
    pub fn new(
        strategy: StrategyKind,
        verdict: Verdict,
        confidence: f64,
        reasoning: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            strategy,
            verdict,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            processing_time_ms: processing_time_ms.max(1),
            evidence_count: 0,
        }
    }

    /// An unverified outcome carrying an error message, used when a
    /// strategy fails or times out.
    pub fn unverified(
        strategy: StrategyKind,
        reason: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self::new(strategy, Verdict::Unverified, 0.0, reason, processing_time_ms)
    }

    /// Set the evidence count.
    pub fn with_evidence_count(mut self, count: usize) -> Self {
        self.evidence_count = count;
        self
    }
}

/// The aggregated result of verifying one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Id of the request this result answers
    pub request_id: String,
    /// Final verdict
    pub verdict: Verdict,
    /// Aggregate confidence in [0, 1]; always 0 when verdict is Error
    pub confidence: f64,
    /// Ordered reasoning lines
    pub reasoning: Vec<String>,
    /// Evidence supporting the claim
    pub supporting_evidence: Vec<String>,
    /// Evidence contradicting the claim
    pub contradictory_evidence: Vec<String>,
    /// Per-strategy outcomes in completion order
    pub strategy_outcomes: Vec<StrategyOutcome>,
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
    /// Error message for request-level failures
    pub error: Option<String>,
}

impl VerificationResult {
    /// Create a result with the given verdict and confidence.
    pub fn new(request_id: impl Into<String>, verdict: Verdict, confidence: f64) -> Self {
        let confidence = if verdict == Verdict::Error {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            request_id: request_id.into(),
            verdict,
            confidence,
            reasoning: Vec::new(),
            supporting_evidence: Vec::new(),
            contradictory_evidence: Vec::new(),
            strategy_outcomes: Vec::new(),
            processing_time_ms: 1,
            error: None,
        }
    }

    /// Create an error result. Confidence is forced to 0.
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut result = Self::new(request_id, Verdict::Error, 0.0);
        result.reasoning.push(message.clone());
        result.error = Some(message);
        result
    }

    /// Set the processing time, clamped to at least 1ms.
    pub fn with_processing_time(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms.max(1);
        self
    }
}

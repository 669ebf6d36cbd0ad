//! Deterministic aggregation of strategy outcomes into a final verdict.
//!
//! The aggregator is a pure function of the multiset of outcomes: permuting
//! the input never changes the verdict or confidence. Ties between equally
//! popular verdicts are broken by the fixed strategy priority order.

use std::collections::HashMap;

use super::types::{StrategyOutcome, Verdict};

/// Aggregated verdict, confidence, and assembled reasoning.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub supporting_evidence: Vec<String>,
    pub contradictory_evidence: Vec<String>,
}

/// Confidence multiplier for a given consensus ratio.
fn consensus_factor(ratio: f64) -> f64 {
    if ratio >= 0.8 {
        1.0
    } else if ratio >= 0.6 {
        0.8
    } else if ratio >= 0.4 {
        0.6
    } else {
        0.4
    }
}

/// Combine strategy outcomes into a final verdict and confidence.
///
/// Unverified outcomes are excluded from voting but still appear in the
/// per-strategy reasoning lines, so timeout and failure messages surface
/// in the result.
pub fn aggregate_outcomes(outcomes: &[StrategyOutcome]) -> Aggregate {
    let valid: Vec<&StrategyOutcome> = outcomes
        .iter()
        .filter(|o| o.verdict != Verdict::Unverified)
        .collect();

    // Stable presentation order regardless of completion order.
    let mut ordered: Vec<&StrategyOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| o.strategy.priority_rank());

    if valid.is_empty() {
        let mut reasoning = vec![
            format!("Consensus verdict: {}", Verdict::Unverified),
            "0 verification methods applied".to_string(),
        ];
        reasoning.extend(strategy_lines(&ordered));
        return Aggregate {
            verdict: Verdict::Unverified,
            confidence: 0.0,
            reasoning,
            supporting_evidence: Vec::new(),
            contradictory_evidence: Vec::new(),
        };
    }

    // Count votes and remember the best-ranked strategy backing each verdict.
    let mut votes: HashMap<Verdict, (usize, usize)> = HashMap::new();
    for outcome in &valid {
        let entry = votes
            .entry(outcome.verdict)
            .or_insert((0, usize::MAX));
        entry.0 += 1;
        entry.1 = entry.1.min(outcome.strategy.priority_rank());
    }

    let plurality_count = votes.values().map(|(count, _)| *count).max().unwrap_or(0);
    let plurality_verdict = votes
        .iter()
        .filter(|(_, (count, _))| *count == plurality_count)
        .min_by_key(|(_, (_, best_rank))| *best_rank)
        .map(|(verdict, _)| *verdict)
        .unwrap_or(Verdict::Unverified);

    let distinct = votes.len();
    let strict_majority = plurality_count * 2 > valid.len();
    let verdict = if distinct > 1 && !strict_majority {
        Verdict::Contradictory
    } else {
        plurality_verdict
    };

    let consensus_ratio = plurality_count as f64 / valid.len() as f64;
    let avg_confidence =
        valid.iter().map(|o| o.confidence).sum::<f64>() / valid.len() as f64;
    let confidence = (avg_confidence * consensus_factor(consensus_ratio)).clamp(0.0, 1.0);

    let mut reasoning = vec![
        format!("Consensus verdict: {}", verdict),
        format!("{} verification methods applied", valid.len()),
    ];
    reasoning.extend(strategy_lines(&ordered));

    let mut supporting_evidence = Vec::new();
    let mut contradictory_evidence = Vec::new();
    for outcome in &ordered {
        match outcome.verdict {
            Verdict::VerifiedTrue | Verdict::PartiallyTrue => {
                supporting_evidence.push(outcome.reasoning.clone());
            }
            Verdict::VerifiedFalse => {
                contradictory_evidence.push(outcome.reasoning.clone());
            }
            _ => {}
        }
    }

    Aggregate {
        verdict,
        confidence,
        reasoning,
        supporting_evidence,
        contradictory_evidence,
    }
}

fn strategy_lines(ordered: &[&StrategyOutcome]) -> Vec<String> {
    ordered
        .iter()
        .map(|o| format!("{}: {}", o.strategy, o.reasoning))
        .collect()
}

//! Verification strategies.
//!
//! Each strategy judges a claim independently behind the same contract:
//! `verify` produces a [`StrategyOutcome`], `is_available` gates dispatch,
//! and `health` reports rolling liveness. The engine composes them; no
//! strategy knows another exists.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::verification::types::{StrategyKind, StrategyOutcome, VerificationRequest};

pub mod consistency;
pub mod cross_reference;
pub mod fact_checking;
pub mod health;
pub mod logical;
pub mod search;
pub mod source_credibility;
pub mod statistical;

pub use consistency::ConsistencyStrategy;
pub use cross_reference::{CrossReferenceConfig, CrossReferenceStrategy};
pub use fact_checking::FactCheckingStrategy;
pub use health::{StrategyHealth, StrategyHealthSnapshot};
pub use logical::LogicalStrategy;
pub use search::{
    BingProvider, BraveProvider, DuckDuckGoProvider, GoogleSearchProvider, MockSearchProvider,
    SearchProvider, SearchReference, DEFAULT_SEARCH_TIMEOUT_MS,
};
pub use source_credibility::{CredibilityAnalysis, SourceCredibilityStrategy};
pub use statistical::StatisticalStrategy;

/// Contract implemented by every verification strategy.
#[async_trait]
pub trait VerificationStrategy: Send + Sync {
    /// Which strategy kind this implementation provides.
    fn kind(&self) -> StrategyKind;

    /// Judge a single request. Implementations recover their own
    /// transient failures; a returned error is converted to an
    /// Unverified outcome by the engine.
    async fn verify(&self, request: &VerificationRequest) -> Result<StrategyOutcome>;

    /// Whether the strategy should currently receive requests.
    async fn is_available(&self) -> bool;

    /// Rolling health snapshot.
    async fn health(&self) -> StrategyHealthSnapshot;
}

/// The full default strategy set in registry order.
///
/// Cross-reference picks up whatever search providers the environment
/// configures, falling back to the deterministic mock.
pub fn default_strategies() -> Vec<Arc<dyn VerificationStrategy>> {
    vec![
        Arc::new(FactCheckingStrategy::new()),
        Arc::new(SourceCredibilityStrategy::new()),
        Arc::new(CrossReferenceStrategy::from_env()),
        Arc::new(ConsistencyStrategy::new()),
        Arc::new(LogicalStrategy::new()),
        Arc::new(StatisticalStrategy::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategies_cover_all_kinds() {
        let strategies = default_strategies();
        assert_eq!(strategies.len(), StrategyKind::ALL.len());

        for (strategy, kind) in strategies.iter().zip(StrategyKind::ALL) {
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_fresh_strategies_are_available() {
        for strategy in default_strategies() {
            assert!(strategy.is_available().await);
        }
    }
}

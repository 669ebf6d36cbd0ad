//! The verification engine: fan-out, fan-in, and resource governance.
//!
//! `verify` runs the full pipeline: cache lookup, request validation,
//! concurrency gate, method selection, parallel dispatch with per-strategy
//! timeouts, aggregation, and cache write-back. Request-level failures are
//! returned as results with an error field; nothing escapes as a panic.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::strategies::VerificationStrategy;

use super::aggregate::aggregate_outcomes;
use super::cache::{CacheStats, Fingerprint, VerificationCache};
use super::types::{
    StrategyKind, StrategyOutcome, Verdict, VerificationRequest, VerificationResult,
    MAX_CONTENT_LENGTH,
};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent verifications admitted before fail-fast rejection
    pub max_concurrent_verifications: usize,
    /// Per-strategy timeout when the request does not set one
    pub default_timeout_ms: u64,
    /// Hard cap on any per-strategy timeout
    pub max_timeout_ms: u64,
    /// Result cache TTL
    pub cache_ttl_ms: u64,
    /// Interval between cache sweeps
    pub cache_sweep_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_verifications: 10,
            default_timeout_ms: 30_000,
            max_timeout_ms: 60_000,
            cache_ttl_ms: 3_600_000,
            cache_sweep_interval_ms: 300_000,
        }
    }
}

/// Lifecycle of one in-flight verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Pending,
    Running,
    Aggregated,
    Errored,
}

/// Orchestrates strategies behind a uniform contract.
pub struct VerificationEngine {
    strategies: HashMap<StrategyKind, Arc<dyn VerificationStrategy>>,
    enabled: RwLock<Vec<StrategyKind>>,
    config: EngineConfig,
    cache: Arc<VerificationCache>,
    gate: Arc<Semaphore>,
    in_flight: Arc<RwLock<HashMap<String, VerificationState>>>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl VerificationEngine {
    /// Create an engine over the given strategies.
    pub fn new(strategies: Vec<Arc<dyn VerificationStrategy>>, config: EngineConfig) -> Self {
        let mut map = HashMap::new();
        let mut enabled = Vec::new();
        for strategy in strategies {
            let kind = strategy.kind();
            if map.insert(kind, strategy).is_none() {
                enabled.push(kind);
            }
        }

        Self {
            strategies: map,
            enabled: RwLock::new(enabled),
            gate: Arc::new(Semaphore::new(config.max_concurrent_verifications)),
            cache: Arc::new(VerificationCache::new(config.cache_ttl_ms)),
            config,
            in_flight: Arc::new(RwLock::new(HashMap::new())),
            sweeper: Mutex::new(None),
        }
    }

    /// Create an engine with the default strategy set and config.
    pub fn with_defaults() -> Self {
        Self::new(crate::strategies::default_strategies(), EngineConfig::default())
    }

    /// Enable or disable a registered strategy.
    pub async fn set_enabled(&self, kind: StrategyKind, enabled: bool) {
        let mut list = self.enabled.write().await;
        if enabled {
            if self.strategies.contains_key(&kind) && !list.contains(&kind) {
                list.push(kind);
            }
        } else {
            list.retain(|k| *k != kind);
        }
    }

    /// Start the periodic cache sweep. Idempotent.
    pub async fn start_maintenance(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let interval_ms = self.config.cache_sweep_interval_ms;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup().await;
            }
        }));
    }

    /// Stop the sweep and drop cached results.
    pub async fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.cache.clear().await;
        info!("verification engine destroyed");
    }

    /// Verify one request.
    ///
    /// Always returns a result: request-level failures carry an `error`
    /// field instead of propagating.
    pub async fn verify(&self, request: VerificationRequest) -> VerificationResult {
        let start = Instant::now();

        // Cache lookup before any gating: repeats are free.
        let fingerprint = Fingerprint::for_request(&request);
        if let Some(mut cached) = self.cache.get(&fingerprint).await {
            debug!(request_id = %request.id, key = %fingerprint, "cache hit");
            cached.request_id = request.id.clone();
            cached.processing_time_ms = (start.elapsed().as_millis() as u64).max(1);
            return cached;
        }

        if let Some(reason) = validate_request(&request) {
            return VerificationResult::error(&request.id, reason)
                .with_processing_time(start.elapsed().as_millis() as u64);
        }

        // Fail fast at the gate; queueing unboundedly is worse than a
        // clean rejection the caller can retry.
        let permit = match self.gate.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(request_id = %request.id, "concurrency gate saturated");
                let result = VerificationResult::error(
                    &request.id,
                    format!(
                        "Rate limit exceeded: {} concurrent verifications in flight",
                        self.config.max_concurrent_verifications
                    ),
                );
                return result.with_processing_time(start.elapsed().as_millis() as u64);
            }
        };

        self.in_flight
            .write()
            .await
            .insert(request.id.clone(), VerificationState::Pending);

        let selected = self.select_strategies(&request).await;
        let result = if selected.is_empty() {
            let result = if request.strategies.is_some() {
                VerificationResult::error(
                    &request.id,
                    "Verification method unavailable: none of the requested strategies are available",
                )
            } else {
                let mut r =
                    VerificationResult::new(&request.id, Verdict::Unverified, 0.0);
                r.reasoning.push("No verification strategies available".to_string());
                r
            };
            self.mark_state(&request.id, VerificationState::Errored).await;
            result.with_processing_time(start.elapsed().as_millis() as u64)
        } else {
            self.mark_state(&request.id, VerificationState::Running).await;
            let outcomes = self.dispatch(&request, &selected).await;
            let aggregate = aggregate_outcomes(&outcomes);

            let mut result =
                VerificationResult::new(&request.id, aggregate.verdict, aggregate.confidence);
            result.reasoning = aggregate.reasoning;
            result.supporting_evidence = aggregate.supporting_evidence;
            result.contradictory_evidence = aggregate.contradictory_evidence;
            result.strategy_outcomes = outcomes;
            let result = result.with_processing_time(start.elapsed().as_millis() as u64);

            self.mark_state(&request.id, VerificationState::Aggregated).await;
            // Only settled verdicts are worth caching; an all-strategies-
            // failed Unverified should retry next time, not stick for a TTL.
            if result.verdict != Verdict::Unverified {
                self.cache
                    .insert(fingerprint, result.clone(), request.priority)
                    .await;
            }
            result
        };

        self.in_flight.write().await.remove(&request.id);
        drop(permit);
        result
    }

    /// Verify a batch, highest priority first, in gate-sized chunks.
    pub async fn verify_batch(
        &self,
        mut requests: Vec<VerificationRequest>,
    ) -> Vec<VerificationResult> {
        requests.sort_by(|a, b| b.priority.cmp(&a.priority));

        let chunk_size = self.config.max_concurrent_verifications.max(1);
        let mut results = Vec::with_capacity(requests.len());
        for chunk in requests.chunks(chunk_size) {
            let batch = chunk.iter().cloned().map(|request| self.verify(request));
            results.extend(join_all(batch).await);
        }
        results
    }

    /// Requested strategies filtered to registered, enabled, available
    /// ones, in the fixed priority order.
    async fn select_strategies(
        &self,
        request: &VerificationRequest,
    ) -> Vec<Arc<dyn VerificationStrategy>> {
        let enabled = self.enabled.read().await.clone();

        let mut kinds: Vec<StrategyKind> = match &request.strategies {
            Some(requested) => requested
                .iter()
                .copied()
                .filter(|k| enabled.contains(k))
                .collect(),
            None => enabled,
        };
        kinds.sort_by_key(|k| k.priority_rank());
        kinds.dedup();

        let mut selected = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if let Some(strategy) = self.strategies.get(&kind) {
                if strategy.is_available().await {
                    selected.push(Arc::clone(strategy));
                }
            }
        }
        selected
    }

    /// Run the selected strategies in parallel, each behind its own
    /// timeout. A failing, panicking, or slow strategy yields an
    /// Unverified outcome and never disturbs its siblings.
    async fn dispatch(
        &self,
        request: &VerificationRequest,
        selected: &[Arc<dyn VerificationStrategy>],
    ) -> Vec<StrategyOutcome> {
        let timeout_ms = request
            .timeout_ms
            .unwrap_or(self.config.default_timeout_ms)
            .min(self.config.max_timeout_ms);
        let timeout = Duration::from_millis(timeout_ms);

        let tasks = selected.iter().map(|strategy| {
            let strategy = Arc::clone(strategy);
            let request = request.clone();
            let kind = strategy.kind();
            async move {
                let started = Instant::now();
                let handle =
                    tokio::spawn(async move { strategy.verify(&request).await });
                match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(Ok(outcome))) => outcome,
                    Ok(Ok(Err(err))) => {
                        let elapsed = started.elapsed().as_millis() as u64;
                        StrategyOutcome::unverified(kind, err.to_string(), elapsed)
                    }
                    Ok(Err(join_err)) => {
                        // The strategy panicked; convert, don't propagate.
                        let elapsed = started.elapsed().as_millis() as u64;
                        StrategyOutcome::unverified(
                            kind,
                            format!("strategy panicked: {join_err}"),
                            elapsed,
                        )
                    }
                    Err(_) => {
                        StrategyOutcome::unverified(kind, "Operation timeout", timeout_ms)
                    }
                }
            }
        });

        join_all(tasks).await
    }

    async fn mark_state(&self, request_id: &str, state: VerificationState) {
        if let Some(entry) = self.in_flight.write().await.get_mut(request_id) {
            *entry = state;
        }
    }

    /// Number of verifications currently past the gate.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }

    /// Cache statistics snapshot.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Health snapshots for every registered strategy.
    pub async fn strategy_health(
        &self,
    ) -> HashMap<StrategyKind, crate::strategies::StrategyHealthSnapshot> {
        let mut health = HashMap::new();
        for (kind, strategy) in &self.strategies {
            health.insert(*kind, strategy.health().await);
        }
        health
    }
}

/// Request validation: empty content, oversized content, or an
/// explicitly empty strategy selection.
fn validate_request(request: &VerificationRequest) -> Option<String> {
    if request.content.is_empty() {
        return Some("Invalid request: content must not be empty".to_string());
    }
    if request.content.chars().count() > MAX_CONTENT_LENGTH {
        return Some(format!(
            "Invalid request: content exceeds {} characters",
            MAX_CONTENT_LENGTH
        ));
    }
    if matches!(&request.strategies, Some(kinds) if kinds.is_empty()) {
        return Some("Invalid request: requested strategy set is empty".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::strategies::StrategyHealthSnapshot;
    use crate::verification::types::Priority;
    use async_trait::async_trait;

    /// Configurable strategy for engine tests.
    struct TestStrategy {
        kind: StrategyKind,
        verdict: Verdict,
        confidence: f64,
        delay_ms: u64,
        fail: bool,
    }

    impl TestStrategy {
        fn new(kind: StrategyKind, verdict: Verdict, confidence: f64) -> Self {
            Self {
                kind,
                verdict,
                confidence,
                delay_ms: 0,
                fail: false,
            }
        }

        fn with_delay(mut self, delay_ms: u64) -> Self {
            self.delay_ms = delay_ms;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl VerificationStrategy for TestStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn verify(
            &self,
            _request: &VerificationRequest,
        ) -> crate::error::Result<StrategyOutcome> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(Error::dependency_unavailable("test strategy outage"));
            }
            Ok(StrategyOutcome::new(
                self.kind,
                self.verdict,
                self.confidence,
                "test outcome",
                5,
            ))
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn health(&self) -> StrategyHealthSnapshot {
            StrategyHealthSnapshot {
                available: true,
                response_time_ms: 1.0,
                error_rate: 0.0,
                consecutive_failures: 0,
                stale: false,
            }
        }
    }

    fn engine_with(strategies: Vec<Arc<dyn VerificationStrategy>>) -> VerificationEngine {
        VerificationEngine::new(strategies, EngineConfig::default())
    }

    fn consensus_engine() -> VerificationEngine {
        engine_with(vec![
            Arc::new(TestStrategy::new(
                StrategyKind::FactChecking,
                Verdict::VerifiedTrue,
                0.9,
            )),
            Arc::new(TestStrategy::new(
                StrategyKind::SourceCredibility,
                Verdict::VerifiedTrue,
                0.8,
            )),
            Arc::new(TestStrategy::new(
                StrategyKind::CrossReference,
                Verdict::VerifiedTrue,
                0.75,
            )),
        ])
    }

    #[tokio::test]
    async fn test_consensus_true_scenario() {
        let engine = consensus_engine();
        let request = VerificationRequest::new("The Earth orbits the Sun");

        let result = engine.verify(request).await;
        assert_eq!(result.verdict, Verdict::VerifiedTrue);
        assert!((result.confidence - 0.8166).abs() < 0.01);
        assert_eq!(result.reasoning[0], "Consensus verdict: VerifiedTrue");
        assert_eq!(result.reasoning[1], "3 verification methods applied");
        assert!(result.processing_time_ms >= 1);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let engine = consensus_engine();
        let result = engine.verify(VerificationRequest::new("")).await;

        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.as_deref().unwrap_or("").contains("Invalid request"));
    }

    #[tokio::test]
    async fn test_content_length_boundaries() {
        let engine = consensus_engine();

        let at_limit = "a".repeat(MAX_CONTENT_LENGTH);
        let result = engine.verify(VerificationRequest::new(at_limit)).await;
        assert_ne!(result.verdict, Verdict::Error);

        let over_limit = "a".repeat(MAX_CONTENT_LENGTH + 1);
        let result = engine.verify(VerificationRequest::new(over_limit)).await;
        assert_eq!(result.verdict, Verdict::Error);
    }

    #[tokio::test]
    async fn test_explicitly_empty_strategy_set_rejected() {
        let engine = consensus_engine();
        let request = VerificationRequest::new("a claim").with_strategies(vec![]);

        let result = engine.verify(request).await;
        assert_eq!(result.verdict, Verdict::Error);
    }

    #[tokio::test]
    async fn test_cache_returns_same_verdict_with_fresh_timing() {
        let engine = consensus_engine();

        let first = engine
            .verify(VerificationRequest::new("The Earth orbits the Sun"))
            .await;
        let second = engine
            .verify(VerificationRequest::new("The Earth orbits the Sun"))
            .await;

        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.confidence, second.confidence);

        let stats = engine.cache_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_failing_strategy_recovered_locally() {
        let engine = engine_with(vec![
            Arc::new(
                TestStrategy::new(StrategyKind::FactChecking, Verdict::VerifiedTrue, 0.9)
                    .failing(),
            ),
            Arc::new(TestStrategy::new(
                StrategyKind::SourceCredibility,
                Verdict::VerifiedTrue,
                0.8,
            )),
        ]);

        let result = engine.verify(VerificationRequest::new("a resilient claim")).await;
        assert_eq!(result.verdict, Verdict::VerifiedTrue);

        let failed = result
            .strategy_outcomes
            .iter()
            .find(|o| o.strategy == StrategyKind::FactChecking)
            .unwrap();
        assert_eq!(failed.verdict, Verdict::Unverified);
        assert!(failed.reasoning.contains("outage"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_timeout_yields_partial_aggregate() {
        let engine = engine_with(vec![
            Arc::new(
                TestStrategy::new(StrategyKind::FactChecking, Verdict::VerifiedTrue, 0.9)
                    .with_delay(200),
            ),
            Arc::new(TestStrategy::new(
                StrategyKind::SourceCredibility,
                Verdict::VerifiedTrue,
                0.9,
            )),
        ]);

        let request = VerificationRequest::new("a slow claim").with_timeout_ms(50);
        let result = engine.verify(request).await;

        assert_eq!(result.verdict, Verdict::VerifiedTrue);
        assert!((result.confidence - 0.9).abs() < 1e-9);

        let timed_out = result
            .strategy_outcomes
            .iter()
            .find(|o| o.strategy == StrategyKind::FactChecking)
            .unwrap();
        assert_eq!(timed_out.verdict, Verdict::Unverified);
        assert_eq!(timed_out.reasoning, "Operation timeout");
        assert_eq!(timed_out.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_concurrency_gate_fails_fast() {
        let mut config = EngineConfig::default();
        config.max_concurrent_verifications = 1;

        let engine = Arc::new(VerificationEngine::new(
            vec![Arc::new(
                TestStrategy::new(StrategyKind::FactChecking, Verdict::VerifiedTrue, 0.9)
                    .with_delay(200),
            )],
            config,
        ));

        let busy = Arc::clone(&engine);
        let first = tokio::spawn(async move {
            busy.verify(VerificationRequest::new("holds the only permit")).await
        });

        // Let the first verification take the permit.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = engine
            .verify(VerificationRequest::new("rejected at the gate"))
            .await;
        assert_eq!(second.verdict, Verdict::Error);
        assert!(second
            .error
            .as_deref()
            .unwrap_or("")
            .contains("Rate limit exceeded"));

        let first = first.await.unwrap();
        assert_eq!(first.verdict, Verdict::VerifiedTrue);
    }

    #[tokio::test]
    async fn test_batch_processes_high_priority_first() {
        let engine = consensus_engine();
        let requests = vec![
            VerificationRequest::new("low priority claim").with_priority(Priority::Low),
            VerificationRequest::new("critical claim").with_priority(Priority::Critical),
            VerificationRequest::new("medium claim").with_priority(Priority::Medium),
        ];

        let results = engine.verify_batch(requests).await;
        assert_eq!(results.len(), 3);
        // Results come back in scheduling order: critical first.
        assert!(results.iter().all(|r| r.verdict == Verdict::VerifiedTrue));
    }

    #[tokio::test]
    async fn test_requested_subset_is_honored() {
        let engine = consensus_engine();
        let request = VerificationRequest::new("a selective claim")
            .with_strategies(vec![StrategyKind::FactChecking]);

        let result = engine.verify(request).await;
        assert_eq!(result.strategy_outcomes.len(), 1);
        assert_eq!(result.strategy_outcomes[0].strategy, StrategyKind::FactChecking);
    }

    #[tokio::test]
    async fn test_disabled_strategy_not_dispatched() {
        let engine = consensus_engine();
        engine.set_enabled(StrategyKind::FactChecking, false).await;

        let result = engine.verify(VerificationRequest::new("a claim")).await;
        assert!(result
            .strategy_outcomes
            .iter()
            .all(|o| o.strategy != StrategyKind::FactChecking));
    }

    #[tokio::test]
    async fn test_destroy_clears_cache() {
        let engine = consensus_engine();
        engine.start_maintenance().await;

        engine.verify(VerificationRequest::new("to be dropped")).await;
        assert_eq!(engine.cache_stats().await.entry_count, 1);

        engine.destroy().await;
        assert_eq!(engine.cache_stats().await.entry_count, 0);
    }
}

//! Rolling health tracking shared by every verification strategy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Response-time samples retained in the rolling window.
const RESPONSE_WINDOW: usize = 100;

/// Smoothing factor for the exponential-moving error rate.
const ERROR_RATE_ALPHA: f64 = 0.1;

/// Consecutive failures after which a strategy reports unavailable.
const FAILURE_THRESHOLD: u32 = 3;

/// A strategy is stale when no check has run in this many minutes.
const STALE_AFTER_MINUTES: i64 = 5;

/// Point-in-time health report for a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyHealthSnapshot {
    /// Whether the strategy should be dispatched to
    pub available: bool,
    /// Average response time over the rolling window
    pub response_time_ms: f64,
    /// Exponential-moving error rate in [0, 1]
    pub error_rate: f64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// No check recorded within the staleness horizon
    pub stale: bool,
}

/// Mutable health state behind each strategy's `health()` call.
///
/// Response times use a rolling window of the last [`RESPONSE_WINDOW`]
/// samples; the error rate is an EMA so old failures decay instead of
/// pinning the strategy unavailable forever.
#[derive(Debug)]
struct HealthState {
    response_times: VecDeque<u64>,
    error_rate: f64,
    consecutive_failures: u32,
    last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StrategyHealth {
    state: Arc<RwLock<HealthState>>,
}

impl StrategyHealth {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState {
                response_times: VecDeque::with_capacity(RESPONSE_WINDOW),
                error_rate: 0.0,
                consecutive_failures: 0,
                last_check: None,
            })),
        }
    }

    /// Record a successful check with its response time.
    pub async fn record_success(&self, response_time_ms: u64) {
        let mut state = self.state.write().await;
        if state.response_times.len() == RESPONSE_WINDOW {
            state.response_times.pop_front();
        }
        state.response_times.push_back(response_time_ms);
        state.error_rate *= 1.0 - ERROR_RATE_ALPHA;
        state.consecutive_failures = 0;
        state.last_check = Some(Utc::now());
    }

    /// Record a failed check.
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.error_rate = state.error_rate * (1.0 - ERROR_RATE_ALPHA) + ERROR_RATE_ALPHA;
        state.consecutive_failures += 1;
        state.last_check = Some(Utc::now());
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> StrategyHealthSnapshot {
        let state = self.state.read().await;
        let response_time_ms = if state.response_times.is_empty() {
            0.0
        } else {
            state.response_times.iter().sum::<u64>() as f64 / state.response_times.len() as f64
        };
        let stale = match state.last_check {
            Some(at) => Utc::now() - at > Duration::minutes(STALE_AFTER_MINUTES),
            None => false,
        };
        StrategyHealthSnapshot {
            available: state.consecutive_failures < FAILURE_THRESHOLD,
            response_time_ms,
            error_rate: state.error_rate,
            consecutive_failures: state.consecutive_failures,
            stale,
        }
    }

    /// Whether the strategy is currently considered available.
    pub async fn is_available(&self) -> bool {
        self.state.read().await.consecutive_failures < FAILURE_THRESHOLD
    }
}

impl Default for StrategyHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_resets_failures() {
        let health = StrategyHealth::new();
        health.record_failure().await;
        health.record_failure().await;
        health.record_success(25).await;

        let snap = health.snapshot().await;
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.available);
        assert_eq!(snap.response_time_ms, 25.0);
    }

    #[tokio::test]
    async fn test_repeated_failures_mark_unavailable() {
        let health = StrategyHealth::new();
        for _ in 0..FAILURE_THRESHOLD {
            health.record_failure().await;
        }
        assert!(!health.is_available().await);
    }

    #[tokio::test]
    async fn test_error_rate_moves_with_alpha() {
        let health = StrategyHealth::new();
        health.record_failure().await;
        let snap = health.snapshot().await;
        assert!((snap.error_rate - 0.1).abs() < 1e-9);

        health.record_failure().await;
        let snap = health.snapshot().await;
        assert!((snap.error_rate - 0.19).abs() < 1e-9);

        health.record_success(10).await;
        let snap = health.snapshot().await;
        assert!((snap.error_rate - 0.171).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_response_window_is_bounded() {
        let health = StrategyHealth::new();
        for i in 0..150 {
            health.record_success(i).await;
        }
        let state = health.state.read().await;
        assert_eq!(state.response_times.len(), RESPONSE_WINDOW);
        // Oldest 50 samples were evicted.
        assert_eq!(*state.response_times.front().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_fresh_tracker_is_not_stale() {
        let health = StrategyHealth::new();
        let snap = health.snapshot().await;
        assert!(!snap.stale);
        assert!(snap.available);
    }
}

//! Per-identity token-bucket rate limiting.
//!
//! Buckets are keyed `tenant:user:operation`. Each key's window is its
//! own critical section; there is no cross-key coordination.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// One identity's request window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
        }
    }
}

/// Windowed request counter per identity key.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateLimitWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Account for one request under `key`. Returns whether it is
    /// allowed. A request landing exactly at the limit is accepted;
    /// only counts beyond it are denied.
    pub async fn check(&self, key: &str) -> bool {
        let now = Utc::now();
        let window_len = Duration::milliseconds(self.config.window_ms as i64);
        let mut windows = self.windows.lock().await;

        match windows.get_mut(key) {
            Some(window) if now <= window.reset_time => {
                window.count += 1;
                window.count <= self.config.max_requests
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    RateLimitWindow {
                        count: 1,
                        reset_time: now + window_len,
                    },
                );
                self.config.max_requests >= 1
            }
        }
    }

    /// Snapshot of a key's window.
    pub async fn window_state(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.lock().await.get(key).cloned()
    }

    /// Drop windows whose reset time has passed.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now <= w.reset_time);
    }

    /// Reset all state.
    pub async fn clear(&self) {
        self.windows.lock().await.clear();
    }
}

/// The canonical bucket key for an identity and operation.
pub fn bucket_key(tenant_id: &str, user_id: &str, operation: &str) -> String {
    format!("{tenant_id}:{user_id}:{operation}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_ms,
            max_requests,
        })
    }

    #[tokio::test]
    async fn test_allows_up_to_max_then_denies() {
        let limiter = limiter(2, 60_000);
        let key = bucket_key("acme", "alice", "verify");

        assert!(limiter.check(&key).await);
        assert!(limiter.check(&key).await);
        assert!(!limiter.check(&key).await);

        let window = limiter.window_state(&key).await.unwrap();
        assert_eq!(window.count, 3);
    }

    #[tokio::test]
    async fn test_window_roll_allows_again() {
        let limiter = limiter(2, 60_000);
        let key = bucket_key("acme", "alice", "verify");

        assert!(limiter.check(&key).await);
        assert!(limiter.check(&key).await);
        assert!(!limiter.check(&key).await);

        // Expire the window as if rateLimitWindowMs had passed.
        {
            let mut windows = limiter.windows.lock().await;
            windows.get_mut(&key).unwrap().reset_time = Utc::now() - Duration::seconds(1);
        }

        assert!(limiter.check(&key).await);
        let window = limiter.window_state(&key).await.unwrap();
        assert_eq!(window.count, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, 60_000);

        assert!(limiter.check(&bucket_key("acme", "alice", "verify")).await);
        assert!(!limiter.check(&bucket_key("acme", "alice", "verify")).await);
        // A different operation has its own bucket.
        assert!(limiter.check(&bucket_key("acme", "alice", "query")).await);
        // So does a different user.
        assert!(limiter.check(&bucket_key("acme", "bob", "verify")).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_windows() {
        let limiter = limiter(5, 60_000);
        limiter.check("a").await;
        limiter.check("b").await;

        {
            let mut windows = limiter.windows.lock().await;
            windows.get_mut("a").unwrap().reset_time = Utc::now() - Duration::seconds(1);
        }

        limiter.cleanup().await;
        assert!(limiter.window_state("a").await.is_none());
        assert!(limiter.window_state("b").await.is_some());
    }
}

//! Health, metrics, and alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Component liveness band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Severity rank; higher is worse.
    fn rank(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
        }
    }

    /// The worse of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// One probe's report for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub message: String,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HealthCheck {
    pub fn new(
        component: impl Into<String>,
        status: HealthStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            status,
            message: message.into(),
            last_checked: Utc::now(),
            response_time_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Point-in-time system metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
    pub error_rate_percent: f64,
    pub avg_response_time_ms: f64,
    pub throughput_rpm: f64,
    pub active_alerts: usize,
    pub collected_at: Option<DateTime<Utc>>,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold crossing or component failure.
///
/// Alerts are created, optionally resolved, and never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub component: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved: bool,
}

impl HealthAlert {
    pub fn new(
        severity: AlertSeverity,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            component: component.into(),
            message: message.into(),
            created_at: Utc::now(),
            resolved_at: None,
            resolved: false,
        }
    }
}

/// Metric thresholds that raise alerts when crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
    pub error_rate_percent: f64,
    pub response_time_ms: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            memory_usage_percent: 90.0,
            cpu_usage_percent: 90.0,
            error_rate_percent: 10.0,
            response_time_ms: 5_000.0,
        }
    }
}

/// Events the monitor emits for external subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HealthEvent {
    HealthChecksCompleted {
        overall: HealthStatus,
        components: usize,
    },
    AlertCreated {
        alert: HealthAlert,
    },
    AlertResolved {
        alert_id: String,
    },
    MetricsCollected {
        metrics: SystemMetrics,
    },
}

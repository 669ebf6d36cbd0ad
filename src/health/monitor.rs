//! The health monitor: periodic probes, threshold alerts, and events.
//!
//! The monitor observes components through injected probes; it never
//! holds a component itself, so dropping the monitor (or the component)
//! is always safe. Two tickers drive it: one for health checks, one for
//! metrics collection. All output flows through the event channel; the
//! monitor performs no I/O of its own.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::types::{
    AlertSeverity, AlertThresholds, HealthAlert, HealthCheck, HealthEvent, HealthStatus,
    SystemMetrics,
};

/// A probe the monitor fans out to on each check tick.
///
/// Probes are thin adapters over a component's public status calls, so
/// the monitor's references never prevent component teardown.
#[async_trait]
pub trait ComponentProbe: Send + Sync {
    /// Component name reported in checks and alerts.
    fn name(&self) -> &str;

    /// Produce a health check for the component.
    async fn check(&self) -> HealthCheck;
}

/// Source of point-in-time system metrics.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn collect(&self) -> SystemMetrics;
}

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval_ms: u64,
    pub metrics_interval_ms: u64,
    pub thresholds: AlertThresholds,
    pub max_alerts: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            metrics_interval_ms: 60_000,
            thresholds: AlertThresholds::default(),
            max_alerts: 1_000,
        }
    }
}

struct MonitorState {
    checks: HashMap<String, HealthCheck>,
    alerts: Vec<HealthAlert>,
    latest_metrics: SystemMetrics,
}

/// Aggregates liveness signals across the platform.
pub struct HealthMonitor {
    config: MonitorConfig,
    probes: RwLock<Vec<Arc<dyn ComponentProbe>>>,
    metrics_source: RwLock<Option<Arc<dyn MetricsSource>>>,
    state: Arc<RwLock<MonitorState>>,
    events: broadcast::Sender<HealthEvent>,
    tickers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            probes: RwLock::new(Vec::new()),
            metrics_source: RwLock::new(None),
            state: Arc::new(RwLock::new(MonitorState {
                checks: HashMap::new(),
                alerts: Vec::new(),
                latest_metrics: SystemMetrics::default(),
            })),
            events,
            tickers: Mutex::new(Vec::new()),
        })
    }

    /// Register a component probe.
    pub async fn register_probe(&self, probe: Arc<dyn ComponentProbe>) {
        self.probes.write().await.push(probe);
    }

    /// Set the metrics source.
    pub async fn set_metrics_source(&self, source: Arc<dyn MetricsSource>) {
        *self.metrics_source.write().await = Some(source);
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Start both tickers. Idempotent: calling twice does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut tickers = self.tickers.lock().await;
        if !tickers.is_empty() {
            return;
        }

        let monitor = Arc::clone(self);
        let check_interval = self.config.check_interval_ms.max(1);
        tickers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(check_interval));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.run_checks().await;
            }
        }));

        let monitor = Arc::clone(self);
        let metrics_interval = self.config.metrics_interval_ms.max(1);
        tickers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(metrics_interval));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.collect_metrics().await;
            }
        }));

        info!("health monitor started");
    }

    /// Stop the tickers. State and alerts stay readable.
    pub async fn stop(&self) {
        let mut tickers = self.tickers.lock().await;
        for handle in tickers.drain(..) {
            handle.abort();
        }
        info!("health monitor stopped");
    }

    /// Fan out to every probe and synthesize the overall status.
    pub async fn run_checks(&self) -> HealthStatus {
        let probes = self.probes.read().await.clone();
        let checks = join_all(probes.iter().map(|p| p.check())).await;

        let mut overall = HealthStatus::Healthy;
        let mut state = self.state.write().await;
        for check in checks {
            overall = overall.worst(check.status);
            if check.status != HealthStatus::Healthy {
                debug!(component = %check.component, status = %check.status, "component not healthy");
            }
            state.checks.insert(check.component.clone(), check);
        }
        let components = state.checks.len();

        // Unhealthy components raise alerts through the same path as
        // threshold crossings.
        let failing: Vec<(String, String)> = state
            .checks
            .values()
            .filter(|c| c.status == HealthStatus::Unhealthy)
            .map(|c| (c.component.clone(), c.message.clone()))
            .collect();
        for (component, message) in failing {
            Self::push_alert(
                &mut state,
                &self.events,
                self.config.max_alerts,
                HealthAlert::new(AlertSeverity::Critical, component, message),
            );
        }
        drop(state);

        let _ = self.events.send(HealthEvent::HealthChecksCompleted {
            overall,
            components,
        });
        overall
    }

    /// Pull metrics from the source and evaluate thresholds.
    pub async fn collect_metrics(&self) -> SystemMetrics {
        let source = self.metrics_source.read().await.clone();
        let mut metrics = match source {
            Some(source) => source.collect().await,
            None => SystemMetrics::default(),
        };
        metrics.collected_at = Some(Utc::now());

        let thresholds = &self.config.thresholds;
        let mut crossings: Vec<(String, String)> = Vec::new();
        if metrics.memory_usage_percent > thresholds.memory_usage_percent {
            crossings.push((
                "memory".to_string(),
                format!(
                    "memory usage {:.1}% exceeds {:.1}%",
                    metrics.memory_usage_percent, thresholds.memory_usage_percent
                ),
            ));
        }
        if metrics.cpu_usage_percent > thresholds.cpu_usage_percent {
            crossings.push((
                "cpu".to_string(),
                format!(
                    "cpu usage {:.1}% exceeds {:.1}%",
                    metrics.cpu_usage_percent, thresholds.cpu_usage_percent
                ),
            ));
        }
        if metrics.error_rate_percent > thresholds.error_rate_percent {
            crossings.push((
                "error-rate".to_string(),
                format!(
                    "error rate {:.1}% exceeds {:.1}%",
                    metrics.error_rate_percent, thresholds.error_rate_percent
                ),
            ));
        }
        if metrics.avg_response_time_ms > thresholds.response_time_ms {
            crossings.push((
                "response-time".to_string(),
                format!(
                    "avg response {:.0}ms exceeds {:.0}ms",
                    metrics.avg_response_time_ms, thresholds.response_time_ms
                ),
            ));
        }

        let mut state = self.state.write().await;
        for (component, message) in crossings {
            warn!(component = %component, %message, "threshold crossed");
            Self::push_alert(
                &mut state,
                &self.events,
                self.config.max_alerts,
                HealthAlert::new(AlertSeverity::Warning, component, message),
            );
        }
        metrics.active_alerts = state.alerts.iter().filter(|a| !a.resolved).count();
        state.latest_metrics = metrics.clone();
        drop(state);

        let _ = self.events.send(HealthEvent::MetricsCollected {
            metrics: metrics.clone(),
        });
        metrics
    }

    fn push_alert(
        state: &mut MonitorState,
        events: &broadcast::Sender<HealthEvent>,
        max_alerts: usize,
        alert: HealthAlert,
    ) {
        // One open alert per component at a time.
        let duplicate = state
            .alerts
            .iter()
            .any(|a| !a.resolved && a.component == alert.component);
        if duplicate {
            return;
        }

        state.alerts.push(alert.clone());
        // Bounded: resolved alerts age out first, then the oldest.
        while state.alerts.len() > max_alerts {
            if let Some(pos) = state.alerts.iter().position(|a| a.resolved) {
                state.alerts.remove(pos);
            } else {
                state.alerts.remove(0);
            }
        }
        let _ = events.send(HealthEvent::AlertCreated { alert });
    }

    /// Create an alert directly (used by external subscribers such as
    /// the security violation channel).
    pub async fn raise_alert(
        &self,
        severity: AlertSeverity,
        component: impl Into<String>,
        message: impl Into<String>,
    ) {
        let mut state = self.state.write().await;
        Self::push_alert(
            &mut state,
            &self.events,
            self.config.max_alerts,
            HealthAlert::new(severity, component, message),
        );
    }

    /// Bridge the security envelope's violation channel into alerts.
    ///
    /// The spawned task holds only the monitor and the receiver, so it
    /// never keeps the envelope alive. Abort the returned handle to
    /// stop watching.
    pub fn watch_security_violations(
        self: &Arc<Self>,
        mut violations: broadcast::Receiver<crate::security::AuditEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = violations.recv().await {
                monitor
                    .raise_alert(
                        AlertSeverity::Warning,
                        "security",
                        format!(
                            "security violation by {}:{} on {}",
                            event.tenant_id, event.user_id, event.resource_id
                        ),
                    )
                    .await;
            }
        })
    }

    /// Resolve an alert by id. Returns whether it was found open.
    pub async fn resolve_alert(&self, alert_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(alert) = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && !a.resolved)
        else {
            return false;
        };
        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        drop(state);

        let _ = self.events.send(HealthEvent::AlertResolved {
            alert_id: alert_id.to_string(),
        });
        true
    }

    /// Current alerts, open and resolved.
    pub async fn alerts(&self) -> Vec<HealthAlert> {
        self.state.read().await.alerts.clone()
    }

    /// Latest per-component checks.
    pub async fn checks(&self) -> Vec<HealthCheck> {
        self.state.read().await.checks.values().cloned().collect()
    }

    /// Latest collected metrics.
    pub async fn latest_metrics(&self) -> SystemMetrics {
        self.state.read().await.latest_metrics.clone()
    }

    /// Worst status across the latest checks.
    pub async fn overall_status(&self) -> HealthStatus {
        let state = self.state.read().await;
        state
            .checks
            .values()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        name: String,
        status: HealthStatus,
    }

    #[async_trait]
    impl ComponentProbe for FixedProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self) -> HealthCheck {
            HealthCheck::new(self.name.clone(), self.status, "probe")
                .with_response_time(3)
        }
    }

    struct FixedMetrics(SystemMetrics);

    #[async_trait]
    impl MetricsSource for FixedMetrics {
        async fn collect(&self) -> SystemMetrics {
            self.0.clone()
        }
    }

    async fn monitor_with(statuses: Vec<(&str, HealthStatus)>) -> Arc<HealthMonitor> {
        let monitor = HealthMonitor::new(MonitorConfig::default());
        for (name, status) in statuses {
            monitor
                .register_probe(Arc::new(FixedProbe {
                    name: name.to_string(),
                    status,
                }))
                .await;
        }
        monitor
    }

    #[tokio::test]
    async fn test_overall_is_worst_component() {
        let monitor = monitor_with(vec![
            ("database", HealthStatus::Healthy),
            ("navigator", HealthStatus::Degraded),
            ("queue", HealthStatus::Healthy),
        ])
        .await;

        let overall = monitor.run_checks().await;
        assert_eq!(overall, HealthStatus::Degraded);
        assert_eq!(monitor.overall_status().await, HealthStatus::Degraded);
        assert_eq!(monitor.checks().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unhealthy_component_raises_alert() {
        let monitor = monitor_with(vec![("database", HealthStatus::Unhealthy)]).await;
        let mut events = monitor.subscribe();

        let overall = monitor.run_checks().await;
        assert_eq!(overall, HealthStatus::Unhealthy);

        let alerts = monitor.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);

        // Events arrive in creation order: alert first, then the
        // checks-completed summary.
        let first = events.recv().await.unwrap();
        assert!(matches!(first, HealthEvent::AlertCreated { .. }));
    }

    #[tokio::test]
    async fn test_no_duplicate_open_alerts_per_component() {
        let monitor = monitor_with(vec![("database", HealthStatus::Unhealthy)]).await;

        monitor.run_checks().await;
        monitor.run_checks().await;

        assert_eq!(monitor.alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_metric_thresholds_raise_alerts() {
        let monitor = HealthMonitor::new(MonitorConfig::default());
        monitor
            .set_metrics_source(Arc::new(FixedMetrics(SystemMetrics {
                memory_usage_percent: 95.0,
                cpu_usage_percent: 10.0,
                error_rate_percent: 50.0,
                avg_response_time_ms: 100.0,
                ..SystemMetrics::default()
            })))
            .await;

        let metrics = monitor.collect_metrics().await;
        assert_eq!(metrics.active_alerts, 2);

        let alerts = monitor.alerts().await;
        let components: Vec<&str> = alerts.iter().map(|a| a.component.as_str()).collect();
        assert!(components.contains(&"memory"));
        assert!(components.contains(&"error-rate"));
        assert!(!components.contains(&"cpu"));
    }

    #[tokio::test]
    async fn test_resolve_alert_emits_event() {
        let monitor = HealthMonitor::new(MonitorConfig::default());
        monitor
            .raise_alert(AlertSeverity::Warning, "security", "violation burst")
            .await;

        let alert_id = monitor.alerts().await[0].id.clone();
        let mut events = monitor.subscribe();

        assert!(monitor.resolve_alert(&alert_id).await);
        // A second resolve is a no-op.
        assert!(!monitor.resolve_alert(&alert_id).await);

        let alerts = monitor.alerts().await;
        assert!(alerts[0].resolved);
        assert!(alerts[0].resolved_at.is_some());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::AlertResolved { .. }));
    }

    #[tokio::test]
    async fn test_alert_list_is_bounded() {
        let config = MonitorConfig {
            max_alerts: 3,
            ..MonitorConfig::default()
        };
        let monitor = HealthMonitor::new(config);

        for i in 0..5 {
            monitor
                .raise_alert(AlertSeverity::Warning, format!("component-{i}"), "x")
                .await;
        }

        assert_eq!(monitor.alerts().await.len(), 3);
    }

    #[tokio::test]
    async fn test_security_violations_become_alerts() {
        use crate::security::{AuditQuery, SecurityEnvelope};

        let envelope = SecurityEnvelope::default();
        let monitor = HealthMonitor::new(MonitorConfig::default());
        let mut events = monitor.subscribe();
        let watcher =
            monitor.watch_security_violations(envelope.audit_log().subscribe_violations());

        let context = envelope.authenticate("A:alice:admin").await.unwrap();
        let _ = envelope
            .authorize(&context, "read", "agent", "B:agent-42", None)
            .await;

        // The violation was audited and relayed as an alert.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::AlertCreated { .. }));
        assert_eq!(monitor.alerts().await[0].component, "security");
        assert_eq!(
            envelope
                .audit_log()
                .query(&AuditQuery::default())
                .await
                .len(),
            1
        );

        watcher.abort();
    }

    #[tokio::test]
    async fn test_start_and_stop_tickers() {
        let config = MonitorConfig {
            check_interval_ms: 10,
            metrics_interval_ms: 10,
            ..MonitorConfig::default()
        };
        let monitor = HealthMonitor::new(config);
        monitor.start().await;
        monitor.start().await; // idempotent

        assert_eq!(monitor.tickers.lock().await.len(), 2);
        monitor.stop().await;
        assert!(monitor.tickers.lock().await.is_empty());
    }
}

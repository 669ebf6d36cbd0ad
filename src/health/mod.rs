//! Health and metrics plane.
//!
//! Collects per-component liveness, synthesizes an overall state, and
//! raises bounded, explicitly-resolved alerts. Subscribers consume the
//! monitor's broadcast events; the monitor itself performs no I/O.

pub mod monitor;
pub mod types;

pub use monitor::{ComponentProbe, HealthMonitor, MetricsSource, MonitorConfig};
pub use types::{
    AlertSeverity, AlertThresholds, HealthAlert, HealthCheck, HealthEvent, HealthStatus,
    SystemMetrics,
};

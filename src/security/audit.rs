//! Bounded, append-only audit log.
//!
//! Every security decision lands here. The log front-truncates at its
//! size cap, sweeps by retention age, and mirrors security violations
//! onto a broadcast channel so the health plane can alert on them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::context::SecurityContext;

/// What kind of event is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AuthenticationFailure,
    AuthorizationFailure,
    SecurityViolation,
    Create,
    Read,
    Update,
    Delete,
    Query,
}

impl AuditEventType {
    /// Map an action verb to its data-access event type.
    pub fn from_action(action: &str) -> Self {
        match action {
            "create" | "write" | "submit" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "query" | "list" => Self::Query,
            _ => Self::Read,
        }
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub tenant_id: String,
    pub user_id: String,
    pub session_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub result: AuditResult,
    pub error: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    /// Create an event for an authenticated actor.
    pub fn new(
        event_type: AuditEventType,
        context: &SecurityContext,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        result: AuditResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            tenant_id: context.tenant_id.clone(),
            user_id: context.user_id.clone(),
            session_id: context.session_id.clone(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            details: serde_json::Value::Null,
            result,
            error: None,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
        }
    }

    /// Create an event with no authenticated actor (failed logins).
    pub fn anonymous(
        event_type: AuditEventType,
        action: impl Into<String>,
        result: AuditResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            tenant_id: String::new(),
            user_id: String::new(),
            session_id: String::new(),
            action: action.into(),
            resource_type: String::new(),
            resource_id: String::new(),
            details: serde_json::Value::Null,
            result,
            error: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Filters for audit retrieval.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub event_type: Option<AuditEventType>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Append-only audit store with bounded size and retention sweep.
pub struct AuditLog {
    events: Arc<RwLock<VecDeque<AuditEvent>>>,
    max_events: usize,
    retention_days: i64,
    violations: broadcast::Sender<AuditEvent>,
}

impl AuditLog {
    pub fn new(max_events: usize, retention_days: i64) -> Self {
        let (violations, _) = broadcast::channel(64);
        Self {
            events: Arc::new(RwLock::new(VecDeque::new())),
            max_events: max_events.max(1),
            retention_days,
            violations,
        }
    }

    /// Append an event, truncating the oldest entries past the cap.
    /// Security violations are additionally broadcast.
    pub async fn record(&self, event: AuditEvent) {
        if event.event_type == AuditEventType::SecurityViolation {
            // Nobody listening is fine.
            let _ = self.violations.send(event.clone());
        }

        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Subscribe to security-violation events.
    pub fn subscribe_violations(&self) -> broadcast::Receiver<AuditEvent> {
        self.violations.subscribe()
    }

    /// Retrieve events, newest first.
    pub async fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                query.event_type.map_or(true, |t| e.event_type == t)
                    && query
                        .tenant_id
                        .as_deref()
                        .map_or(true, |t| e.tenant_id == t)
                    && query.user_id.as_deref().map_or(true, |u| e.user_id == u)
                    && query.since.map_or(true, |s| e.timestamp >= s)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Drop events older than the retention horizon.
    pub async fn cleanup(&self) {
        let horizon = Utc::now() - Duration::days(self.retention_days);
        let mut events = self.events.write().await;
        events.retain(|e| e.timestamp >= horizon);
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

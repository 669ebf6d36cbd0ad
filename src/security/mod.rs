//! Security envelope: authenticate, authorize, rate-limit, validate,
//! execute, audit.
//!
//! Every public entry point runs through [`SecurityEnvelope`]. Any
//! failing stage short-circuits: the failure is audited first, then the
//! typed error surfaces to the caller. Tenancy is enforced with
//! tenant-prefixed resource ids; no caller-supplied tenant ever
//! overrides the token-derived one.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub mod audit;
pub mod context;
pub mod rate_limit;
pub mod validation;

pub use audit::{AuditEvent, AuditEventType, AuditLog, AuditQuery, AuditResult};
pub use context::{
    belongs_to_tenant, parse_token, scoped_id, split_scoped_id, SecurityContext, DEFAULT_TENANT,
    DEFAULT_USER, MIN_TOKEN_LENGTH,
};
pub use rate_limit::{bucket_key, RateLimitConfig, RateLimitWindow, RateLimiter};
pub use validation::{
    sanitize_id, validate_agent_data, validate_command, validate_performance_metrics,
    validate_query, AgentData, CommandPolicy, PerformanceMetrics, QueryParams, ValidationOutcome,
};

/// Envelope configuration.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
    pub max_audit_events: usize,
    pub audit_retention_days: i64,
    pub blocked_users: Vec<String>,
    pub command_policy: CommandPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            max_audit_events: 100_000,
            audit_retention_days: 90,
            blocked_users: Vec::new(),
            command_policy: CommandPolicy::default(),
        }
    }
}

/// The pipeline wrapper around every public operation.
pub struct SecurityEnvelope {
    config: SecurityConfig,
    audit: Arc<AuditLog>,
    limiter: RateLimiter,
    blocked_users: RwLock<HashSet<String>>,
}

impl SecurityEnvelope {
    pub fn new(config: SecurityConfig) -> Self {
        let audit = Arc::new(AuditLog::new(
            config.max_audit_events,
            config.audit_retention_days,
        ));
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let blocked_users = RwLock::new(config.blocked_users.iter().cloned().collect());
        Self {
            config,
            audit,
            limiter,
            blocked_users,
        }
    }

    /// The audit log, shared so the health plane can subscribe to
    /// violation events.
    pub fn audit_log(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    /// Add a user to the blocked list.
    pub async fn block_user(&self, user_id: impl Into<String>) {
        self.blocked_users.write().await.insert(user_id.into());
    }

    /// Authenticate a bearer token into a [`SecurityContext`].
    ///
    /// A rejected token writes exactly one authentication-failure audit
    /// event and has no other side effects.
    pub async fn authenticate(&self, token: &str) -> Result<SecurityContext> {
        match parse_token(token) {
            Ok(context) => {
                debug!(tenant = %context.tenant_id, user = %context.user_id, "authenticated");
                Ok(context)
            }
            Err(err) => {
                self.audit
                    .record(
                        AuditEvent::anonymous(
                            AuditEventType::AuthenticationFailure,
                            "authenticate",
                            AuditResult::Failure,
                        )
                        .with_error(err.to_string()),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Authorize `action` on a resource.
    ///
    /// Denies blocked users, cross-tenant access (audited as a security
    /// violation), exhausted rate buckets, and missing permissions.
    pub async fn authorize(
        &self,
        context: &SecurityContext,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        resource_tenant: Option<&str>,
    ) -> Result<()> {
        if self.blocked_users.read().await.contains(&context.user_id) {
            let err = Error::unauthorized(format!("user {} is blocked", context.user_id));
            self.record_denial(context, action, resource_type, resource_id, &err)
                .await;
            return Err(err);
        }

        // The resource's tenant comes from an explicit field or the
        // `{tenant}:{raw}` id prefix.
        let foreign_tenant = resource_tenant
            .filter(|t| *t != context.tenant_id)
            .map(str::to_string)
            .or_else(|| match split_scoped_id(resource_id) {
                Some((tenant, _)) if tenant != context.tenant_id => Some(tenant.to_string()),
                _ => None,
            });

        if let Some(tenant) = foreign_tenant {
            warn!(
                context_tenant = %context.tenant_id,
                resource_tenant = %tenant,
                resource = %resource_id,
                "cross-tenant access attempt"
            );
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventType::SecurityViolation,
                        context,
                        action,
                        resource_type,
                        resource_id,
                        AuditResult::Failure,
                    )
                    .with_details(serde_json::json!({
                        "reason": "Cross-tenant access attempt",
                        "resource_tenant": tenant,
                    })),
                )
                .await;
            return Err(Error::cross_tenant(context.tenant_id.clone(), tenant));
        }

        if !self.check_rate_limit(context, action).await {
            let err = Error::rate_limit(format!(
                "identity {}:{} exceeded {} requests per window",
                context.tenant_id, context.user_id, self.config.rate_limit.max_requests
            ));
            self.record_denial(context, action, resource_type, resource_id, &err)
                .await;
            return Err(err);
        }

        let permission = format!("{resource_type}:{action}");
        if !context.has_permission(&permission) {
            let err = Error::unauthorized(format!("missing permission {permission}"));
            self.record_denial(context, action, resource_type, resource_id, &err)
                .await;
            return Err(err);
        }

        Ok(())
    }

    /// Operation-keyed token bucket for this identity.
    pub async fn check_rate_limit(&self, context: &SecurityContext, operation: &str) -> bool {
        let key = bucket_key(&context.tenant_id, &context.user_id, operation);
        self.limiter.check(&key).await
    }

    /// Validate a gated command line against the configured policy.
    pub fn validate_command(&self, command: &str) -> ValidationOutcome<String> {
        validation::validate_command(command, &self.config.command_policy)
    }

    /// Run the full pipeline around an operation.
    ///
    /// authenticate → authorize → execute → audit. The closure only
    /// runs when every guard passes; its outcome is audited either way.
    pub async fn execute_guarded<F, Fut, T>(
        &self,
        token: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce(SecurityContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let context = self.authenticate(token).await?;
        self.authorize(&context, action, resource_type, resource_id, None)
            .await?;

        let event_type = AuditEventType::from_action(action);
        match operation(context.clone()).await {
            Ok(value) => {
                self.audit
                    .record(AuditEvent::new(
                        event_type,
                        &context,
                        action,
                        resource_type,
                        resource_id,
                        AuditResult::Success,
                    ))
                    .await;
                Ok(value)
            }
            Err(err) => {
                self.audit
                    .record(
                        AuditEvent::new(
                            event_type,
                            &context,
                            action,
                            resource_type,
                            resource_id,
                            AuditResult::Failure,
                        )
                        .with_error(err.to_string()),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Persisted id for a tenant-owned resource.
    pub fn scope_resource(&self, context: &SecurityContext, raw_id: &str) -> String {
        scoped_id(&context.tenant_id, raw_id)
    }

    /// Sweep audit events past retention and expired rate windows.
    pub async fn cleanup(&self) {
        self.audit.cleanup().await;
        self.limiter.cleanup().await;
    }

    async fn record_denial(
        &self,
        context: &SecurityContext,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        err: &Error,
    ) {
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::AuthorizationFailure,
                    context,
                    action,
                    resource_type,
                    resource_id,
                    AuditResult::Failure,
                )
                .with_error(err.to_string()),
            )
            .await;
    }
}

impl Default for SecurityEnvelope {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> SecurityEnvelope {
        SecurityEnvelope::default()
    }

    #[tokio::test]
    async fn test_failed_auth_writes_exactly_one_event() {
        let envelope = envelope();
        assert!(envelope.authenticate("bad").await.is_err());

        let events = envelope.audit_log().query(&AuditQuery::default()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::AuthenticationFailure);
        assert_eq!(events[0].result, AuditResult::Failure);
    }

    #[tokio::test]
    async fn test_cross_tenant_denied_with_violation_event() {
        let envelope = envelope();
        let context = envelope.authenticate("A:alice:admin").await.unwrap();

        let err = envelope
            .authorize(&context, "read", "agent", "B:agent-42", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CrossTenantAccess { .. }));

        let violations = envelope
            .audit_log()
            .query(&AuditQuery {
                event_type: Some(AuditEventType::SecurityViolation),
                ..AuditQuery::default()
            })
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].details["reason"],
            serde_json::json!("Cross-tenant access attempt")
        );
    }

    #[tokio::test]
    async fn test_same_tenant_scoped_id_allowed() {
        let envelope = envelope();
        let context = envelope.authenticate("A:alice:admin").await.unwrap();

        assert!(envelope
            .authorize(&context, "read", "agent", "A:agent-42", None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_explicit_resource_tenant_checked() {
        let envelope = envelope();
        let context = envelope.authenticate("A:alice:admin").await.unwrap();

        let err = envelope
            .authorize(&context, "read", "agent", "agent-42", Some("B"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CrossTenantAccess { .. }));
    }

    #[tokio::test]
    async fn test_blocked_user_denied() {
        let envelope = envelope();
        envelope.block_user("mallory").await;
        let context = envelope.authenticate("acme:mallory:admin").await.unwrap();

        let err = envelope
            .authorize(&context, "read", "agent", "acme:agent-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_permission_denied() {
        let envelope = envelope();
        let context = envelope.authenticate("acme:carol:viewer").await.unwrap();

        let err = envelope
            .authorize(&context, "delete", "agent", "acme:agent-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let denials = envelope
            .audit_log()
            .query(&AuditQuery {
                event_type: Some(AuditEventType::AuthorizationFailure),
                ..AuditQuery::default()
            })
            .await;
        assert_eq!(denials.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_after_max() {
        let config = SecurityConfig {
            rate_limit: RateLimitConfig {
                window_ms: 60_000,
                max_requests: 2,
            },
            ..SecurityConfig::default()
        };
        let envelope = SecurityEnvelope::new(config);
        let context = envelope.authenticate("acme:alice:admin").await.unwrap();

        assert!(envelope
            .authorize(&context, "read", "agent", "acme:a1", None)
            .await
            .is_ok());
        assert!(envelope
            .authorize(&context, "read", "agent", "acme:a2", None)
            .await
            .is_ok());
        let err = envelope
            .authorize(&context, "read", "agent", "acme:a3", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_execute_guarded_success_audited() {
        let envelope = envelope();

        let value = envelope
            .execute_guarded("acme:alice:admin", "read", "agent", "acme:agent-1", |ctx| {
                async move {
                    assert_eq!(ctx.tenant_id, "acme");
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);

        let events = envelope.audit_log().query(&AuditQuery::default()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::Read);
        assert_eq!(events[0].result, AuditResult::Success);
    }

    #[tokio::test]
    async fn test_execute_guarded_short_circuits_on_bad_token() {
        let envelope = envelope();
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = std::sync::Arc::clone(&ran);

        let result: Result<()> = envelope
            .execute_guarded("bad", "read", "agent", "agent-1", |_ctx| {
                let ran = std::sync::Arc::clone(&ran_clone);
                async move {
                    ran.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(result.is_err());
        // The operation never ran: no downstream side effects.
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_scope_resource_uses_context_tenant() {
        let envelope = envelope();
        let context = envelope.authenticate("acme:alice:admin").await.unwrap();
        assert_eq!(envelope.scope_resource(&context, "agent-7"), "acme:agent-7");
    }
}

//! Security context and token parsing.
//!
//! The default parser treats a token as colon-delimited
//! `tenant:user:role,role`. It is deliberately isolated here: a real
//! deployment substitutes its own validation behind the same
//! `authenticate` contract without touching the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Minimum acceptable token length.
pub const MIN_TOKEN_LENGTH: usize = 8;

/// Tenant assigned when the token names none.
pub const DEFAULT_TENANT: &str = "default-tenant";

/// User assigned when the token names none.
pub const DEFAULT_USER: &str = "anonymous";

/// Authenticated identity handed to every downstream operation.
///
/// Immutable once authenticated: no caller-supplied value ever
/// overrides the token-derived tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub tenant_id: String,
    pub user_id: String,
    pub session_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityContext {
    /// Attach the caller's IP address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Attach the caller's User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Whether this context can perform `permission`
    /// (`resource:action`). `*` and `resource:*` wildcards apply.
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.permissions.iter().any(|p| p == "*" || p == permission) {
            return true;
        }
        match permission.split_once(':') {
            Some((resource, _)) => {
                let wildcard = format!("{resource}:*");
                self.permissions.iter().any(|p| *p == wildcard)
            }
            None => false,
        }
    }
}

/// Permissions granted to a role.
fn permissions_for_role(role: &str) -> Vec<String> {
    match role {
        "admin" => vec!["*".to_string()],
        "agent" => vec![
            "agent:read".to_string(),
            "agent:write".to_string(),
            "verification:submit".to_string(),
            "verification:read".to_string(),
            "metrics:write".to_string(),
        ],
        // Viewers and unknown roles read, nothing more.
        _ => vec![
            "agent:read".to_string(),
            "verification:read".to_string(),
            "metrics:read".to_string(),
        ],
    }
}

/// Parse a colon-delimited token into a context.
///
/// Empty and too-short tokens are rejected; missing fields fall back to
/// [`DEFAULT_TENANT`] / [`DEFAULT_USER`]. Each call stamps a fresh
/// session id.
pub fn parse_token(token: &str) -> Result<SecurityContext> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::invalid_token("empty token"));
    }
    if token.len() < MIN_TOKEN_LENGTH {
        return Err(Error::invalid_token("token too short"));
    }

    let mut parts = token.splitn(3, ':');
    let tenant = parts.next().unwrap_or("").trim();
    let user = parts.next().unwrap_or("").trim();
    let roles_part = parts.next().unwrap_or("").trim();

    let tenant_id = if tenant.is_empty() {
        DEFAULT_TENANT.to_string()
    } else {
        tenant.to_string()
    };
    let user_id = if user.is_empty() {
        DEFAULT_USER.to_string()
    } else {
        user.to_string()
    };

    let roles: Vec<String> = roles_part
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();

    let mut permissions: Vec<String> = Vec::new();
    if roles.is_empty() {
        permissions.extend(permissions_for_role(""));
    }
    for role in &roles {
        for permission in permissions_for_role(role) {
            if !permissions.contains(&permission) {
                permissions.push(permission);
            }
        }
    }

    Ok(SecurityContext {
        tenant_id,
        user_id,
        session_id: Uuid::new_v4().to_string(),
        roles,
        permissions,
        ip_address: None,
        user_agent: None,
        created_at: Utc::now(),
    })
}

/// Persisted form of a tenant-owned identifier: `{tenant}:{raw}`.
pub fn scoped_id(tenant_id: &str, raw_id: &str) -> String {
    format!("{tenant_id}:{raw_id}")
}

/// Split a scoped id into `(tenant, raw)`, if it carries a tenant prefix.
pub fn split_scoped_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

/// Whether a scoped id belongs to the given tenant. Unscoped ids belong
/// to nobody in particular and pass the check.
pub fn belongs_to_tenant(id: &str, tenant_id: &str) -> bool {
    match split_scoped_id(id) {
        Some((tenant, _)) => tenant == tenant_id,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_short_tokens_rejected() {
        assert!(matches!(parse_token(""), Err(Error::InvalidToken(_))));
        assert!(matches!(parse_token("abc"), Err(Error::InvalidToken(_))));
        assert!(matches!(parse_token("   "), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_full_token_parses() {
        let ctx = parse_token("acme:alice:admin,agent").unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.user_id, "alice");
        assert_eq!(ctx.roles, vec!["admin", "agent"]);
        assert!(ctx.has_permission("anything:at-all"));
        assert!(!ctx.session_id.is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let ctx = parse_token("::viewer-token").unwrap();
        assert_eq!(ctx.tenant_id, DEFAULT_TENANT);
        assert_eq!(ctx.user_id, DEFAULT_USER);
    }

    #[test]
    fn test_each_parse_stamps_new_session() {
        let a = parse_token("acme:alice:agent").unwrap();
        let b = parse_token("acme:alice:agent").unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_agent_role_permissions() {
        let ctx = parse_token("acme:bot-7:agent").unwrap();
        assert!(ctx.has_permission("verification:submit"));
        assert!(ctx.has_permission("agent:write"));
        assert!(!ctx.has_permission("agent:delete"));
    }

    #[test]
    fn test_viewer_defaults_to_reads() {
        let ctx = parse_token("acme:carol:viewer").unwrap();
        assert!(ctx.has_permission("agent:read"));
        assert!(!ctx.has_permission("agent:write"));
    }

    #[test]
    fn test_wildcard_resource_permission() {
        let mut ctx = parse_token("acme:dave:viewer").unwrap();
        ctx.permissions.push("reports:*".to_string());
        assert!(ctx.has_permission("reports:delete"));
        assert!(!ctx.has_permission("agents:delete"));
    }

    #[test]
    fn test_scoped_id_round_trip() {
        let id = scoped_id("acme", "agent-42");
        assert_eq!(id, "acme:agent-42");
        assert_eq!(split_scoped_id(&id), Some(("acme", "agent-42")));
        assert!(belongs_to_tenant(&id, "acme"));
        assert!(!belongs_to_tenant(&id, "globex"));
        assert!(belongs_to_tenant("unscoped", "acme"));
    }
}

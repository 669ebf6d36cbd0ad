//! Error types for arbiter-core.

use thiserror::Error;

/// Result type alias using arbiter-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during verification, crawling, and security checks.
#[derive(Error, Debug)]
pub enum Error {
    /// Verification request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A rate limit or concurrency gate rejected the operation
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A requested verification method is not registered or disabled
    #[error("Verification method unavailable: {method}")]
    MethodUnavailable { method: String },

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Caller lacks the permission for the attempted action
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authentication token was missing, malformed, or too short
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Authenticated tenant tried to touch another tenant's resource
    #[error("Cross-tenant access denied: context tenant {context_tenant}, resource tenant {resource_tenant}")]
    CrossTenantAccess {
        context_tenant: String,
        resource_tenant: String,
    },

    /// Input failed a validator
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// DNS resolution or connection failure for a crawl target
    #[error("Domain not found: {domain}")]
    DomainNotFound { domain: String },

    /// Non-success HTTP status from a crawl target
    #[error("HTTP error {status} fetching {url}")]
    HttpError { status: u16, url: String },

    /// Response body exceeded the configured size limit
    #[error("Content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    /// Path excluded by the target site's robots.txt
    #[error("Disallowed by robots.txt: {url}")]
    RobotsDisallow { url: String },

    /// URL scheme or content flagged as malicious
    #[error("Malicious content rejected: {0}")]
    MaliciousContent(String),

    /// A hard dependency (HTTP client, storage) is unavailable
    #[error("Dependency unavailable: {dependency}")]
    DependencyUnavailable { dependency: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a rate-limit error.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimitExceeded(message.into())
    }

    /// Create a method-unavailable error.
    pub fn method_unavailable(method: impl Into<String>) -> Self {
        Self::MethodUnavailable {
            method: method.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create an invalid-token error.
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken(message.into())
    }

    /// Create a cross-tenant access error.
    pub fn cross_tenant(
        context_tenant: impl Into<String>,
        resource_tenant: impl Into<String>,
    ) -> Self {
        Self::CrossTenantAccess {
            context_tenant: context_tenant.into(),
            resource_tenant: resource_tenant.into(),
        }
    }

    /// Create a domain-not-found error.
    pub fn domain_not_found(domain: impl Into<String>) -> Self {
        Self::DomainNotFound {
            domain: domain.into(),
        }
    }

    /// Create an HTTP status error.
    pub fn http_error(status: u16, url: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            url: url.into(),
        }
    }

    /// Create a content-too-large error.
    pub fn content_too_large(size: usize, limit: usize) -> Self {
        Self::ContentTooLarge { size, limit }
    }

    /// Create a robots-disallow error.
    pub fn robots_disallow(url: impl Into<String>) -> Self {
        Self::RobotsDisallow { url: url.into() }
    }

    /// Create a dependency-unavailable error.
    pub fn dependency_unavailable(dependency: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
        }
    }

    /// Whether this error is a security denial that must be audited
    /// before it surfaces to the caller.
    pub fn is_security_denial(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::InvalidToken(_) | Self::CrossTenantAccess { .. }
        )
    }
}

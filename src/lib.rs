//! # arbiter-core
//!
//! Core adjudication substrate for a multi-agent arbiter platform. The
//! crate accepts free-form claims produced by AI agents and adjudicates
//! them into a verdict by fanning each claim out to independent
//! verification strategies, aggregating their outcomes, and keeping the
//! whole process inside security, tenancy, and resource envelopes.
//!
//! ## Core Components
//!
//! - **Verification**: the engine, its result cache, and the outcome
//!   aggregator
//! - **Strategies**: fact checking, source credibility, cross-reference,
//!   consistency, logical, and statistical validation behind one contract
//! - **Navigator**: rate-limited, robots-aware, cycle-safe crawling and
//!   content extraction
//! - **Security**: authenticate → authorize → rate-limit → validate →
//!   audit around every public operation
//! - **Health**: periodic probes, threshold alerts, and monitor events
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_core::{VerificationEngine, VerificationRequest, StrategyKind};
//!
//! let engine = VerificationEngine::with_defaults();
//! let request = VerificationRequest::new("The Earth orbits the Sun")
//!     .with_strategies(vec![StrategyKind::FactChecking, StrategyKind::CrossReference]);
//!
//! let result = engine.verify(request).await;
//! println!("{}: {:.2}", result.verdict, result.confidence);
//! ```

pub mod error;
pub mod health;
pub mod navigator;
pub mod security;
pub mod strategies;
pub mod verification;

// Re-exports for convenience
pub use error::{Error, Result};
pub use health::{
    AlertSeverity, AlertThresholds, ComponentProbe, HealthAlert, HealthCheck, HealthEvent,
    HealthMonitor, HealthStatus, MetricsSource, MonitorConfig, SystemMetrics,
};
pub use navigator::{
    normalize_url, ContentExtractionConfig, ContentExtractor, ContentMetadata, ContentQuality,
    DomainRateLimit, DomainStatus, FetchedPage, HttpPageFetcher, LinkInfo, NavigatorStore,
    PageEdge, PageFetcher, PageNode, PageStatus, RobotsCache, StoreConfig, TraversalConfig,
    TraversalEngine, TraversalResult, TraversalStats, TraversalStrategy, WebContent, WebNavigator,
};
pub use security::{
    parse_token, scoped_id, validate_agent_data, validate_command, validate_performance_metrics,
    validate_query, AgentData, AuditEvent, AuditEventType, AuditLog, AuditQuery, AuditResult,
    CommandPolicy, PerformanceMetrics, QueryParams, RateLimitConfig, RateLimitWindow, RateLimiter,
    SecurityConfig, SecurityContext, SecurityEnvelope, ValidationOutcome,
};
pub use strategies::{
    default_strategies, ConsistencyStrategy, CrossReferenceConfig, CrossReferenceStrategy,
    FactCheckingStrategy, LogicalStrategy, SearchProvider, SearchReference,
    SourceCredibilityStrategy, StatisticalStrategy, StrategyHealth, StrategyHealthSnapshot,
    VerificationStrategy,
};
pub use verification::{
    aggregate_outcomes, EngineConfig, Fingerprint, Priority, StrategyKind, StrategyOutcome,
    Verdict, VerificationCache, VerificationEngine, VerificationRequest, VerificationResult,
};

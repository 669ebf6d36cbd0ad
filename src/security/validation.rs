//! Input validators for the security envelope.
//!
//! Every validator returns the same shape: whether the input is valid,
//! the reasons it is not, and a sanitized copy when one can be produced.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Model families accepted in agent registrations.
pub const MODEL_FAMILIES: &[&str] = &[
    "gpt",
    "claude",
    "gemini",
    "llama",
    "mistral",
    "qwen",
    "deepseek",
    "other",
];

/// Closed set of task types an agent may advertise.
pub const TASK_TYPES: &[&str] = &[
    "code-generation",
    "code-review",
    "testing",
    "documentation",
    "research",
    "verification",
    "summarization",
    "translation",
    "planning",
    "analysis",
];

/// Closed set of recognized languages.
pub const LANGUAGES: &[&str] = &[
    "rust",
    "python",
    "typescript",
    "javascript",
    "go",
    "java",
    "c",
    "cpp",
    "csharp",
    "ruby",
    "swift",
    "kotlin",
    "sql",
    "shell",
    "html",
    "css",
];

/// Closed set of recognized specializations.
pub const SPECIALIZATIONS: &[&str] = &[
    "frontend",
    "backend",
    "infrastructure",
    "security",
    "data",
    "ml",
    "embedded",
    "mobile",
    "devops",
    "qa",
];

const MAX_ID_LENGTH: usize = 255;
const MAX_NAME_LENGTH: usize = 200;
const MAX_TASK_TYPES: usize = 20;
const MAX_LANGUAGES: usize = 50;
const MAX_SPECIALIZATIONS: usize = 20;
const MAX_LATENCY_MS: u64 = 300_000;
const MAX_TOKENS_USED: u64 = 1_000_000;

/// Outcome of validating an input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome<T> {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Cleaned-up input, present when validation passed
    pub sanitized: Option<T>,
}

impl<T> ValidationOutcome<T> {
    fn ok(sanitized: T) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            sanitized: Some(sanitized),
        }
    }

    fn fail(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            sanitized: None,
        }
    }
}

/// An agent registration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    pub id: String,
    pub name: String,
    pub model_family: String,
    #[serde(default)]
    pub task_types: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
}

/// A performance report for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub agent_id: String,
    pub quality_score: f64,
    pub latency_ms: u64,
    pub tokens_used: u64,
}

/// Query constraints against the agent registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub task_type: Option<String>,
    pub language: Option<String>,
    pub max_utilization: Option<f64>,
    pub min_success_rate: Option<f64>,
    pub limit: Option<u32>,
}

static ID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("invalid regex"));

/// Strip everything outside `[A-Za-z0-9_-]`.
pub fn sanitize_id(id: &str) -> String {
    ID_CHARS.replace_all(id, "").into_owned()
}

fn check_enum_list(
    values: &[String],
    allowed: &[&str],
    cap: usize,
    field: &str,
    errors: &mut Vec<String>,
) -> Vec<String> {
    if values.len() > cap {
        errors.push(format!("{field} exceeds {cap} entries"));
    }
    let mut cleaned = Vec::new();
    for value in values.iter().take(cap) {
        let value = value.trim().to_lowercase();
        if allowed.contains(&value.as_str()) {
            if !cleaned.contains(&value) {
                cleaned.push(value);
            }
        } else {
            errors.push(format!("{field} entry \"{value}\" is not recognized"));
        }
    }
    cleaned
}

/// Validate an agent registration.
pub fn validate_agent_data(data: &AgentData) -> ValidationOutcome<AgentData> {
    let mut errors = Vec::new();

    let id = sanitize_id(&data.id);
    if id.is_empty() {
        errors.push("id must not be empty after sanitization".to_string());
    }
    if data.id.len() > MAX_ID_LENGTH {
        errors.push(format!("id exceeds {MAX_ID_LENGTH} characters"));
    }

    let name = data.name.trim().to_string();
    if name.is_empty() {
        errors.push("name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        errors.push(format!("name exceeds {MAX_NAME_LENGTH} characters"));
    }

    let model_family = data.model_family.trim().to_lowercase();
    if !MODEL_FAMILIES.contains(&model_family.as_str()) {
        errors.push(format!(
            "model_family \"{model_family}\" is not in the allowlist"
        ));
    }

    let task_types = check_enum_list(
        &data.task_types,
        TASK_TYPES,
        MAX_TASK_TYPES,
        "task_types",
        &mut errors,
    );
    let languages = check_enum_list(
        &data.languages,
        LANGUAGES,
        MAX_LANGUAGES,
        "languages",
        &mut errors,
    );
    let specializations = check_enum_list(
        &data.specializations,
        SPECIALIZATIONS,
        MAX_SPECIALIZATIONS,
        "specializations",
        &mut errors,
    );

    if !errors.is_empty() {
        return ValidationOutcome::fail(errors);
    }

    ValidationOutcome::ok(AgentData {
        id,
        name,
        model_family,
        task_types,
        languages,
        specializations,
    })
}

/// Validate a performance report.
pub fn validate_performance_metrics(
    metrics: &PerformanceMetrics,
) -> ValidationOutcome<PerformanceMetrics> {
    let mut errors = Vec::new();

    let agent_id = sanitize_id(&metrics.agent_id);
    if agent_id.is_empty() {
        errors.push("agent_id must not be empty after sanitization".to_string());
    }
    if !(0.0..=1.0).contains(&metrics.quality_score) {
        errors.push("quality_score must be within [0, 1]".to_string());
    }
    if metrics.latency_ms > MAX_LATENCY_MS {
        errors.push(format!("latency_ms exceeds {MAX_LATENCY_MS}"));
    }
    if metrics.tokens_used > MAX_TOKENS_USED {
        errors.push(format!("tokens_used exceeds {MAX_TOKENS_USED}"));
    }

    if !errors.is_empty() {
        return ValidationOutcome::fail(errors);
    }

    ValidationOutcome::ok(PerformanceMetrics {
        agent_id,
        ..metrics.clone()
    })
}

/// Validate registry query parameters.
pub fn validate_query(query: &QueryParams) -> ValidationOutcome<QueryParams> {
    let mut errors = Vec::new();

    if let Some(task_type) = &query.task_type {
        if !TASK_TYPES.contains(&task_type.to_lowercase().as_str()) {
            errors.push(format!("task_type \"{task_type}\" is not recognized"));
        }
    }
    if let Some(language) = &query.language {
        if !LANGUAGES.contains(&language.to_lowercase().as_str()) {
            errors.push(format!("language \"{language}\" is not recognized"));
        }
    }
    if let Some(max_utilization) = query.max_utilization {
        if !(0.0..=100.0).contains(&max_utilization) {
            errors.push("max_utilization must be within [0, 100]".to_string());
        }
    }
    if let Some(min_success_rate) = query.min_success_rate {
        if !(0.0..=1.0).contains(&min_success_rate) {
            errors.push("min_success_rate must be within [0, 1]".to_string());
        }
    }

    if !errors.is_empty() {
        return ValidationOutcome::fail(errors);
    }
    ValidationOutcome::ok(query.clone())
}

// --- command validation ---

/// Policy for any shell-like surface the envelope gates.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    pub allowed_commands: Vec<String>,
    pub max_command_length: usize,
    pub max_argument_length: usize,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            allowed_commands: vec![
                "status".to_string(),
                "pause".to_string(),
                "resume".to_string(),
                "flush-cache".to_string(),
            ],
            max_command_length: 512,
            max_argument_length: 128,
        }
    }
}

/// Characters that end, chain, redirect, or glob a shell command.
const FORBIDDEN_CHARS: &[char] = &[
    ';', '|', '&', '>', '<', '{', '[', '*', '?', '~', '\n', '\r', '\0',
];

static VARIABLE_EXPANSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{?[A-Za-z_]").expect("invalid regex"));

/// Validate a command line against the policy.
pub fn validate_command(command: &str, policy: &CommandPolicy) -> ValidationOutcome<String> {
    let mut errors = Vec::new();
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return ValidationOutcome::fail(vec!["command is empty".to_string()]);
    }
    if trimmed.len() > policy.max_command_length {
        errors.push(format!(
            "command exceeds {} characters",
            policy.max_command_length
        ));
    }

    let mut parts = trimmed.split_whitespace();
    let program = parts.next().unwrap_or("");
    if !policy.allowed_commands.iter().any(|c| c == program) {
        errors.push(format!("command \"{program}\" is not in the allowlist"));
    }

    for arg in parts {
        if arg.len() > policy.max_argument_length {
            errors.push(format!(
                "argument exceeds {} characters",
                policy.max_argument_length
            ));
        }
        if let Some(bad) = arg.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            errors.push(format!("argument contains forbidden character {bad:?}"));
        }
        if arg.contains("$(") || arg.contains('`') {
            errors.push("command substitution is not allowed".to_string());
        } else if VARIABLE_EXPANSION.is_match(arg) {
            errors.push("variable expansion is not allowed".to_string());
        }
    }

    if !errors.is_empty() {
        return ValidationOutcome::fail(errors);
    }
    ValidationOutcome::ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn agent() -> AgentData {
        AgentData {
            id: "agent-42".to_string(),
            name: "Claims checker".to_string(),
            model_family: "claude".to_string(),
            task_types: vec!["verification".to_string()],
            languages: vec!["rust".to_string()],
            specializations: vec!["security".to_string()],
        }
    }

    #[test]
    fn test_valid_agent_passes() {
        let outcome = validate_agent_data(&agent());
        assert!(outcome.valid);
        assert_eq!(outcome.sanitized.unwrap().id, "agent-42");
    }

    #[test]
    fn test_id_is_sanitized() {
        let mut data = agent();
        data.id = "agent 42/../etc".to_string();
        let outcome = validate_agent_data(&data);
        assert!(outcome.valid);
        assert_eq!(outcome.sanitized.unwrap().id, "agent42etc");
    }

    #[test]
    fn test_hostile_id_rejected_when_nothing_remains() {
        let mut data = agent();
        data.id = ";;;///".to_string();
        let outcome = validate_agent_data(&data);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_unknown_model_family_rejected() {
        let mut data = agent();
        data.model_family = "skynet".to_string();
        let outcome = validate_agent_data(&data);
        assert!(!outcome.valid);
        assert!(outcome.errors[0].contains("model_family"));
    }

    #[test]
    fn test_unknown_enum_entry_rejected() {
        let mut data = agent();
        data.task_types.push("world-domination".to_string());
        let outcome = validate_agent_data(&data);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_metrics_bounds() {
        let good = PerformanceMetrics {
            agent_id: "agent-42".to_string(),
            quality_score: 0.85,
            latency_ms: 1200,
            tokens_used: 4096,
        };
        assert!(validate_performance_metrics(&good).valid);

        let bad = PerformanceMetrics {
            quality_score: 1.2,
            ..good.clone()
        };
        assert!(!validate_performance_metrics(&bad).valid);

        let bad = PerformanceMetrics {
            latency_ms: 300_001,
            ..good.clone()
        };
        assert!(!validate_performance_metrics(&bad).valid);

        let bad = PerformanceMetrics {
            tokens_used: 1_000_001,
            ..good
        };
        assert!(!validate_performance_metrics(&bad).valid);
    }

    #[test]
    fn test_query_bounds() {
        let good = QueryParams {
            task_type: Some("verification".to_string()),
            max_utilization: Some(75.0),
            min_success_rate: Some(0.9),
            ..QueryParams::default()
        };
        assert!(validate_query(&good).valid);

        let bad = QueryParams {
            max_utilization: Some(101.0),
            ..QueryParams::default()
        };
        assert!(!validate_query(&bad).valid);
    }

    #[test]
    fn test_command_allowlist() {
        let policy = CommandPolicy::default();
        assert!(validate_command("status", &policy).valid);
        assert!(!validate_command("rm -rf /", &policy).valid);
        assert!(!validate_command("", &policy).valid);
    }

    #[test]
    fn test_command_rejects_shell_metacharacters() {
        let policy = CommandPolicy {
            allowed_commands: vec!["status".to_string()],
            ..CommandPolicy::default()
        };

        for hostile in [
            "status; reboot",
            "status | tee /etc/passwd",
            "status > out",
            "status $(whoami)",
            "status `whoami`",
            "status $HOME",
            "status ${PATH}",
            "status *",
        ] {
            let outcome = validate_command(hostile, &policy);
            assert!(!outcome.valid, "expected rejection for {hostile:?}");
        }
    }

    #[test]
    fn test_command_length_caps() {
        let policy = CommandPolicy {
            max_command_length: 16,
            ..CommandPolicy::default()
        };
        let outcome = validate_command("status with-a-very-long-tail", &policy);
        assert!(!outcome.valid);
    }
}

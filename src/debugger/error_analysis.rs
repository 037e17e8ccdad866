//! Error classification and remediation suggestions for debug sessions.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Severity assigned to an analyzed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// A previously analyzed error retained for similarity lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub error_id: String,
    pub agent_id: String,
    pub correlation_id: String,
    pub error_type: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) tokens: HashSet<String>,
}

/// Reference to a similar past error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarError {
    pub error_id: String,
    pub agent_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of analyzing one error in the context of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub error_id: String,
    pub agent_id: String,
    pub correlation_id: String,
    pub error_type: String,
    pub severity: ErrorSeverity,
    pub message: String,
    pub similar_errors: Vec<SimilarError>,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Compiled message classifiers. Built once at debugger construction so the
/// hot path never recompiles regexes.
pub(crate) struct ErrorClassifier {
    critical: Regex,
    high: Regex,
    medium: Regex,
    typed_error: Regex,
    timeout: Regex,
    word: Regex,
    connection: Regex,
    validation: Regex,
    resource: Regex,
    auth: Regex,
}

impl ErrorClassifier {
    pub(crate) fn new() -> Self {
        // Static literals, verified by the classifier tests.
        let build = |pattern: &str| Regex::new(pattern).expect("static classifier pattern");
        Self {
            critical: build(
                r"(?i)(panic|fatal|segfault|out of memory|stack overflow|corrupt|deadlock)",
            ),
            high: build(
                r"(?i)(timeout|timed out|connection (refused|reset|closed)|unavailable|unauthorized|permission denied|disk full)",
            ),
            medium: build(
                r"(?i)(invalid|validation|malformed|parse error|missing (field|key)|not found|unexpected (value|type))",
            ),
            typed_error: build(r"\b([A-Z][A-Za-z]*Error)\b"),
            timeout: build(r"(?i)(timeout|timed out)"),
            word: build(r"[a-z0-9_]{3,}"),
            connection: build(r"(?i)(connection|network|refused|reset|dns|unreachable|socket)"),
            validation: build(r"(?i)(validation|invalid|malformed|schema|missing (field|key))"),
            resource: build(r"(?i)(memory|resource|exhausted|quota|limit|capacity|disk)"),
            auth: build(r"(?i)(auth|unauthorized|forbidden|permission|credential|token)"),
        }
    }

    /// Cascading severity classification: critical patterns win, then high,
    /// then medium-by-type, then the low default.
    pub(crate) fn severity(&self, message: &str, error_type: &str) -> ErrorSeverity {
        if self.critical.is_match(message) {
            ErrorSeverity::Critical
        } else if self.high.is_match(message) {
            ErrorSeverity::High
        } else if self.medium.is_match(message)
            || matches!(
                error_type,
                "ValidationError" | "ParseError" | "ConfigurationError" | "SerializationError"
            )
        {
            ErrorSeverity::Medium
        } else {
            ErrorSeverity::Low
        }
    }

    /// Derive an error type: an explicit `SomethingError` token in the
    /// message wins, otherwise a keyword class, otherwise `UnknownError`.
    pub(crate) fn error_type(&self, message: &str) -> String {
        if let Some(captures) = self.typed_error.captures(message) {
            if let Some(m) = captures.get(1) {
                return m.as_str().to_string();
            }
        }
        if self.connection.is_match(message) {
            "ConnectionError".to_string()
        } else if self.auth.is_match(message) {
            "AuthError".to_string()
        } else if self.validation.is_match(message) {
            "ValidationError".to_string()
        } else if self.resource.is_match(message) {
            "ResourceError".to_string()
        } else if self.timeout.is_match(message) {
            "TimeoutError".to_string()
        } else {
            "UnknownError".to_string()
        }
    }

    /// Lowercased message tokens used for similarity comparison.
    pub(crate) fn tokens(&self, message: &str) -> HashSet<String> {
        self.word
            .find_iter(&message.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Pattern-family suggestions merged with context heuristics,
    /// deduplicated, capped by the caller.
    pub(crate) fn suggestions(
        &self,
        message: &str,
        context: &HashMap<String, Value>,
        similar_count: usize,
        error_type: &str,
        large_payload_bytes: usize,
    ) -> Vec<String> {
        let mut suggestions: Vec<String> = Vec::new();
        let mut push = |s: String, out: &mut Vec<String>| {
            if !out.contains(&s) {
                out.push(s);
            }
        };

        if self.connection.is_match(message) {
            push(
                "Check network connectivity to the target agent".to_string(),
                &mut suggestions,
            );
            push(
                "Verify the agent endpoint configuration".to_string(),
                &mut suggestions,
            );
            push(
                "Add retry with backoff at the call site".to_string(),
                &mut suggestions,
            );
        }
        if self.validation.is_match(message) {
            push(
                "Validate the payload schema before dispatching".to_string(),
                &mut suggestions,
            );
            push(
                "Check for missing or renamed fields in the event data".to_string(),
                &mut suggestions,
            );
        }
        if self.resource.is_match(message) {
            push(
                "Reduce payload sizes or batch the work into smaller units".to_string(),
                &mut suggestions,
            );
            push(
                "Check resource quotas and limits for the agent".to_string(),
                &mut suggestions,
            );
        }
        if self.auth.is_match(message) {
            push(
                "Verify credentials and token expiry for the agent".to_string(),
                &mut suggestions,
            );
            push(
                "Check the agent's permission scopes".to_string(),
                &mut suggestions,
            );
        }

        // Context heuristics.
        if let Some(retries) = context.get("retry_count").and_then(Value::as_u64) {
            if retries > 2 {
                push(
                    format!("{retries} retries already attempted; investigate the root cause instead of retrying"),
                    &mut suggestions,
                );
            }
        }
        if let Some(size) = context.get("payload_size_bytes").and_then(Value::as_u64) {
            if size as usize > large_payload_bytes {
                push(
                    "Large payload involved; consider trimming or compressing it".to_string(),
                    &mut suggestions,
                );
            }
        }
        if similar_count > 0 {
            push(
                format!("{similar_count} similar {error_type} occurrences seen recently; check for a systemic cause"),
                &mut suggestions,
            );
        }
        if suggestions.is_empty() {
            push(
                "Inspect the step trace around the failure for unexpected inputs".to_string(),
                &mut suggestions,
            );
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_cascade() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.severity("thread panicked at index out of bounds", "UnknownError"),
            ErrorSeverity::Critical
        );
        assert_eq!(
            classifier.severity("request timed out after 30s", "TimeoutError"),
            ErrorSeverity::High
        );
        assert_eq!(
            classifier.severity("invalid payload: missing field `job_id`", "ValidationError"),
            ErrorSeverity::Medium
        );
        assert_eq!(
            classifier.severity("something odd happened", "UnknownError"),
            ErrorSeverity::Low
        );
    }

    #[test]
    fn medium_by_error_type_without_keyword_match() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.severity("could not decode document", "ParseError"),
            ErrorSeverity::Medium
        );
    }

    #[test]
    fn typed_error_token_wins() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.error_type("SerializationError: bad utf-8 in response"),
            "SerializationError"
        );
        assert_eq!(
            classifier.error_type("connection refused by 10.0.0.2"),
            "ConnectionError"
        );
        assert_eq!(classifier.error_type("weird failure"), "UnknownError");
    }

    #[test]
    fn suggestions_merge_and_dedup() {
        let classifier = ErrorClassifier::new();
        let mut context = HashMap::new();
        context.insert("retry_count".to_string(), json!(5));
        let suggestions = classifier.suggestions(
            "connection reset during network call",
            &context,
            2,
            "ConnectionError",
            1024 * 1024,
        );
        assert!(suggestions.len() >= 3);
        let unique: HashSet<&String> = suggestions.iter().collect();
        assert_eq!(unique.len(), suggestions.len());
        assert!(suggestions.iter().any(|s| s.contains("5 retries")));
    }
}

//! # Permanence Classification
//!
//! Decides whether a task failure is worth retrying. A failure is permanent
//! when its [`TaskError`] variant says so, or when its message matches one of
//! the classifier's patterns. Typed-permanent errors are never downgraded.

use crate::error::{ErrorCategory, TaskError};

/// Message fragments that mark a failure permanent for any task type
pub const DEFAULT_PERMANENT_PATTERNS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "not found",
    "invalid parameter",
];

/// Classifies failures as permanent or transient
pub trait PermanenceClassifier: Send + Sync {
    fn is_permanent(&self, error: &TaskError) -> bool;

    fn categorize(&self, error: &TaskError) -> ErrorCategory {
        if self.is_permanent(error) {
            ErrorCategory::Permanent
        } else {
            ErrorCategory::Transient
        }
    }
}

/// Variant category plus case-insensitive message matching
#[derive(Debug, Clone)]
pub struct MessagePatternClassifier {
    patterns: Vec<String>,
}

impl Default for MessagePatternClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagePatternClassifier {
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_PERMANENT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Add patterns on top of the defaults
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns
            .extend(patterns.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl PermanenceClassifier for MessagePatternClassifier {
    fn is_permanent(&self, error: &TaskError) -> bool {
        if error.is_permanent() {
            return true;
        }
        let message = error.to_string().to_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_permanent_errors() {
        let classifier = MessagePatternClassifier::new();
        assert!(classifier.is_permanent(&TaskError::validation("missing url")));
        assert!(classifier.is_permanent(&TaskError::no_suitable_executor("browser")));
        assert_eq!(
            classifier.categorize(&TaskError::invalid_input("bad")),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn test_message_patterns_are_case_insensitive() {
        let classifier = MessagePatternClassifier::new();
        assert!(classifier.is_permanent(&TaskError::transient("Authentication Failed for user")));
        assert!(classifier.is_permanent(&TaskError::transient("Permission denied")));
        assert!(!classifier.is_permanent(&TaskError::network("connection reset")));
        assert_eq!(
            classifier.categorize(&TaskError::timeout("navigation", 30_000)),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn test_extra_patterns() {
        let classifier = MessagePatternClassifier::new().with_patterns(["Forbidden", "404"]);
        assert!(classifier.is_permanent(&TaskError::transient("upstream said FORBIDDEN")));
        assert!(classifier.is_permanent(&TaskError::transient("got 404 from origin")));
        assert!(!classifier.is_permanent(&TaskError::transient("got 503 from origin")));
        assert_eq!(classifier.patterns().len(), DEFAULT_PERMANENT_PATTERNS.len() + 2);
    }
}

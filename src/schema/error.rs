//! Error types for schema contracts.

use std::fmt;

use serde::Serialize;

/// A single failing location in a validated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Dotted path to the offending value (`""` for the root, `items[2].name` for nested ones).
    pub path: String,
    /// Human readable description of the failure.
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A value was rejected by a schema.
///
/// Carries every failing location found in one pass, never just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", join(.issues))]
pub struct ValidationError {
    issues: Vec<Issue>,
}

impl ValidationError {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// A validation error with a single root-level issue.
    pub fn single(message: impl Into<String>) -> Self {
        Self::new(vec![Issue::new("", message)])
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    /// Re-root every issue under `prefix` (e.g. `payload` turns `username` into `payload.username`).
    pub fn prefixed(self, prefix: &str) -> Self {
        let issues = self
            .issues
            .into_iter()
            .map(|issue| Issue {
                path: if issue.path.is_empty() {
                    prefix.to_string()
                } else if issue.path.starts_with('[') {
                    format!("{prefix}{}", issue.path)
                } else {
                    format!("{prefix}.{}", issue.path)
                },
                message: issue.message,
            })
            .collect();
        Self { issues }
    }

    /// Append the issues of `other`.
    pub fn merge(mut self, other: ValidationError) -> Self {
        self.issues.extend(other.issues);
        self
    }
}

fn join(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A schema that is not well formed (found by [`super::Schema::defects`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefect {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

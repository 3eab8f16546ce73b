//! Validation issues and results

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One issue reported by a validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Tool-specific rule/diagnostic code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Name of the validator that produced the issue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            file: None,
            line: None,
            column: None,
            code: None,
            source: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Result of running one validator or a whole chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,

    #[serde(default)]
    pub issues: Vec<ValidationIssue>,

    /// Per-validator observability data (see `ValidatorChain`)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationResult {
    /// A clean pass
    pub fn ok() -> Self {
        Self {
            success: true,
            issues: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// A failure carrying the given issues
    pub fn failed(issues: Vec<ValidationIssue>) -> Self {
        Self {
            success: false,
            issues,
            metadata: HashMap::new(),
        }
    }

    /// Pass/fail plus issues (warnings can coexist with success)
    pub fn with_issues(success: bool, issues: Vec<ValidationIssue>) -> Self {
        Self {
            success,
            issues,
            metadata: HashMap::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }
}

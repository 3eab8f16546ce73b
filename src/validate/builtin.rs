//! Built-in subprocess-backed validators
//!
//! All built-ins share the same contract: run a tool against a path, map the
//! exit code to pass/fail, and translate tool output into issues. A tool
//! that cannot run at all (missing binary, timeout) yields a failed result
//! with one synthetic issue - never an error.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::chain::Validator;
use super::issue::{Severity, ValidationIssue, ValidationResult};

/// Default per-validator subprocess timeout
pub const DEFAULT_VALIDATOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Cap on output captured into a single issue message
const MAX_ISSUE_MESSAGE_CHARS: usize = 2000;

/// Generic validator running an arbitrary command with the target path
/// appended as the final argument; exit code 0 means success.
pub struct CommandValidator {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            timeout: DEFAULT_VALIDATOR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command, normalizing spawn failures and timeouts into an
    /// error message the caller turns into a synthetic issue.
    async fn run_command(&self, path: &Path) -> Result<CommandOutcome, String> {
        debug!(validator = %self.name, program = %self.program, ?path, "running validator command");

        let future = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output();

        let output = match tokio::time::timeout(self.timeout, future).await {
            Err(_) => {
                warn!(validator = %self.name, "validator timed out");
                return Err(format!("{} timed out after {:?}", self.program, self.timeout));
            }
            Ok(Err(e)) => {
                warn!(validator = %self.name, error = %e, "validator could not execute");
                return Err(format!("failed to execute {}: {}", self.program, e));
            }
            Ok(Ok(output)) => output,
        };

        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn synthetic_failure(&self, message: String) -> ValidationResult {
        ValidationResult::failed(vec![ValidationIssue::error(message).with_source(&self.name)])
    }
}

struct CommandOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl CommandOutcome {
    /// Prefer stderr, fall back to stdout, bounded for issue messages
    fn failure_text(&self) -> String {
        let text = if !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        };
        truncate(text, MAX_ISSUE_MESSAGE_CHARS)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        match self.run_command(path).await {
            Err(message) => self.synthetic_failure(message),
            Ok(outcome) if outcome.exit_code == 0 => ValidationResult::ok(),
            Ok(outcome) => {
                let message = if outcome.failure_text().is_empty() {
                    format!("{} exited with code {}", self.program, outcome.exit_code)
                } else {
                    outcome.failure_text()
                };
                self.synthetic_failure(message)
            }
        }
    }
}

/// Syntax check validator (e.g. `python3 -m py_compile <path>`)
pub struct SyntaxValidator {
    inner: CommandValidator,
}

impl SyntaxValidator {
    /// Python syntax check by default
    pub fn new() -> Self {
        Self::with_command("python3", vec!["-m".into(), "py_compile".into()])
    }

    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            inner: CommandValidator::new("syntax", program, args),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.with_timeout(timeout);
        self
    }
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for SyntaxValidator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        match self.inner.run_command(path).await {
            Err(message) => self.inner.synthetic_failure(message),
            Ok(outcome) if outcome.exit_code == 0 => ValidationResult::ok(),
            Ok(outcome) => {
                let mut issue = ValidationIssue::error(outcome.failure_text()).with_source("syntax");
                if let Some((file, line)) = parse_python_traceback_location(&outcome.stderr) {
                    issue.file = Some(file);
                    issue.line = Some(line);
                }
                ValidationResult::failed(vec![issue])
            }
        }
    }
}

/// Extract `File "x", line N` from a Python traceback
fn parse_python_traceback_location(stderr: &str) -> Option<(String, u32)> {
    for line in stderr.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("File \"") {
            let (file, rest) = rest.split_once('"')?;
            let line_no = rest.strip_prefix(", line ")?;
            let line_no: u32 = line_no
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()?;
            return Some((file.to_string(), line_no));
        }
    }
    None
}

/// Linter validator expecting JSON diagnostics on stdout
/// (`ruff check --output-format=json <path>` shape)
pub struct LintValidator {
    inner: CommandValidator,
}

impl LintValidator {
    pub fn new() -> Self {
        Self::with_command("ruff", vec!["check".into(), "--output-format=json".into()])
    }

    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            inner: CommandValidator::new("lint", program, args),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.with_timeout(timeout);
        self
    }
}

impl Default for LintValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for LintValidator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        match self.inner.run_command(path).await {
            Err(message) => self.inner.synthetic_failure(message),
            Ok(outcome) => {
                let issues = parse_lint_json(&outcome.stdout);
                match issues {
                    Some(issues) => ValidationResult::with_issues(outcome.exit_code == 0, issues),
                    None if outcome.exit_code == 0 => ValidationResult::ok(),
                    None => self.inner.synthetic_failure(outcome.failure_text()),
                }
            }
        }
    }
}

/// Parse ruff-style JSON diagnostics: an array of
/// `{code, message, filename, location: {row, column}}` objects
fn parse_lint_json(stdout: &str) -> Option<Vec<ValidationIssue>> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).ok()?;
    let entries = value.as_array()?;

    let issues = entries
        .iter()
        .map(|entry| {
            let mut issue = ValidationIssue::new(
                entry["message"].as_str().unwrap_or("lint diagnostic").to_string(),
                Severity::Error,
            )
            .with_source("lint");

            if let Some(code) = entry["code"].as_str() {
                issue.code = Some(code.to_string());
            }
            if let Some(file) = entry["filename"].as_str() {
                issue.file = Some(file.to_string());
            }
            if let Some(row) = entry["location"]["row"].as_u64() {
                issue.line = Some(row as u32);
            }
            if let Some(column) = entry["location"]["column"].as_u64() {
                issue.column = Some(column as u32);
            }
            issue
        })
        .collect();

    Some(issues)
}

/// Test-runner validator (`pytest <path> -v --tb=short` shape)
pub struct TestValidator {
    inner: CommandValidator,
}

impl TestValidator {
    pub fn new() -> Self {
        Self::with_command("pytest", vec!["-v".into(), "--tb=short".into()])
    }

    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            inner: CommandValidator::new("tests", program, args),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.with_timeout(timeout);
        self
    }
}

impl Default for TestValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for TestValidator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        match self.inner.run_command(path).await {
            Err(message) => self.inner.synthetic_failure(message),
            Ok(outcome) if outcome.exit_code == 0 => ValidationResult::ok(),
            Ok(outcome) => {
                let issues = parse_test_failures(&outcome.stdout);
                if issues.is_empty() {
                    self.inner.synthetic_failure(outcome.failure_text())
                } else {
                    ValidationResult::failed(issues)
                }
            }
        }
    }
}

/// One issue per `FAILED`/`ERROR` line in the runner's verbose output
fn parse_test_failures(stdout: &str) -> Vec<ValidationIssue> {
    stdout
        .lines()
        .filter(|line| line.starts_with("FAILED") || line.starts_with("ERROR"))
        .map(|line| ValidationIssue::error(line.trim().to_string()).with_source("tests"))
        .collect()
}

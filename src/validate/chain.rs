//! Validator trait and ordered chain

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::issue::{ValidationIssue, ValidationResult};

/// A pluggable check producing pass/fail plus structured issues
///
/// Implementations never return an error: a validator that cannot run
/// (missing binary, timeout) reports a failed [`ValidationResult`] with a
/// single synthetic issue instead.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, path: &Path) -> ValidationResult;
}

/// Ordered list of validators aggregated into one result
///
/// Validators run in registration order. With `stop_on_error` (the default)
/// the chain halts after the first failing validator; otherwise all run and
/// their issues are unioned. The aggregate's `metadata["validators"]` maps
/// each validator name to `{success, errors, warnings}`.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validator>>,
    stop_on_error: bool,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
            stop_on_error: true,
        }
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Append a validator to the chain
    pub fn register<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Append an already-shared validator
    pub fn register_arc(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run the chain against a path
    pub async fn validate(&self, path: &Path) -> ValidationResult {
        let mut success = true;
        let mut issues: Vec<ValidationIssue> = Vec::new();
        let mut per_validator = serde_json::Map::new();

        for validator in &self.validators {
            debug!(validator = validator.name(), ?path, "running validator");
            let result = validator.validate(path).await;

            per_validator.insert(
                validator.name().to_string(),
                serde_json::json!({
                    "success": result.success,
                    "errors": result.error_count(),
                    "warnings": result.warning_count(),
                }),
            );

            let failed = !result.success;
            success &= result.success;
            issues.extend(result.issues);

            if failed && self.stop_on_error {
                info!(validator = validator.name(), "validator failed, stopping chain");
                break;
            }
        }

        let mut aggregate = ValidationResult::with_issues(success, issues);
        aggregate
            .metadata
            .insert("validators".to_string(), serde_json::Value::Object(per_validator));
        aggregate
    }
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("validators", &self.validators.iter().map(|v| v.name()).collect::<Vec<_>>())
            .field("stop_on_error", &self.stop_on_error)
            .finish()
    }
}

//! Validator chain: pluggable checks producing pass/fail plus issues

mod builtin;
mod chain;
mod issue;

pub use builtin::{
    CommandValidator, DEFAULT_VALIDATOR_TIMEOUT, LintValidator, SyntaxValidator, TestValidator,
};
pub use chain::{Validator, ValidatorChain};
pub use issue::{Severity, ValidationIssue, ValidationResult};

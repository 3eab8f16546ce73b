//! Velocity metrics - counters that detect lack of progress
//!
//! The loop feeds each iteration's error count into [`VelocityMetrics`],
//! which tracks fixes vs regressions, counts consecutive no-change
//! iterations (stall), and watches the last four error counts for a
//! flip-flop pattern (oscillation). Deliberately simple counter math so the
//! convergence decision stays deterministic and testable.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::shadow::CommitHandle;
use crate::validate::ValidationResult;

/// Number of trailing error counts kept for oscillation detection
pub const ERROR_WINDOW: usize = 4;

/// Record of one Silent Loop pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopIteration {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub patch_applied: bool,
    pub validation: ValidationResult,
    pub commit: Option<CommitHandle>,
    pub error_count: usize,
    pub duration_ms: u64,
}

/// Running aggregate over a loop run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VelocityMetrics {
    /// Iterations recorded so far
    pub iterations: u32,

    /// Total error-count decreases across iterations
    pub errors_fixed: usize,

    /// Total error-count increases across iterations
    pub errors_introduced: usize,

    /// Error count as of the latest iteration
    pub total_errors: usize,

    /// Consecutive iterations with an unchanged error count
    pub stall_count: u32,

    /// Observed oscillation windows
    pub oscillation_count: u32,

    /// Bounded ring of the last [`ERROR_WINDOW`] error counts
    pub last_error_counts: VecDeque<usize>,
}

impl VelocityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one iteration's error count into the aggregate
    pub fn record_iteration(&mut self, error_count: usize) {
        self.iterations += 1;

        if let Some(&previous) = self.last_error_counts.back() {
            if error_count == previous {
                self.stall_count += 1;
            } else {
                self.stall_count = 0;
            }

            if error_count < previous {
                self.errors_fixed += previous - error_count;
            } else {
                self.errors_introduced += error_count - previous;
            }
        }

        self.total_errors = error_count;

        self.last_error_counts.push_back(error_count);
        if self.last_error_counts.len() > ERROR_WINDOW {
            self.last_error_counts.pop_front();
        }

        if self.window_oscillates() {
            self.oscillation_count += 1;
            debug!(
                oscillation_count = self.oscillation_count,
                window = ?self.last_error_counts,
                "oscillation window observed"
            );
        }
    }

    /// True when the full window's consecutive differences are all non-zero
    /// with alternating signs ([+,-,+] or [-,+,-])
    fn window_oscillates(&self) -> bool {
        if self.last_error_counts.len() < ERROR_WINDOW {
            return false;
        }

        let counts: Vec<i64> = self.last_error_counts.iter().map(|&c| c as i64).collect();
        let diffs: Vec<i64> = counts.windows(2).map(|w| w[1] - w[0]).collect();

        diffs.iter().all(|&d| d != 0) && diffs.windows(2).all(|w| (w[0] > 0) != (w[1] > 0))
    }

    /// Stalled once `threshold` consecutive no-change iterations accumulate;
    /// a zero threshold disables the check
    pub fn is_stalled(&self, threshold: u32) -> bool {
        threshold > 0 && self.stall_count >= threshold
    }

    /// Oscillating once `threshold` windows have been observed;
    /// a zero threshold disables the check
    pub fn is_oscillating(&self, threshold: u32) -> bool {
        threshold > 0 && self.oscillation_count >= threshold
    }

    /// Share of error-count movement that was forward progress;
    /// 1.0 when nothing has moved yet
    pub fn progress_ratio(&self) -> f64 {
        let total = self.errors_fixed + self.errors_introduced;
        if total == 0 {
            1.0
        } else {
            self.errors_fixed as f64 / total as f64
        }
    }
}

//! Silent Loop configuration

use serde::{Deserialize, Serialize};

/// Configuration for a Silent Loop run (loadable from YAML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum iterations before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Consecutive no-change iterations before the loop is stalled;
    /// 0 disables stall detection
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,

    /// Observed oscillation windows before the loop is oscillating;
    /// 0 disables oscillation detection
    #[serde(default = "default_oscillation_threshold")]
    pub oscillation_threshold: u32,

    /// Wall-clock budget for callers to enforce externally; the loop itself
    /// is bounded by `max_iterations`
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Commit on the shadow branch after each iteration that applied a patch
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_stall_threshold() -> u32 {
    3
}

fn default_oscillation_threshold() -> u32 {
    2
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_auto_commit() -> bool {
    true
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stall_threshold: default_stall_threshold(),
            oscillation_threshold: default_oscillation_threshold(),
            timeout_seconds: default_timeout_seconds(),
            auto_commit: default_auto_commit(),
        }
    }
}

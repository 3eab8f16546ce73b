//! SilentLoop - bounded draft -> validate -> fix -> commit iteration
//!
//! The loop applies proposed edits on a shadow branch, commits, validates,
//! and decides when to stop: success, stall, oscillation, or max
//! iterations. It never generates fixes itself - fix generation is an
//! external collaborator that supplies patches.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{EventBus, EventEmitter};
use crate::shadow::{CommitHandle, ShadowBranch, ShadowGit};
use crate::validate::{ValidationResult, ValidatorChain};

use super::config::LoopConfig;
use super::metrics::{LoopIteration, VelocityMetrics};

/// Terminal and transient states of a loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Stalled,
    Oscillating,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Stalled => write!(f, "stalled"),
            Self::Oscillating => write!(f, "oscillating"),
        }
    }
}

/// A proposed in-memory edit to the loop's target file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    /// Replace the whole content
    Set { content: String },
    /// Append text to the end
    Append { text: String },
    /// Replace every occurrence of `find`; applies nothing if absent
    Substitute { find: String, replace: String },
}

impl Patch {
    pub fn set(content: impl Into<String>) -> Self {
        Self::Set {
            content: content.into(),
        }
    }

    pub fn append(text: impl Into<String>) -> Self {
        Self::Append { text: text.into() }
    }

    pub fn substitute(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self::Substitute {
            find: find.into(),
            replace: replace.into(),
        }
    }

    /// Apply to the current content, returning the new content if it changed
    pub fn apply(&self, content: &str) -> Option<String> {
        match self {
            Self::Set { content: next } => (next != content).then(|| next.clone()),
            Self::Append { text } => Some(format!("{}{}", content, text)),
            Self::Substitute { find, replace } => {
                content.contains(find.as_str()).then(|| content.replace(find, replace))
            }
        }
    }
}

/// Terminal artifact of a Silent Loop run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub iterations: Vec<LoopIteration>,
    pub final_validation: Option<ValidationResult>,
    pub final_commit: Option<CommitHandle>,
    pub metrics: VelocityMetrics,
    pub error: Option<String>,
}

impl LoopResult {
    pub fn iteration_count(&self) -> u32 {
        self.iterations.len() as u32
    }
}

/// The Silent Loop execution engine
pub struct SilentLoop {
    exec_id: String,
    config: LoopConfig,
    shadow: Arc<ShadowGit>,
    chain: ValidatorChain,
    events: Arc<EventBus>,
}

impl SilentLoop {
    pub fn new(exec_id: impl Into<String>, config: LoopConfig, shadow: Arc<ShadowGit>, chain: ValidatorChain) -> Self {
        Self {
            exec_id: exec_id.into(),
            config,
            shadow,
            chain,
            events: Arc::new(EventBus::default()),
        }
    }

    /// Publish lifecycle events on a shared bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run until success, stall, oscillation, or max iterations
    ///
    /// `target` is relative to the shadow branch's worktree. Patches are
    /// consumed on the first iteration; later iterations validate only,
    /// unless the caller supplies more via [`SilentLoop::run_single`].
    pub async fn run(&self, branch: &ShadowBranch, target: &Path, patches: Vec<Patch>) -> LoopResult {
        info!(
            exec_id = %self.exec_id,
            branch = %branch.name,
            ?target,
            patches = patches.len(),
            max_iterations = self.config.max_iterations,
            "starting silent loop"
        );

        let emitter = self.events.emitter_for(&self.exec_id);
        emitter.loop_started(patches.len());

        let mut pending: VecDeque<Patch> = patches.into();
        let mut metrics = VelocityMetrics::new();
        let mut iterations: Vec<LoopIteration> = Vec::new();
        let mut final_commit: Option<CommitHandle> = None;

        for i in 1..=self.config.max_iterations {
            let iteration = match self.run_single(branch, target, &mut pending, i).await {
                Ok(iteration) => iteration,
                Err(e) => {
                    warn!(exec_id = %self.exec_id, iteration = i, error = %e, "loop aborted");
                    return self.finish(
                        &emitter,
                        LoopStatus::Failed,
                        iterations,
                        None,
                        final_commit,
                        metrics,
                        Some(e.to_string()),
                    );
                }
            };

            metrics.record_iteration(iteration.error_count);
            emitter.loop_iteration(i, iteration.error_count, iteration.validation.success);

            if let Some(commit) = &iteration.commit {
                final_commit = Some(commit.clone());
                emitter.shadow_commit(i, commit.sha());
            }

            let validation = iteration.validation.clone();
            let succeeded = validation.success;
            iterations.push(iteration);

            if succeeded {
                info!(exec_id = %self.exec_id, iteration = i, "silent loop converged");
                return self.finish(
                    &emitter,
                    LoopStatus::Success,
                    iterations,
                    Some(validation),
                    final_commit,
                    metrics,
                    None,
                );
            }

            if metrics.is_stalled(self.config.stall_threshold) {
                warn!(exec_id = %self.exec_id, iteration = i, "silent loop stalled");
                emitter.validation_failed("stalled", i);
                return self.finish(
                    &emitter,
                    LoopStatus::Stalled,
                    iterations,
                    Some(validation),
                    final_commit,
                    metrics,
                    None,
                );
            }

            if metrics.is_oscillating(self.config.oscillation_threshold) {
                warn!(exec_id = %self.exec_id, iteration = i, "silent loop oscillating");
                emitter.validation_failed("oscillating", i);
                return self.finish(
                    &emitter,
                    LoopStatus::Oscillating,
                    iterations,
                    Some(validation),
                    final_commit,
                    metrics,
                    None,
                );
            }
        }

        warn!(exec_id = %self.exec_id, "silent loop exhausted max iterations");
        let final_validation = iterations.last().map(|it| it.validation.clone());
        self.finish(
            &emitter,
            LoopStatus::Failed,
            iterations,
            final_validation,
            final_commit,
            metrics,
            Some(format!("max iterations ({}) reached", self.config.max_iterations)),
        )
    }

    /// Execute exactly one iteration: drain pending patches, write, commit,
    /// validate
    ///
    /// A clean worktree commit ("nothing to commit") is swallowed; any other
    /// git failure is returned and aborts the caller's run.
    pub async fn run_single(
        &self,
        branch: &ShadowBranch,
        target: &Path,
        pending: &mut VecDeque<Patch>,
        iteration: u32,
    ) -> eyre::Result<LoopIteration> {
        let start = Instant::now();
        let file = branch.path.join(target);

        let mut content = tokio::fs::read_to_string(&file).await.unwrap_or_default();
        let mut patch_applied = false;

        while let Some(patch) = pending.pop_front() {
            if let Some(next) = patch.apply(&content) {
                content = next;
                patch_applied = true;
            } else {
                debug!(exec_id = %self.exec_id, iteration, "patch applied nothing");
            }
        }

        if patch_applied {
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .wrap_err("failed to create target directory")?;
            }
            tokio::fs::write(&file, &content)
                .await
                .wrap_err_with(|| format!("failed to write {}", file.display()))?;
        }

        let mut commit = None;
        if patch_applied && self.config.auto_commit {
            match self
                .shadow
                .commit(branch, &format!("silent loop iteration {}", iteration), false)
                .await
            {
                Ok(handle) => commit = Some(handle),
                Err(e) if e.is_benign() => {
                    debug!(exec_id = %self.exec_id, iteration, "nothing to commit");
                }
                Err(e) => return Err(eyre::Report::new(e).wrap_err("commit failed")),
            }
        }

        let validation = self.chain.validate(&file).await;
        let error_count = validation.error_count();

        Ok(LoopIteration {
            iteration,
            timestamp: Utc::now(),
            patch_applied,
            validation,
            commit,
            error_count,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        emitter: &EventEmitter,
        status: LoopStatus,
        iterations: Vec<LoopIteration>,
        final_validation: Option<ValidationResult>,
        final_commit: Option<CommitHandle>,
        metrics: VelocityMetrics,
        error: Option<String>,
    ) -> LoopResult {
        emitter.loop_finished(&status.to_string(), iterations.len() as u32);
        LoopResult {
            status,
            iterations,
            final_validation,
            final_commit,
            metrics,
            error,
        }
    }
}

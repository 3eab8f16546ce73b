//! Integration of shadow branches back into a target line
//!
//! The strategy decides what the target's history looks like afterwards:
//! squash collapses all shadow commits into one, rebase replays them
//! linearly, merge records a merge commit, fast-forward requires the target
//! to be an ancestor.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::git::{CommitHandle, GitError, ShadowBranch, ShadowGit};

/// Policy for folding a shadow branch back into its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Collapse all shadow commits into a single commit on the target
    #[default]
    Squash,
    /// Replay shadow commits linearly onto the target
    Rebase,
    /// Record a merge commit (`--no-ff`)
    Merge,
    /// Advance the target pointer only; fails unless it is an ancestor
    FastForward,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Rebase => write!(f, "rebase"),
            Self::Merge => write!(f, "merge"),
            Self::FastForward => write!(f, "fast-forward"),
        }
    }
}

impl ShadowGit {
    /// Fold a shadow branch into `target` using the chosen strategy
    ///
    /// Checks out `target` in the repo root, applies the strategy, and
    /// returns the target's new HEAD. Conflicts surface as
    /// [`GitError::MergeConflict`] / [`GitError::RebaseConflict`]; a
    /// non-ancestor fast-forward as [`GitError::NotFastForward`].
    pub async fn integrate(
        &self,
        branch: &ShadowBranch,
        target: &str,
        strategy: MergeStrategy,
    ) -> Result<CommitHandle, GitError> {
        info!(branch = %branch.name, %target, %strategy, "integrating shadow branch");

        let root = self.repo_root().to_path_buf();

        let checkout = self.run_git(&["checkout", target], &root).await?;
        if !checkout.status.success() {
            return Err(GitError::CommandFailed(format!(
                "Failed to checkout {}: {}",
                target,
                String::from_utf8_lossy(&checkout.stderr)
            )));
        }

        match strategy {
            MergeStrategy::Squash => {
                let merge = self.run_git(&["merge", "--squash", &branch.name], &root).await?;
                if !merge.status.success() {
                    let msg = merge_output_text(&merge);
                    self.abort_merge(&root).await;
                    return Err(classify_merge_failure(msg));
                }
                let message = format!("Squash {} into {}", branch.name, target);
                let commit = self.run_git(&["commit", "-m", &message], &root).await?;
                if !commit.status.success() {
                    return Err(GitError::CommandFailed(String::from_utf8_lossy(&commit.stderr).to_string()));
                }
            }
            MergeStrategy::Rebase => {
                // Replay the shadow commits onto the target inside the
                // worktree, then the target can fast-forward to them.
                let rebase = self.run_git(&["rebase", target], &branch.path).await?;
                if !rebase.status.success() {
                    warn!(branch = %branch.name, "rebase failed, aborting");
                    let _ = self.run_git(&["rebase", "--abort"], &branch.path).await;
                    return Err(GitError::RebaseConflict(branch.name.clone()));
                }
                let merge = self.run_git(&["merge", "--ff-only", &branch.name], &root).await?;
                if !merge.status.success() {
                    return Err(GitError::CommandFailed(String::from_utf8_lossy(&merge.stderr).to_string()));
                }
            }
            MergeStrategy::Merge => {
                let message = format!("Merge {} into {}", branch.name, target);
                let merge = self
                    .run_git(&["merge", "--no-ff", &branch.name, "-m", &message], &root)
                    .await?;
                if !merge.status.success() {
                    let msg = merge_output_text(&merge);
                    self.abort_merge(&root).await;
                    return Err(classify_merge_failure(msg));
                }
            }
            MergeStrategy::FastForward => {
                let merge = self.run_git(&["merge", "--ff-only", &branch.name], &root).await?;
                if !merge.status.success() {
                    return Err(GitError::NotFastForward(String::from_utf8_lossy(&merge.stderr).to_string()));
                }
            }
        }

        let head = self.run_git(&["rev-parse", "HEAD"], &root).await?;
        if !head.status.success() {
            return Err(GitError::CommandFailed(String::from_utf8_lossy(&head.stderr).to_string()));
        }
        let handle = CommitHandle::new(String::from_utf8_lossy(&head.stdout).trim().to_string());

        info!(branch = %branch.name, %target, sha = %handle, "integration complete");
        Ok(handle)
    }

    async fn abort_merge(&self, root: &std::path::Path) {
        let _ = self.run_git(&["merge", "--abort"], root).await;
    }
}

fn merge_output_text(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    format!("{}{}", stdout, stderr)
}

fn classify_merge_failure(message: String) -> GitError {
    if message.contains("CONFLICT") {
        GitError::MergeConflict(message)
    } else {
        GitError::CommandFailed(message)
    }
}

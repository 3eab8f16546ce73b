//! Shadow branch management on top of git worktrees
//!
//! Every worker or loop run gets a shadow branch forked from the current
//! HEAD, checked out into its own worktree directory. That gives each unit
//! of work a private, concurrently writable workspace without ever touching
//! the caller's checked-out branch.

use std::path::{Path, PathBuf};
use std::process::Output;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for shadow git operations
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Failed to create shadow branch: {0}")]
    CreateFailed(String),

    #[error("Failed to remove shadow branch: {0}")]
    RemoveFailed(String),

    #[error("Nothing to commit on branch {0}")]
    NothingToCommit(String),

    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    #[error("Rebase conflict on branch {0}")]
    RebaseConflict(String),

    #[error("Not a fast-forward: {0}")]
    NotFastForward(String),

    #[error("Shadow branch not found: {0}")]
    NotFound(String),

    #[error("Git command failed: {0}")]
    CommandFailed(String),
}

impl GitError {
    /// "Nothing to commit" is expected and benign; callers swallow it
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NothingToCommit(_))
    }
}

/// Configuration for the shadow git layer
#[derive(Debug, Clone)]
pub struct ShadowGitConfig {
    /// Path to the main repository
    pub repo_root: PathBuf,

    /// Base directory where shadow worktrees are checked out
    pub shadow_dir: PathBuf,

    /// Branch prefix for shadow branches
    pub branch_prefix: String,
}

impl Default for ShadowGitConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            shadow_dir: std::env::temp_dir().join("taskfleet").join("shadows"),
            branch_prefix: "shadow".to_string(),
        }
    }
}

impl ShadowGitConfig {
    /// Create config with the given repo root
    pub fn with_repo(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Default::default()
        }
    }
}

/// An isolated line of history with its own worktree checkout
///
/// Owned exclusively by its creator until integrated or discarded.
#[derive(Debug, Clone)]
pub struct ShadowBranch {
    /// Full branch name (including prefix)
    pub name: String,

    /// Private worktree directory for this branch
    pub path: PathBuf,
}

/// Reference to a commit on a shadow branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHandle(String);

impl CommitHandle {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    /// Full commit SHA
    pub fn sha(&self) -> &str {
        &self.0
    }

    /// Abbreviated SHA for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for CommitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Shadow branch manager over a single repository
pub struct ShadowGit {
    config: ShadowGitConfig,
}

impl ShadowGit {
    pub fn new(config: ShadowGitConfig) -> Self {
        debug!(?config, "ShadowGit::new");
        Self { config }
    }

    pub fn config(&self) -> &ShadowGitConfig {
        &self.config
    }

    pub fn repo_root(&self) -> &Path {
        &self.config.repo_root
    }

    /// Run a git command in the given directory
    pub(crate) async fn run_git(&self, args: &[&str], dir: &Path) -> Result<Output, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| GitError::CommandFailed(e.to_string()))?;
        Ok(output)
    }

    /// Fork an isolated shadow branch from the repository's current HEAD
    ///
    /// The branch is checked out into its own worktree under `shadow_dir`,
    /// leaving the repository's working branch untouched.
    pub async fn create_shadow_branch(&self, name: &str) -> Result<ShadowBranch, GitError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.shadow_dir).await {
            return Err(GitError::CreateFailed(format!("Failed to create shadow dir: {}", e)));
        }

        let path = self.config.shadow_dir.join(name);
        let branch = format!("{}/{}", self.config.branch_prefix, name);

        let path_str = path
            .to_str()
            .ok_or_else(|| GitError::CreateFailed(format!("non-utf8 worktree path: {:?}", path)))?;
        let output = self
            .run_git(&["worktree", "add", path_str, "-b", &branch, "HEAD"], &self.config.repo_root)
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CreateFailed(stderr.to_string()));
        }

        info!(%branch, ?path, "created shadow branch");

        Ok(ShadowBranch { name: branch, path })
    }

    /// Stage and commit all pending changes on a shadow branch
    ///
    /// Fails with [`GitError::NothingToCommit`] when the worktree is clean
    /// and `allow_empty` is false. Callers treat that as non-fatal: a commit
    /// is optional, not required, every iteration.
    pub async fn commit(&self, branch: &ShadowBranch, message: &str, allow_empty: bool) -> Result<CommitHandle, GitError> {
        let status = self.run_git(&["status", "--porcelain"], &branch.path).await?;

        if status.stdout.is_empty() && !allow_empty {
            debug!(branch = %branch.name, "nothing to commit");
            return Err(GitError::NothingToCommit(branch.name.clone()));
        }

        let add = self.run_git(&["add", "-A"], &branch.path).await?;
        if !add.status.success() {
            return Err(GitError::CommandFailed(String::from_utf8_lossy(&add.stderr).to_string()));
        }

        let mut args = vec!["commit", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        let commit = self.run_git(&args, &branch.path).await?;
        if !commit.status.success() {
            let stderr = String::from_utf8_lossy(&commit.stderr);
            return Err(GitError::CommandFailed(stderr.to_string()));
        }

        let head = self.head(branch).await?;
        debug!(branch = %branch.name, sha = %head, "committed");
        Ok(head)
    }

    /// Current HEAD of a shadow branch
    pub async fn head(&self, branch: &ShadowBranch) -> Result<CommitHandle, GitError> {
        let output = self.run_git(&["rev-parse", "HEAD"], &branch.path).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(CommitHandle::new(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Number of commits reachable from a ref (for tests and stats)
    pub async fn commit_count(&self, refname: &str) -> Result<usize, GitError> {
        let output = self.run_git(&["rev-list", "--count", refname], &self.config.repo_root).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| GitError::CommandFailed(format!("unparseable rev-list output: {}", e)))
    }

    /// Remove a shadow branch's worktree and delete the branch
    pub async fn discard(&self, branch: &ShadowBranch) -> Result<(), GitError> {
        if !branch.path.exists() {
            warn!(branch = %branch.name, "worktree already gone, skipping removal");
        } else {
            let path_str = branch
                .path
                .to_str()
                .ok_or_else(|| GitError::RemoveFailed(format!("non-utf8 worktree path: {:?}", branch.path)))?;
            let output = self
                .run_git(&["worktree", "remove", path_str, "--force"], &self.config.repo_root)
                .await?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.contains("is not a working tree") {
                    return Err(GitError::RemoveFailed(stderr.to_string()));
                }
            }
        }

        // Branch may already be merged away; deletion failure is not fatal
        let _ = self.run_git(&["branch", "-D", &branch.name], &self.config.repo_root).await;

        info!(branch = %branch.name, "discarded shadow branch");
        Ok(())
    }

    /// List live shadow worktrees under the shadow directory
    pub async fn list_shadows(&self) -> eyre::Result<Vec<ShadowBranch>> {
        let mut shadows = Vec::new();

        if !self.config.shadow_dir.exists() {
            return Ok(shadows);
        }

        let mut entries = tokio::fs::read_dir(&self.config.shadow_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                shadows.push(ShadowBranch {
                    name: format!("{}/{}", self.config.branch_prefix, name),
                    path,
                });
            }
        }

        Ok(shadows)
    }
}

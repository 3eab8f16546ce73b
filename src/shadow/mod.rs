//! Shadow branch isolation layer
//!
//! Worktree-backed git branches giving each worker or loop run a private,
//! mergeable workspace.

mod git;
mod merge;

pub use git::{CommitHandle, GitError, ShadowBranch, ShadowGit, ShadowGitConfig};
pub use merge::MergeStrategy;

#[cfg(test)]
pub(crate) use git::test_support;

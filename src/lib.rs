//! TaskFleet - control plane for an automated coding-agent fleet
//!
//! TaskFleet turns a batch of tickets into isolated, validated, mergeable
//! units of work. Each ticket is delegated to a worker that owns a private
//! shadow branch (a git worktree), runs a bounded draft -> validate -> fix ->
//! commit loop on it, and reports a concrete pass/fail result. Finished
//! branches are merged back under an explicit strategy.
//!
//! # Core Concepts
//!
//! - **Shadow isolation**: every worker writes on its own worktree-backed
//!   branch; the main checkout is never touched mid-flight
//! - **Concrete validation**: convergence is decided by validator exit codes
//!   and parsed issues, not by anyone's claim of being done
//! - **Bounded loops**: iteration caps plus stall and oscillation detection
//!   keep a non-converging run from burning the budget
//! - **Observable lifecycle**: every ticket, worker, and loop transition is
//!   broadcast on the event bus
//!
//! # Modules
//!
//! - [`domain`] - tickets, priorities, results
//! - [`events`] - lifecycle event bus
//! - [`shadow`] - shadow branch git layer and merge strategies
//! - [`validate`] - validator chain and built-in validators
//! - [`r#loop`] - the Silent Loop engine
//! - [`worker`] - workers and executors
//! - [`manager`] - ticket registry and delegation

pub mod domain;
pub mod events;
#[path = "loop/mod.rs"]
pub mod r#loop;
pub mod manager;
pub mod shadow;
pub mod validate;
pub mod worker;

pub use domain::{Priority, SharedTicket, Ticket, TicketResult, TicketStatus};
pub use events::{EventBus, FleetEvent};
pub use manager::{Manager, ManagerStats};
pub use r#loop::{LoopConfig, LoopResult, LoopStatus, Patch, SilentLoop};
pub use shadow::{CommitHandle, MergeStrategy, ShadowBranch, ShadowGit, ShadowGitConfig};
pub use validate::{Validator, ValidatorChain};
pub use worker::{Executor, LoopExecutor, Worker, WorkerState};

//! Workers - one unit of execution bound to one ticket
//!
//! A worker owns a private shadow branch and an injected executor that does
//! the actual work (typically a Silent Loop, or an agent driving one). The
//! worker converts executor failures into failed ticket results; nothing an
//! executor does can crash the manager.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{SharedTicket, TicketResult, TicketStatus, set_status, short_id, ticket_id};
use crate::events::{EventBus, FleetEvent};
use crate::r#loop::{LoopConfig, LoopStatus, Patch, SilentLoop};
use crate::shadow::{ShadowBranch, ShadowGit};
use crate::validate::ValidatorChain;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// The injected task function a worker runs against its shadow branch
///
/// Loop-backed executors and test stubs both implement this. Returning
/// `Err` is allowed; the worker converts it into a failed [`TicketResult`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, ticket: SharedTicket, branch: &ShadowBranch) -> eyre::Result<TicketResult>;
}

/// Executor that drives a [`SilentLoop`] over a fixed set of patches
pub struct LoopExecutor {
    shadow: Arc<ShadowGit>,
    chain: ValidatorChain,
    config: LoopConfig,
    target: PathBuf,
    patches: Vec<Patch>,
    events: Arc<EventBus>,
}

impl LoopExecutor {
    pub fn new(shadow: Arc<ShadowGit>, chain: ValidatorChain, target: impl Into<PathBuf>, patches: Vec<Patch>) -> Self {
        Self {
            shadow,
            chain,
            config: LoopConfig::default(),
            target: target.into(),
            patches,
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }
}

#[async_trait]
impl Executor for LoopExecutor {
    async fn execute(&self, ticket: SharedTicket, branch: &ShadowBranch) -> eyre::Result<TicketResult> {
        let id = ticket_id(&ticket);
        let looper = SilentLoop::new(id.clone(), self.config.clone(), self.shadow.clone(), self.chain.clone())
            .with_events(self.events.clone());

        let result = looper.run(branch, &self.target, self.patches.clone()).await;
        let iterations = result.iteration_count();

        if result.status == LoopStatus::Success {
            Ok(TicketResult::ok(
                id,
                format!("converged after {} iterations", iterations),
                0,
            ))
        } else {
            Ok(TicketResult {
                ticket_id: id,
                success: false,
                summary: format!("loop ended {} after {} iterations", result.status, iterations),
                error: result.error.or_else(|| Some(format!("loop {}", result.status))),
                duration_ms: 0,
            })
        }
    }
}

/// A single unit of execution bound to one ticket
pub struct Worker {
    id: String,
    state: WorkerState,
    executor: Arc<dyn Executor>,
    shadow: Arc<ShadowGit>,
    branch: Option<ShadowBranch>,
    events: Arc<EventBus>,
}

impl Worker {
    pub fn new(executor: Arc<dyn Executor>, shadow: Arc<ShadowGit>) -> Self {
        Self {
            id: short_id(),
            state: WorkerState::Idle,
            executor,
            shadow,
            branch: None,
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn branch(&self) -> Option<&ShadowBranch> {
        self.branch.as_ref()
    }

    /// Create this worker's private shadow branch and mark the ticket running
    ///
    /// Idempotent: a second call returns the existing branch.
    pub async fn spawn(&mut self, ticket: &SharedTicket) -> eyre::Result<ShadowBranch> {
        if let Some(branch) = &self.branch {
            return Ok(branch.clone());
        }

        let branch = self.shadow.create_shadow_branch(&format!("worker-{}", self.id)).await?;
        info!(worker_id = %self.id, branch = %branch.name, "worker spawned");

        self.events.emit(FleetEvent::WorkerSpawned {
            worker_id: self.id.clone(),
            branch: branch.name.clone(),
        });

        self.state = WorkerState::Running;
        set_status(ticket, TicketStatus::Running);
        self.branch = Some(branch.clone());
        Ok(branch)
    }

    /// Execute the ticket: spawn if needed, run the executor, report
    ///
    /// Executor errors never propagate; they become failed results and the
    /// ticket is marked failed.
    pub async fn run(&mut self, ticket: SharedTicket) -> TicketResult {
        let start = Instant::now();
        let id = ticket_id(&ticket);

        let branch = match self.spawn(&ticket).await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "failed to spawn shadow branch");
                self.state = WorkerState::Failed;
                set_status(&ticket, TicketStatus::Failed);
                return TicketResult::failed(id, e.to_string(), start.elapsed().as_millis() as u64);
            }
        };

        let result = match self.executor.execute(ticket.clone(), &branch).await {
            Ok(mut result) => {
                result.duration_ms = start.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                warn!(worker_id = %self.id, ticket_id = %id, error = %e, "executor failed");
                TicketResult::failed(id, e.to_string(), start.elapsed().as_millis() as u64)
            }
        };

        // A terminated worker no longer owns its state transitions
        if self.state != WorkerState::Terminated {
            if result.success {
                self.state = WorkerState::Completed;
                set_status(&ticket, TicketStatus::Completed);
            } else {
                self.state = WorkerState::Failed;
                set_status(&ticket, TicketStatus::Failed);
            }
        }

        debug!(worker_id = %self.id, success = result.success, "worker finished");
        result
    }

    /// Forcibly move to Terminated from any state; idempotent
    ///
    /// Does not kill an in-flight subprocess - it only tells callers to
    /// stop waiting on this worker.
    pub fn terminate(&mut self) {
        if self.state != WorkerState::Terminated {
            info!(worker_id = %self.id, "worker terminated");
            self.events.emit(FleetEvent::WorkerTerminated {
                worker_id: self.id.clone(),
            });
        }
        self.state = WorkerState::Terminated;
    }
}

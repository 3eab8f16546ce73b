//! Manager - ticket registry and delegation front-end
//!
//! The manager owns the ticket table, hands tickets to workers (one worker
//! per ticket, each on its own shadow branch), and integrates finished
//! branches back into the target branch. Delegation never panics the
//! manager: worker failures come back as failed ticket results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Priority, SharedTicket, Ticket, TicketResult, TicketStatus, set_status, shared, ticket_status};
use crate::events::{EventBus, FleetEvent};
use crate::shadow::{CommitHandle, GitError, MergeStrategy, ShadowBranch, ShadowGit};
use crate::worker::{Executor, Worker};

/// Snapshot of manager state
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub active_workers: usize,
    pub total_tickets: usize,
    pub tickets_by_status: HashMap<String, usize>,
}

/// Ticket registry and delegation front-end
pub struct Manager {
    shadow: Arc<ShadowGit>,
    events: Arc<EventBus>,
    tickets: RwLock<HashMap<String, SharedTicket>>,
    /// Insertion order of ticket ids; ties in priority scheduling resolve
    /// to this order
    order: RwLock<Vec<String>>,
    default_strategy: MergeStrategy,
    active_workers: AtomicUsize,
}

impl Manager {
    pub fn new(shadow: Arc<ShadowGit>) -> Self {
        Self {
            shadow,
            events: Arc::new(EventBus::default()),
            tickets: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            default_strategy: MergeStrategy::default(),
            active_workers: AtomicUsize::new(0),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_default_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn shadow(&self) -> &Arc<ShadowGit> {
        &self.shadow
    }

    /// Create and register a new pending ticket
    pub fn create_ticket(&self, task: impl Into<String>, priority: Priority) -> SharedTicket {
        self.submit(Ticket::new(task, priority))
    }

    /// Register a pre-built ticket
    pub fn submit(&self, ticket: Ticket) -> SharedTicket {
        let id = ticket.id.clone();
        let priority = ticket.priority;
        info!(ticket_id = %id, %priority, "ticket created");

        let ticket = shared(ticket);
        if let Ok(mut tickets) = self.tickets.write() {
            tickets.insert(id.clone(), ticket.clone());
        }
        if let Ok(mut order) = self.order.write() {
            order.push(id.clone());
        }

        self.events.emit(FleetEvent::TicketCreated {
            ticket_id: id,
            priority: priority.to_string(),
        });
        ticket
    }

    pub fn get_ticket(&self, id: &str) -> Option<SharedTicket> {
        self.tickets.read().ok()?.get(id).cloned()
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Pending tickets, highest priority first; equal priorities keep
    /// submission order
    pub fn get_pending_tickets(&self) -> Vec<SharedTicket> {
        let order = match self.order.read() {
            Ok(order) => order.clone(),
            Err(_) => return Vec::new(),
        };
        let tickets = match self.tickets.read() {
            Ok(tickets) => tickets,
            Err(_) => return Vec::new(),
        };

        let mut pending: Vec<(Priority, SharedTicket)> = order
            .iter()
            .filter_map(|id| tickets.get(id).cloned())
            .filter(|t| ticket_status(t) == TicketStatus::Pending)
            .map(|t| {
                let priority = t.read().map(|t| t.priority).unwrap_or_default();
                (priority, t)
            })
            .collect();

        // Stable sort keeps insertion order within a priority class
        pending.sort_by(|a, b| b.0.cmp(&a.0));
        pending.into_iter().map(|(_, t)| t).collect()
    }

    /// Cancel a pending ticket; running or finished tickets are left alone
    pub fn cancel_ticket(&self, id: &str) -> bool {
        let Some(ticket) = self.get_ticket(id) else {
            warn!(ticket_id = %id, "cancel requested for unknown ticket");
            return false;
        };
        if ticket_status(&ticket) != TicketStatus::Pending {
            debug!(ticket_id = %id, "cancel refused, ticket already started");
            return false;
        }
        set_status(&ticket, TicketStatus::Cancelled);
        true
    }

    /// Run one ticket to completion on a fresh worker
    pub async fn delegate(&self, ticket: SharedTicket, executor: Arc<dyn Executor>) -> TicketResult {
        let mut worker = Worker::new(executor, self.shadow.clone()).with_events(self.events.clone());
        let ticket_id = crate::domain::ticket_id(&ticket);

        debug!(ticket_id = %ticket_id, worker_id = %worker.id(), "delegating ticket");
        self.events.emit(FleetEvent::TicketDelegated {
            ticket_id: ticket_id.clone(),
            worker_id: worker.id().to_string(),
        });

        self.active_workers.fetch_add(1, Ordering::SeqCst);
        let result = worker.run(ticket).await;
        self.active_workers.fetch_sub(1, Ordering::SeqCst);

        self.events.emit(FleetEvent::TicketCompleted {
            ticket_id,
            success: result.success,
            duration_ms: result.duration_ms,
        });
        result
    }

    /// Run a batch of tickets concurrently, one worker each
    ///
    /// Results come back in the same order as the input tickets.
    pub async fn delegate_parallel<F>(&self, tickets: Vec<SharedTicket>, executor_for: F) -> Vec<TicketResult>
    where
        F: Fn(&SharedTicket) -> Arc<dyn Executor>,
    {
        info!(count = tickets.len(), "delegating ticket batch");
        let runs = tickets.iter().map(|ticket| {
            let executor = executor_for(ticket);
            self.delegate(ticket.clone(), executor)
        });
        join_all(runs).await
    }

    /// Merge a finished worker branch into `target` using the manager's
    /// default strategy
    pub async fn integrate(&self, branch: &ShadowBranch, target: &str) -> Result<CommitHandle, GitError> {
        self.shadow.integrate(branch, target, self.default_strategy).await
    }

    pub fn stats(&self) -> ManagerStats {
        let mut tickets_by_status: HashMap<String, usize> = HashMap::new();
        let total_tickets = if let Ok(tickets) = self.tickets.read() {
            for ticket in tickets.values() {
                *tickets_by_status.entry(ticket_status(ticket).to_string()).or_default() += 1;
            }
            tickets.len()
        } else {
            0
        };

        ManagerStats {
            active_workers: self.active_workers.load(Ordering::SeqCst),
            total_tickets,
            tickets_by_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket_id;
    use crate::shadow::{ShadowGitConfig, test_support::setup_git_repo};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::tempdir;

    struct SleepyExecutor {
        delay_ms: u64,
    }

    #[async_trait]
    impl Executor for SleepyExecutor {
        async fn execute(&self, ticket: SharedTicket, _branch: &ShadowBranch) -> eyre::Result<TicketResult> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(TicketResult::ok(ticket_id(&ticket), "slept", 0))
        }
    }

    async fn setup_manager() -> (tempfile::TempDir, tempfile::TempDir, Manager) {
        let repo = tempdir().unwrap();
        let shadows = tempdir().unwrap();
        setup_git_repo(repo.path()).await;

        let shadow = Arc::new(ShadowGit::new(ShadowGitConfig {
            repo_root: repo.path().to_path_buf(),
            shadow_dir: shadows.path().to_path_buf(),
            branch_prefix: "shadow".to_string(),
        }));
        (repo, shadows, Manager::new(shadow))
    }

    #[tokio::test]
    async fn test_pending_tickets_ordered_by_priority() {
        let (_repo, _shadows, manager) = setup_manager().await;

        let low = manager.create_ticket("low", Priority::Low);
        let critical = manager.create_ticket("critical", Priority::Critical);
        let normal_a = manager.create_ticket("normal a", Priority::Normal);
        let normal_b = manager.create_ticket("normal b", Priority::Normal);
        let high = manager.create_ticket("high", Priority::High);

        let pending = manager.get_pending_tickets();
        let ids: Vec<String> = pending.iter().map(ticket_id).collect();

        assert_eq!(
            ids,
            vec![
                ticket_id(&critical),
                ticket_id(&high),
                ticket_id(&normal_a),
                ticket_id(&normal_b),
                ticket_id(&low),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_pending_tickets_excluded() {
        let (_repo, _shadows, manager) = setup_manager().await;

        let running = manager.create_ticket("running", Priority::High);
        set_status(&running, TicketStatus::Running);
        manager.create_ticket("pending", Priority::Low);

        let pending = manager.get_pending_tickets();
        assert_eq!(pending.len(), 1);
        assert_eq!(ticket_status(&pending[0]), TicketStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let (_repo, _shadows, manager) = setup_manager().await;

        let pending = manager.create_ticket("p", Priority::Normal);
        let running = manager.create_ticket("r", Priority::Normal);
        set_status(&running, TicketStatus::Running);

        assert!(manager.cancel_ticket(&ticket_id(&pending)));
        assert_eq!(ticket_status(&pending), TicketStatus::Cancelled);

        assert!(!manager.cancel_ticket(&ticket_id(&running)));
        assert_eq!(ticket_status(&running), TicketStatus::Running);

        assert!(!manager.cancel_ticket("no-such-id"));
    }

    #[tokio::test]
    async fn test_delegate_runs_ticket() {
        let (_repo, _shadows, manager) = setup_manager().await;
        let ticket = manager.create_ticket("work", Priority::Normal);

        let result = manager.delegate(ticket.clone(), Arc::new(SleepyExecutor { delay_ms: 0 })).await;

        assert!(result.success);
        assert_eq!(ticket_status(&ticket), TicketStatus::Completed);
        assert_eq!(manager.stats().active_workers, 0);
    }

    #[tokio::test]
    async fn test_delegate_parallel_preserves_order() {
        let (_repo, _shadows, manager) = setup_manager().await;

        // First ticket is slowest; results must still come back first
        let tickets = vec![
            manager.create_ticket("slow", Priority::Normal),
            manager.create_ticket("medium", Priority::Normal),
            manager.create_ticket("fast", Priority::Normal),
        ];
        let delays = [60u64, 30, 0];
        let expected: Vec<String> = tickets.iter().map(ticket_id).collect();

        let results = manager
            .delegate_parallel(tickets, |ticket| {
                let idx = expected.iter().position(|id| *id == ticket_id(ticket)).unwrap();
                Arc::new(SleepyExecutor { delay_ms: delays[idx] }) as Arc<dyn Executor>
            })
            .await;

        let got: Vec<String> = results.iter().map(|r| r.ticket_id.clone()).collect();
        assert_eq!(got, expected);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let (_repo, _shadows, manager) = setup_manager().await;

        manager.create_ticket("a", Priority::Normal);
        let b = manager.create_ticket("b", Priority::Normal);
        set_status(&b, TicketStatus::Failed);
        let c = manager.create_ticket("c", Priority::Normal);
        set_status(&c, TicketStatus::Failed);

        let stats = manager.stats();
        assert_eq!(stats.total_tickets, 3);
        assert_eq!(stats.tickets_by_status.get("pending"), Some(&1));
        assert_eq!(stats.tickets_by_status.get("failed"), Some(&2));
        assert_eq!(stats.active_workers, 0);
    }

    #[tokio::test]
    async fn test_get_ticket_by_id() {
        let (_repo, _shadows, manager) = setup_manager().await;
        let ticket = manager.create_ticket("lookup", Priority::Normal);
        let id = ticket_id(&ticket);

        assert!(manager.get_ticket(&id).is_some());
        assert!(manager.get_ticket("missing").is_none());
        assert_eq!(manager.ticket_count(), 1);
    }
}

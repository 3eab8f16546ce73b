//! Tickets - the unit of requested work
//!
//! A ticket carries the task text, references to files/symbols it touches,
//! human-readable constraints, and a priority. Tickets are created by the
//! Manager, delegated to exactly one Worker at a time, and finish as a
//! TicketResult.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Priority;

/// Generate an 8-char opaque ticket/worker id from a UUIDv7 hex prefix
pub fn short_id() -> String {
    let uuid = uuid::Uuid::now_v7();
    uuid.simple().to_string()[..8].to_string()
}

/// A constraint attached to a ticket, rendered into prompt text for the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub description: String,
}

impl Constraint {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Render into a human-readable instruction
    pub fn to_prompt(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

/// Lifecycle status of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One unit of requested work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// 8-char opaque id
    pub id: String,

    /// What to do (free text, interpreted by the executor/agent)
    pub task: String,

    /// References to files or symbols the task touches
    #[serde(default)]
    pub handles: Vec<String>,

    /// Constraints the executor must honor
    #[serde(default)]
    pub constraints: Vec<Constraint>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: TicketStatus,

    /// Open key/value map for callers
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Optional free-text context
    #[serde(default)]
    pub context: Option<String>,
}

impl Ticket {
    /// Create a new pending ticket with a generated id
    pub fn new(task: impl Into<String>, priority: Priority) -> Self {
        let id = short_id();
        debug!(%id, %priority, "Ticket::new");
        Self {
            id,
            task: task.into(),
            handles: Vec::new(),
            constraints: Vec::new(),
            priority,
            status: TicketStatus::Pending,
            metadata: HashMap::new(),
            context: None,
        }
    }

    pub fn with_handles(mut self, handles: Vec<String>) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Render all constraints into prompt lines
    pub fn constraint_prompts(&self) -> Vec<String> {
        self.constraints.iter().map(Constraint::to_prompt).collect()
    }
}

/// Shared handle to a ticket
///
/// Exactly one worker mutates a ticket's status at a time (the Manager never
/// delegates a ticket to two workers); the lock only guards against
/// concurrent reads during fan-out.
pub type SharedTicket = Arc<RwLock<Ticket>>;

/// Wrap a ticket for sharing between the manager and a worker
pub fn shared(ticket: Ticket) -> SharedTicket {
    Arc::new(RwLock::new(ticket))
}

/// Set a shared ticket's status, ignoring a poisoned lock
pub fn set_status(ticket: &SharedTicket, status: TicketStatus) {
    if let Ok(mut t) = ticket.write() {
        debug!(id = %t.id, %status, "ticket status change");
        t.status = status;
    }
}

/// Read a shared ticket's id
pub fn ticket_id(ticket: &SharedTicket) -> String {
    ticket.read().map(|t| t.id.clone()).unwrap_or_default()
}

/// Read a shared ticket's status
pub fn ticket_status(ticket: &SharedTicket) -> TicketStatus {
    ticket.read().map(|t| t.status).unwrap_or_default()
}

/// Terminal artifact of one ticket execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResult {
    pub ticket_id: String,
    pub success: bool,
    pub summary: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TicketResult {
    /// Successful result
    pub fn ok(ticket_id: impl Into<String>, summary: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            success: true,
            summary: summary.into(),
            error: None,
            duration_ms,
        }
    }

    /// Failed result carrying an error message
    pub fn failed(ticket_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        let error = error.into();
        Self {
            ticket_id: ticket_id.into(),
            success: false,
            summary: format!("execution failed: {}", error),
            error: Some(error),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_length() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_ticket_is_pending() {
        let ticket = Ticket::new("do the thing", Priority::Normal);
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.id.len(), 8);
        assert_eq!(ticket.task, "do the thing");
        assert!(ticket.handles.is_empty());
        assert!(ticket.context.is_none());
    }

    #[test]
    fn test_ticket_ids_unique() {
        let a = Ticket::new("a", Priority::Normal);
        let b = Ticket::new("b", Priority::Normal);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_constraint_to_prompt() {
        let c = Constraint::new("no-new-deps", "Do not add dependencies");
        assert_eq!(c.to_prompt(), "no-new-deps: Do not add dependencies");
    }

    #[test]
    fn test_ticket_builder() {
        let ticket = Ticket::new("refactor", Priority::High)
            .with_handles(vec!["src/lib.rs".into()])
            .with_constraints(vec![Constraint::new("style", "match existing")])
            .with_context("part of the Q3 cleanup")
            .with_metadata("origin", "test");

        assert_eq!(ticket.handles, vec!["src/lib.rs".to_string()]);
        assert_eq!(ticket.constraint_prompts(), vec!["style: match existing".to_string()]);
        assert_eq!(ticket.context.as_deref(), Some("part of the Q3 cleanup"));
        assert_eq!(ticket.metadata.get("origin").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_shared_ticket_status() {
        let ticket = shared(Ticket::new("t", Priority::Normal));
        assert_eq!(ticket_status(&ticket), TicketStatus::Pending);

        set_status(&ticket, TicketStatus::Running);
        assert_eq!(ticket_status(&ticket), TicketStatus::Running);
    }

    #[test]
    fn test_ticket_result_helpers() {
        let ok = TicketResult::ok("abc12345", "done", 42);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = TicketResult::failed("abc12345", "boom", 7);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.summary.contains("boom"));
    }

    #[test]
    fn test_ticket_serde_roundtrip() {
        let ticket = Ticket::new("serialize me", Priority::Critical);
        let json = serde_json::to_string(&ticket).unwrap();
        let back: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, ticket.id);
        assert_eq!(back.priority, Priority::Critical);
        assert_eq!(back.status, TicketStatus::Pending);
    }
}

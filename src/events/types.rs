//! Event types for fleet activity streaming
//!
//! These events represent observable control-plane activity:
//! - Ticket lifecycle (created, delegated, completed)
//! - Worker lifecycle (spawned, terminated)
//! - Silent Loop lifecycle (start, iteration, shadow commit, convergence failure)

use serde::{Deserialize, Serialize};

/// Core event enum - the vocabulary of fleet activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetEvent {
    // === Ticket Lifecycle ===
    /// A ticket was created by the manager
    TicketCreated { ticket_id: String, priority: String },
    /// A ticket was handed to a worker
    TicketDelegated { ticket_id: String, worker_id: String },
    /// A ticket execution finished
    TicketCompleted {
        ticket_id: String,
        success: bool,
        duration_ms: u64,
    },

    // === Worker Lifecycle ===
    /// A worker created its shadow branch
    WorkerSpawned { worker_id: String, branch: String },
    /// A worker was forcibly terminated
    WorkerTerminated { worker_id: String },

    // === Silent Loop ===
    /// A loop run started
    LoopStarted { execution_id: String, patches: usize },
    /// One loop iteration finished
    LoopIteration {
        execution_id: String,
        iteration: u32,
        errors: usize,
        success: bool,
    },
    /// The loop committed on its shadow branch
    ShadowCommit {
        execution_id: String,
        iteration: u32,
        sha: String,
    },
    /// The loop gave up for lack of progress
    ValidationFailed {
        execution_id: String,
        /// "stalled" or "oscillating"
        reason: String,
        iterations: u32,
    },
    /// A loop run reached a terminal state
    LoopFinished {
        execution_id: String,
        status: String,
        iterations: u32,
    },
}

impl FleetEvent {
    /// Event type name for logging and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "TicketCreated",
            Self::TicketDelegated { .. } => "TicketDelegated",
            Self::TicketCompleted { .. } => "TicketCompleted",
            Self::WorkerSpawned { .. } => "WorkerSpawned",
            Self::WorkerTerminated { .. } => "WorkerTerminated",
            Self::LoopStarted { .. } => "LoopStarted",
            Self::LoopIteration { .. } => "LoopIteration",
            Self::ShadowCommit { .. } => "ShadowCommit",
            Self::ValidationFailed { .. } => "ValidationFailed",
            Self::LoopFinished { .. } => "LoopFinished",
        }
    }

    /// The ticket/execution id this event belongs to, if any
    pub fn subject_id(&self) -> &str {
        match self {
            Self::TicketCreated { ticket_id, .. }
            | Self::TicketDelegated { ticket_id, .. }
            | Self::TicketCompleted { ticket_id, .. } => ticket_id,
            Self::WorkerSpawned { worker_id, .. } | Self::WorkerTerminated { worker_id } => worker_id,
            Self::LoopStarted { execution_id, .. }
            | Self::LoopIteration { execution_id, .. }
            | Self::ShadowCommit { execution_id, .. }
            | Self::ValidationFailed { execution_id, .. }
            | Self::LoopFinished { execution_id, .. } => execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = FleetEvent::LoopStarted {
            execution_id: "abc12345".into(),
            patches: 3,
        };
        assert_eq!(event.event_type(), "LoopStarted");
        assert_eq!(event.subject_id(), "abc12345");
    }

    #[test]
    fn test_event_serde_tagging() {
        let event = FleetEvent::ValidationFailed {
            execution_id: "abc12345".into(),
            reason: "stalled".into(),
            iterations: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ValidationFailed");
        assert_eq!(json["reason"], "stalled");
    }
}

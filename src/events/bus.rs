//! Event Bus - central pub/sub for fleet events
//!
//! The EventBus uses tokio broadcast channels to deliver events to all
//! subscribers. Components emit events; consumers (UI, metrics, loggers)
//! subscribe. Emitting with no subscribers is a no-op, so components can
//! always publish unconditionally.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::FleetEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus for fleet activity streaming
pub struct EventBus {
    tx: broadcast::Sender<FleetEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: if there are no subscribers, the event is dropped.
    pub fn emit(&self, event: FleetEvent) {
        debug!(
            event_type = event.event_type(),
            subject = event.subject_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one execution id
    pub fn emitter_for(&self, execution_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            execution_id: execution_id.into(),
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for components to emit loop events without owning the bus
///
/// Cheap to clone; carries a pre-set execution id.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<FleetEvent>,
    execution_id: String,
}

impl EventEmitter {
    /// The execution id this emitter is bound to
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: FleetEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a loop started event
    pub fn loop_started(&self, patches: usize) {
        self.emit(FleetEvent::LoopStarted {
            execution_id: self.execution_id.clone(),
            patches,
        });
    }

    /// Emit a loop iteration event
    pub fn loop_iteration(&self, iteration: u32, errors: usize, success: bool) {
        self.emit(FleetEvent::LoopIteration {
            execution_id: self.execution_id.clone(),
            iteration,
            errors,
            success,
        });
    }

    /// Emit a shadow commit event
    pub fn shadow_commit(&self, iteration: u32, sha: &str) {
        self.emit(FleetEvent::ShadowCommit {
            execution_id: self.execution_id.clone(),
            iteration,
            sha: sha.to_string(),
        });
    }

    /// Emit a convergence failure event ("stalled" or "oscillating")
    pub fn validation_failed(&self, reason: &str, iterations: u32) {
        self.emit(FleetEvent::ValidationFailed {
            execution_id: self.execution_id.clone(),
            reason: reason.to_string(),
            iterations,
        });
    }

    /// Emit a loop finished event
    pub fn loop_finished(&self, status: &str, iterations: u32) {
        self.emit(FleetEvent::LoopFinished {
            execution_id: self.execution_id.clone(),
            status: status.to_string(),
            iterations,
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new(100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(100);
        let _rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        bus.emit(FleetEvent::TicketCreated {
            ticket_id: "abc12345".to_string(),
            priority: "normal".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.subject_id(), "abc12345");
        assert_eq!(event.event_type(), "TicketCreated");
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(100);
        // Must not panic with zero subscribers
        bus.emit(FleetEvent::WorkerTerminated {
            worker_id: "w1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_event_emitter_convenience_methods() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("exec-123");

        emitter.loop_started(2);
        emitter.loop_iteration(1, 5, false);
        emitter.shadow_commit(1, "deadbeef");
        emitter.validation_failed("stalled", 4);
        emitter.loop_finished("stalled", 4);

        for _ in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.subject_id(), "exec-123");
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(FleetEvent::WorkerSpawned {
            worker_id: "w1".to_string(),
            branch: "shadow/worker-w1".to_string(),
        });

        assert_eq!(rx1.recv().await.unwrap().subject_id(), "w1");
        assert_eq!(rx2.recv().await.unwrap().subject_id(), "w1");
    }
}

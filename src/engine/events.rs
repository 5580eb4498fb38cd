//! Observation events for the simulation dashboard.
//! Every state change the controller makes is announced here so that renderers
//! can follow a run without polling snapshots.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::engine::executor::{ExecutorKind, RunReport};
use crate::engine::trace::TraceEntry;

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A timestamped simulator event
#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    /// Unique, monotonically increasing event identifier
    pub id: u64,
    /// Unix timestamp in milliseconds when the event occurred
    pub timestamp: u64,
    /// The specific event data
    pub event_type: SimEventType,
}

impl SimEvent {
    /// Creates a new event stamped with the current time
    pub fn new(event_type: SimEventType) -> Self {
        let id = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            id,
            timestamp,
            event_type,
        }
    }
}

/// Everything the controller reports to observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SimEventType {
    /// An executor was installed and the driver started pulling steps
    RunStarted {
        executor: ExecutorKind,
        generation: u64,
    },

    /// One transition was applied to the model
    StepCompleted { executor: ExecutorKind, step: usize },

    /// Lines appended to the trace by the last step
    TraceAppended { entries: Vec<TraceEntry> },

    RunFinished { report: RunReport },

    /// The run was abandoned at a suspension point
    RunCancelled { executor: ExecutorKind },

    /// An edit command was applied
    ModelEdited { description: String },

    SpeedChanged { delay_ms: u64 },

    /// Models restored to defaults and the trace cleared
    Reset,

    /// A command was refused without touching the model
    CommandRejected { command: String, reason: String },
}

/// Helper functions for creating common events
impl SimEvent {
    pub fn run_started(executor: ExecutorKind, generation: u64) -> Self {
        Self::new(SimEventType::RunStarted {
            executor,
            generation,
        })
    }

    pub fn step_completed(executor: ExecutorKind, step: usize) -> Self {
        Self::new(SimEventType::StepCompleted { executor, step })
    }

    pub fn trace_appended(entries: Vec<TraceEntry>) -> Self {
        Self::new(SimEventType::TraceAppended { entries })
    }

    pub fn run_finished(report: RunReport) -> Self {
        Self::new(SimEventType::RunFinished { report })
    }

    pub fn run_cancelled(executor: ExecutorKind) -> Self {
        Self::new(SimEventType::RunCancelled { executor })
    }

    pub fn model_edited(description: impl Into<String>) -> Self {
        Self::new(SimEventType::ModelEdited {
            description: description.into(),
        })
    }

    pub fn speed_changed(delay_ms: u64) -> Self {
        Self::new(SimEventType::SpeedChanged { delay_ms })
    }

    pub fn reset() -> Self {
        Self::new(SimEventType::Reset)
    }

    pub fn command_rejected(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(SimEventType::CommandRejected {
            command: command.into(),
            reason: reason.into(),
        })
    }
}

/// Event channel wrapper for broadcasting events to multiple subscribers
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SimEvent>,
}

impl EventBroadcaster {
    /// Creates a new event broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<SimEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Broadcasts an event to all subscribers
    pub fn emit(&self, event: SimEvent) -> Result<usize, broadcast::error::SendError<SimEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::executor::Outcome;
    use crate::engine::trace::Trace;

    #[test]
    fn test_event_ids_increase() {
        let first = SimEvent::new(SimEventType::Reset);
        let second = SimEvent::new(SimEventType::Reset);
        assert!(second.id > first.id);
        assert!(first.timestamp > 0);
    }

    #[test]
    fn test_event_broadcaster() {
        let (broadcaster, mut receiver) = EventBroadcaster::new(16);
        assert_eq!(broadcaster.receiver_count(), 1);

        let event = SimEvent::run_started(ExecutorKind::Bfs, 3);
        broadcaster.emit(event.clone()).unwrap();

        let received = receiver.blocking_recv().unwrap();
        assert_eq!(received.id, event.id);
        match received.event_type {
            SimEventType::RunStarted {
                executor,
                generation,
            } => {
                assert_eq!(executor, ExecutorKind::Bfs);
                assert_eq!(generation, 3);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let mut trace = Trace::new();
        trace.info("Starting Kruskal's algorithm");
        let event = SimEvent::trace_appended(trace.entries().to_vec());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"]["type"], "TraceAppended");
        assert_eq!(json["event_type"]["entries"][0]["line"], "Starting Kruskal's algorithm");

        let finished = SimEvent::run_finished(RunReport::cancelled(ExecutorKind::Prim));
        let json = serde_json::to_value(&finished).unwrap();
        assert_eq!(json["event_type"]["report"]["outcome"]["status"], "cancelled");
        assert!(matches!(
            finished.event_type,
            SimEventType::RunFinished { report } if report.outcome == Outcome::Cancelled
        ));
    }
}

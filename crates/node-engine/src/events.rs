//! Event types for streaming run progress
//!
//! Events are sent from the engine to any consumer (an editor, a log
//! collector, a test) to report node progress, flow decisions and loop
//! iterations. Sending is best effort: a failing sink never fails a run.

use serde::{Deserialize, Serialize};

/// Trait for sending run events
///
/// This abstracts over the transport mechanism (mpsc channel, UI bridge,
/// in-memory buffer) so the engine can be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a graph run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Run started
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow_id: String,
        execution_id: String,
    },

    /// Run completed successfully
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted {
        workflow_id: String,
        execution_id: String,
        elapsed_ms: u64,
    },

    /// Run failed
    #[serde(rename_all = "camelCase")]
    WorkflowFailed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// Run stopped by its cancellation token
    #[serde(rename_all = "camelCase")]
    WorkflowCancelled {
        workflow_id: String,
        execution_id: String,
    },

    /// A node body started
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        execution_id: String,
    },

    /// A node body finished and its outputs were cached
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
        outputs: serde_json::Value,
    },

    /// A node was parked until its upstream nodes finish
    #[serde(rename_all = "camelCase")]
    NodeDeferred {
        node_id: String,
        execution_id: String,
        waiting_on: Vec<String>,
    },

    /// A node body failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// Control flow moved along a flow connection
    #[serde(rename_all = "camelCase")]
    FlowActivated {
        node_id: String,
        execution_id: String,
        port: String,
        target_node: String,
        target_port: String,
    },

    /// A loop node started another iteration
    #[serde(rename_all = "camelCase")]
    LoopIteration {
        node_id: String,
        execution_id: String,
        iteration: u32,
    },
}

impl WorkflowEvent {
    /// Create a node deferred event
    pub fn node_deferred(node_id: &str, execution_id: &str, waiting_on: Vec<String>) -> Self {
        Self::NodeDeferred {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            waiting_on,
        }
    }

    /// Create a loop iteration event
    pub fn loop_iteration(node_id: &str, execution_id: &str, iteration: u32) -> Self {
        Self::LoopIteration {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            iteration,
        }
    }

    /// Node this event is about, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeDeferred { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::FlowActivated { node_id, .. }
            | Self::LoopIteration { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Send an event, logging instead of failing when the sink rejects it
pub(crate) fn emit(sink: &dyn EventSink, event: WorkflowEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Dropping run event: {}", e);
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Events about one node, in emission order
    pub fn events_for(&self, node_id: &str) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.node_id() == Some(node_id))
            .cloned()
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedSink;

    impl EventSink for ClosedSink {
        fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
            Err(EventError::channel_closed())
        }
    }

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::node_deferred("sum", "exec1", vec!["a".to_string()]))
            .unwrap();
        sink.send(WorkflowEvent::loop_iteration("loop", "exec1", 2))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);

        match &sink.events_for("sum")[0] {
            WorkflowEvent::NodeDeferred { waiting_on, .. } => {
                assert_eq!(waiting_on, &vec!["a".to_string()]);
            }
            other => panic!("Expected NodeDeferred event, got {:?}", other),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::loop_iteration("loop", "exec1", 3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loopIteration");
        assert_eq!(json["nodeId"], "loop");
    }

    #[test]
    fn test_emit_swallows_sink_errors() {
        // Should not panic
        emit(&ClosedSink, WorkflowEvent::loop_iteration("loop", "exec1", 1));
        emit(&NullEventSink, WorkflowEvent::loop_iteration("loop", "exec1", 1));
    }
}

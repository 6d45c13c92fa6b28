//! Error types for the node engine

use thiserror::Error;

use crate::types::{NodeId, PortDataType, PortDirection};

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// Connection endpoints have the wrong direction or mix data and flow ports
    #[error("Invalid endpoint kinds: cannot connect {source_kind:?} to {target_kind:?}")]
    InvalidEndpointKind {
        source_kind: PortDirection,
        target_kind: PortDirection,
    },

    /// The exact (source, target) pair is already connected
    #[error("Ports already connected: {from} -> {to}")]
    AlreadyConnected { from: String, to: String },

    /// The input port cannot accept the output port's declared type
    #[error("Incompatible types: {source_type} cannot flow into {target_type}")]
    IncompatibleType {
        source_type: PortDataType,
        target_type: PortDataType,
    },

    /// Node lookup failed
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port lookup failed
    #[error("Port '{port}' ({direction:?}) not found on node '{node_id}'")]
    PortNotFound {
        node_id: NodeId,
        direction: PortDirection,
        port: String,
    },

    /// A node with this ID already exists in the graph
    #[error("Duplicate node ID: {0}")]
    DuplicateNode(NodeId),

    /// No registry entry for a node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A run parameter could not be applied to its node
    #[error("Invalid parameter for node '{node_id}': {message}")]
    InvalidParameter { node_id: NodeId, message: String },

    /// Failure raised from inside a node body
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// A node body failed during a run
    #[error("Node '{node_id}' failed: {source}")]
    NodeProcessingFailure {
        node_id: NodeId,
        /// Nodes that were still running in the same cycle
        in_flight: Vec<NodeId>,
        #[source]
        source: Box<NodeEngineError>,
    },

    /// Pending nodes can never be satisfied
    #[error("Circular wait between pending nodes: {}", format_waiting(.waiting))]
    CircularWait { waiting: Vec<(NodeId, Vec<NodeId>)> },

    /// A loop exceeded the configured iteration bound
    #[error("Loop node '{node_id}' exceeded {limit} iterations")]
    LoopLimitExceeded { node_id: NodeId, limit: u32 },

    /// Workflow was cancelled
    #[error("Workflow cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether this error (or the failure it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::NodeProcessingFailure { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// ID of the node that failed, if this is a processing failure
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            Self::NodeProcessingFailure { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

fn format_waiting(waiting: &[(NodeId, Vec<NodeId>)]) -> String {
    waiting
        .iter()
        .map(|(node, blockers)| format!("{} waits on [{}]", node, blockers.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

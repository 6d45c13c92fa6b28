//! Ports and connections
//!
//! A port is identified by its owning node, its direction and its name.
//! Connections are immutable once created and only ever link an output to
//! an input (data) or a flow-out to a flow-in (control).

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::descriptor::PortMetadata;
use crate::error::{NodeEngineError, Result};
use crate::types::{ConnectionId, NodeId, PortDataType, PortDirection, PortId};
use crate::value::Value;

/// Address of a port within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    pub node: NodeId,
    pub direction: PortDirection,
    pub name: PortId,
}

impl PortRef {
    pub fn new(node: impl Into<String>, direction: PortDirection, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            direction,
            name: name.into(),
        }
    }

    pub fn input(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Input, name)
    }

    pub fn output(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Output, name)
    }

    pub fn flow_in(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::FlowIn, name)
    }

    pub fn flow_out(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(node, PortDirection::FlowOut, name)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
            PortDirection::FlowIn => "flow-in",
            PortDirection::FlowOut => "flow-out",
        };
        write!(f, "{}.{}[{}]", self.node, self.name, arrow)
    }
}

/// A typed attachment point owned by a node
#[derive(Debug)]
pub struct Port {
    name: PortId,
    label: String,
    direction: PortDirection,
    data_type: PortDataType,
    visible: bool,
    /// Last value written locally; persists until overwritten
    value: Mutex<Option<Value>>,
    connections: Vec<ConnectionId>,
}

impl Port {
    /// Create a port from its declared metadata
    pub fn from_metadata(direction: PortDirection, metadata: &PortMetadata) -> Self {
        Self {
            name: metadata.id.clone(),
            label: metadata.label.clone(),
            direction,
            data_type: metadata.data_type,
            visible: metadata.visible,
            value: Mutex::new(metadata.default_value.clone()),
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn data_type(&self) -> PortDataType {
        self.data_type
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Locally stored value
    pub fn value(&self) -> Option<Value> {
        self.value.lock().clone()
    }

    /// Overwrite the locally stored value
    pub fn set_value(&self, value: Option<Value>) {
        *self.value.lock() = value;
    }

    /// IDs of connections attached to this port
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub(crate) fn attach(&mut self, connection: ConnectionId) {
        self.connections.push(connection);
    }

    /// Returns whether the connection was attached
    pub(crate) fn detach(&mut self, connection: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        self.connections.len() != before
    }
}

/// A directed edge between two ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    id: ConnectionId,
    source: PortRef,
    target: PortRef,
}

impl Connection {
    /// Create a connection, rejecting any pairing other than
    /// output→input or flow-out→flow-in
    pub fn new(source: PortRef, target: PortRef) -> Result<Self> {
        Self::with_id(format!("conn-{}", uuid::Uuid::new_v4()), source, target)
    }

    /// Create a connection with an explicit ID
    pub fn with_id(id: impl Into<String>, source: PortRef, target: PortRef) -> Result<Self> {
        let valid = matches!(
            (source.direction, target.direction),
            (PortDirection::Output, PortDirection::Input)
                | (PortDirection::FlowOut, PortDirection::FlowIn)
        );
        if !valid {
            return Err(NodeEngineError::InvalidEndpointKind {
                source_kind: source.direction,
                target_kind: target.direction,
            });
        }

        Ok(Self {
            id: id.into(),
            source,
            target,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &PortRef {
        &self.source
    }

    pub fn target(&self) -> &PortRef {
        &self.target
    }

    /// Whether this connection carries control flow rather than data
    pub fn is_flow(&self) -> bool {
        self.source.direction == PortDirection::FlowOut
    }

    /// Whether this connection links exactly the given endpoints
    pub fn links(&self, source: &PortRef, target: &PortRef) -> bool {
        &self.source == source && &self.target == target
    }
}

//! Node descriptor and port metadata types
//!
//! Every node behavior describes its own ports through a [`NodeMetadata`].
//! The graph creates the node's ports from this description, in order, so
//! the behavior is the single source of truth for both what the node does
//! and what it exposes.

use serde::{Deserialize, Serialize};

use crate::types::{NodeCategory, PortDataType, PortDirection};
use crate::value::Value;

/// Complete metadata for a node type
///
/// This describes everything needed to create a node's ports, render it
/// in an editor palette and validate connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Unique type identifier (e.g., "add")
    pub node_type: String,
    /// Category for palette grouping
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Data input ports
    pub inputs: Vec<PortMetadata>,
    /// Data output ports
    pub outputs: Vec<PortMetadata>,
    /// Control-flow entry ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_inputs: Vec<PortMetadata>,
    /// Control-flow exit ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_outputs: Vec<PortMetadata>,
}

impl NodeMetadata {
    /// Start describing a node type with no ports
    pub fn new(
        node_type: impl Into<String>,
        category: NodeCategory,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            category,
            label: label.into(),
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            flow_inputs: Vec::new(),
            flow_outputs: Vec::new(),
        }
    }

    /// Add a data input port
    pub fn input(mut self, port: PortMetadata) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add a data output port
    pub fn output(mut self, port: PortMetadata) -> Self {
        self.outputs.push(port);
        self
    }

    /// Add a flow entry port
    pub fn flow_input(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.flow_inputs.push(PortMetadata::flow(id, label));
        self
    }

    /// Add a flow exit port
    pub fn flow_output(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.flow_outputs.push(PortMetadata::flow(id, label));
        self
    }

    /// Ports declared for one direction
    pub fn ports(&self, direction: PortDirection) -> &[PortMetadata] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
            PortDirection::FlowIn => &self.flow_inputs,
            PortDirection::FlowOut => &self.flow_outputs,
        }
    }
}

/// Metadata for a single port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMetadata {
    /// Port name, unique within the node and direction
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Declared data type (`Any` for flow ports)
    pub data_type: PortDataType,
    /// Initial local value for inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Whether the port is shown for connection in an editor
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl PortMetadata {
    /// Create a data port
    pub fn new(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            default_value: None,
            visible: true,
        }
    }

    /// Create a control-flow port
    pub fn flow(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, PortDataType::Any)
    }

    /// Set the initial local value of an input port
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Hide the port from connection UI
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

//! Core types for dataflow graphs
//!
//! Identifiers, port directions, port data types (with the numeric
//! widening table used when connecting ports) and the per-run
//! execution state of a node.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Name of a port, unique within a node and direction
pub type PortId = String;

/// Direction (and kind) of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Data input
    Input,
    /// Data output
    Output,
    /// Control-flow entry
    FlowIn,
    /// Control-flow exit
    FlowOut,
}

impl PortDirection {
    /// Whether this port carries values (as opposed to control flow)
    pub fn is_data(&self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::Output)
    }

    /// Whether a connection may start at this port
    pub fn is_source(&self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::FlowOut)
    }

    /// Whether a connection may end at this port
    pub fn is_target(&self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::FlowIn)
    }
}

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Open type; the decision is deferred to runtime coercion
    Any,
    /// Boolean value
    Bool,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Short,
    /// Signed 32-bit integer
    Int,
    /// Signed 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Text string
    String,
    /// Arbitrary JSON document
    Json,
}

impl PortDataType {
    /// Whether this is one of the numeric types
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PortDataType::Byte
                | PortDataType::Short
                | PortDataType::Int
                | PortDataType::Long
                | PortDataType::Float
                | PortDataType::Double
        )
    }

    /// Whether a value of this numeric type widens losslessly into `target`
    pub fn widens_to(&self, target: &PortDataType) -> bool {
        use PortDataType::*;
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => matches!(target, Double),
            _ => false,
        }
    }

    /// Check if an output of this type can connect to an input of `target`
    pub fn is_compatible_with(&self, target: &PortDataType) -> bool {
        // Open types defer the decision to runtime coercion
        if matches!(self, PortDataType::Any) || matches!(target, PortDataType::Any) {
            return true;
        }

        self == target || self.widens_to(target)
    }
}

impl fmt::Display for PortDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortDataType::Any => "any",
            PortDataType::Bool => "bool",
            PortDataType::Byte => "byte",
            PortDataType::Short => "short",
            PortDataType::Int => "int",
            PortDataType::Long => "long",
            PortDataType::Float => "float",
            PortDataType::Double => "double",
            PortDataType::String => "string",
            PortDataType::Json => "json",
        };
        f.write_str(name)
    }
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Value sources (constants, parameters)
    Input,
    /// Sinks that display or export results
    Output,
    /// Pure computations
    Math,
    /// Control flow (branches, loops, sequences)
    Control,
    /// Anything else
    Utility,
}

/// Per-run state of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Not yet started, or deferred waiting on dependencies
    #[default]
    NotStarted,
    /// Executor has begun work on the node
    Running,
    /// Body completed and all outputs are cached
    Executed,
    /// Body failed; terminal for the run
    Failed,
}

impl ExecutionState {
    /// Whether the node has settled for this run
    pub fn is_settled(&self) -> bool {
        matches!(self, ExecutionState::Executed | ExecutionState::Failed)
    }
}

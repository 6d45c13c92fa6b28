//! Graph validation
//!
//! Validation is separate from execution: the engine never validates on
//! its own, it simply runs whatever it is given. Editors call these
//! functions to report problems before a run or before loading a
//! document.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::document::GraphDocument;
use crate::graph::Graph;
use crate::port::PortRef;
use crate::registry::NodeRegistry;
use crate::types::{NodeId, PortDataType, PortDirection};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Data connections form a cycle through these nodes
    CycleDetected { nodes: Vec<NodeId> },
    /// A node ID appears more than once in a document
    DuplicateNode { node_id: String },
    /// A node has an unknown type (not in registry)
    UnknownNodeType { node_id: String, node_type: String },
    /// A connection references a non-existent node
    UnknownNode {
        connection_id: String,
        node_id: String,
    },
    /// A connection references a port the node does not declare
    UnknownPort {
        connection_id: String,
        port: PortRef,
    },
    /// A connection pairs port kinds other than output→input or flow→flow
    InvalidEndpoints { connection_id: String },
    /// A connection links incompatible port types
    IncompatiblePortTypes {
        connection_id: String,
        source_type: PortDataType,
        target_type: PortDataType,
    },
    /// More than one connection feeds a single data input
    MultipleDataSources {
        node_id: String,
        port_id: String,
        count: usize,
    },
    /// A loop node has nothing connected to its body ports
    LoopWithoutBody { node_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected { nodes } => {
                write!(f, "Data cycle detected through: {}", nodes.join(", "))
            }
            Self::DuplicateNode { node_id } => write!(f, "Duplicate node ID '{}'", node_id),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownNode {
                connection_id,
                node_id,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown node '{}'",
                    connection_id, node_id
                )
            }
            Self::UnknownPort {
                connection_id,
                port,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown port {}",
                    connection_id, port
                )
            }
            Self::InvalidEndpoints { connection_id } => {
                write!(f, "Connection '{}' has invalid endpoint kinds", connection_id)
            }
            Self::IncompatiblePortTypes {
                connection_id,
                source_type,
                target_type,
            } => {
                write!(
                    f,
                    "Connection '{}' links incompatible types: {} -> {}",
                    connection_id, source_type, target_type
                )
            }
            Self::MultipleDataSources {
                node_id,
                port_id,
                count,
            } => {
                write!(
                    f,
                    "Input '{}' on node '{}' has {} incoming connections",
                    port_id, node_id, count
                )
            }
            Self::LoopWithoutBody { node_id } => {
                write!(f, "Loop node '{}' has no body connected", node_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a live graph
///
/// Connections in a [`Graph`] were already checked when they were made,
/// so this looks at whole-graph properties only. Returns all errors found
/// (not just the first).
pub fn validate_graph(graph: &Graph) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_single_sources(graph, &mut errors);
    validate_loop_bodies(graph, &mut errors);
    detect_data_cycles(graph, &mut errors);

    errors
}

/// Validate a document before it is loaded
///
/// Pass a registry to enable node type, port and port type validation.
pub fn validate_document(
    document: &GraphDocument,
    registry: Option<&NodeRegistry>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in &document.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }

    for connection in &document.connections {
        for endpoint in [&connection.source, &connection.target] {
            if !seen.contains(endpoint.node.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    connection_id: connection.id.clone(),
                    node_id: endpoint.node.clone(),
                });
            }
        }
        let valid = matches!(
            (connection.source.direction, connection.target.direction),
            (PortDirection::Output, PortDirection::Input)
                | (PortDirection::FlowOut, PortDirection::FlowIn)
        );
        if !valid {
            errors.push(ValidationError::InvalidEndpoints {
                connection_id: connection.id.clone(),
            });
        }
    }

    if let Some(registry) = registry {
        validate_document_ports(document, registry, &mut errors);
    }

    errors
}

/// Check node types and connection ports against the registry
fn validate_document_ports(
    document: &GraphDocument,
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) {
    // Port types per (node, direction, name), built from each node's
    // metadata after its saved state is applied
    let mut port_types: HashMap<PortRef, PortDataType> = HashMap::new();
    for node in &document.nodes {
        let Ok(mut behavior) = registry.create_behavior(&node.node_type) else {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
            continue;
        };
        if let Err(e) = behavior.load_state(&node.state) {
            log::warn!("Could not load state of node '{}': {}", node.id, e);
        }
        let metadata = behavior.metadata();
        for direction in [
            PortDirection::Input,
            PortDirection::Output,
            PortDirection::FlowIn,
            PortDirection::FlowOut,
        ] {
            for port in metadata.ports(direction) {
                port_types.insert(
                    PortRef::new(node.id.clone(), direction, port.id.clone()),
                    port.data_type,
                );
            }
        }
    }

    let known_nodes: HashSet<&str> = document
        .nodes
        .iter()
        .filter(|n| registry.has_node_type(&n.node_type))
        .map(|n| n.id.as_str())
        .collect();

    for connection in &document.connections {
        let mut types = Vec::with_capacity(2);
        for endpoint in [&connection.source, &connection.target] {
            if !known_nodes.contains(endpoint.node.as_str()) {
                continue;
            }
            match port_types.get(endpoint) {
                Some(data_type) => types.push(*data_type),
                None => errors.push(ValidationError::UnknownPort {
                    connection_id: connection.id.clone(),
                    port: endpoint.clone(),
                }),
            }
        }

        let is_data = connection.source.direction == PortDirection::Output
            && connection.target.direction == PortDirection::Input;
        if let &[source_type, target_type] = types.as_slice() {
            if is_data && !source_type.is_compatible_with(&target_type) {
                errors.push(ValidationError::IncompatiblePortTypes {
                    connection_id: connection.id.clone(),
                    source_type,
                    target_type,
                });
            }
        }
    }
}

/// Check that no data input has more than one incoming connection
fn validate_single_sources(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        for port in node.ports(PortDirection::Input) {
            let count = port.connections().len();
            if count > 1 {
                errors.push(ValidationError::MultipleDataSources {
                    node_id: node.id().to_string(),
                    port_id: port.name().to_string(),
                    count,
                });
            }
        }
    }
}

/// Check that every loop node drives at least one body node
fn validate_loop_bodies(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        let Some(completed) = node.loop_completed_port() else {
            continue;
        };
        let has_body = node
            .ports(PortDirection::FlowOut)
            .iter()
            .filter(|p| p.name() != completed)
            .any(|p| p.is_connected());
        if !has_body {
            errors.push(ValidationError::LoopWithoutBody {
                node_id: node.id().to_string(),
            });
        }
    }
}

/// Detect data cycles using Kahn's algorithm (topological sort)
fn detect_data_cycles(graph: &Graph, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = graph.nodes().map(|n| (n.id(), 0)).collect();
    let mut edges: HashSet<(&str, &str)> = HashSet::new();
    for connection in graph.connections().iter().filter(|c| !c.is_flow()) {
        let edge = (
            connection.source().node.as_str(),
            connection.target().node.as_str(),
        );
        if edges.insert(edge) {
            *in_degree.entry(edge.1).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    while let Some(node_id) = queue.pop_front() {
        for &(source, target) in &edges {
            if source == node_id {
                if let Some(deg) = in_degree.get_mut(target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    let mut remaining: Vec<NodeId> = in_degree
        .into_iter()
        .filter(|(_, deg)| *deg > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    if !remaining.is_empty() {
        remaining.sort();
        errors.push(ValidationError::CycleDetected { nodes: remaining });
    }
}

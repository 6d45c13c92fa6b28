//! The node graph and its mutation primitives
//!
//! `add_node`, `remove_node`, `connect` and `disconnect` take `&mut Graph`,
//! so they can only be used outside an active run (a run borrows the graph
//! immutably). None of them touch an [`ExecutionContext`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::coercion::ConverterRegistry;
use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::node::Node;
use crate::port::{Connection, Port, PortRef};
use crate::types::{NodeId, PortDirection, PortId};
use crate::value::Value;

/// A graph of nodes and connections
#[derive(Debug, Default)]
pub struct Graph {
    id: String,
    name: String,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    connections: Vec<Connection>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Find a node by ID
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Find a node by ID (mutable)
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    pub(crate) fn require_node(&self, id: &str) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| NodeEngineError::NodeNotFound(id.to_string()))
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id() == id)
    }

    /// Add a node; its ID must be unique within the graph
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.index.contains_key(node.id()) {
            return Err(NodeEngineError::DuplicateNode(node.id().to_string()));
        }
        self.index.insert(node.id().to_string(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every connection attached to it
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| NodeEngineError::NodeNotFound(id.to_string()))?;

        let attached: Vec<String> = self
            .connections
            .iter()
            .filter(|c| c.source().node == id || c.target().node == id)
            .map(|c| c.id().to_string())
            .collect();
        for connection in attached {
            self.disconnect(&connection);
        }

        let node = self.nodes.remove(position);
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id().to_string(), i))
            .collect();
        Ok(node)
    }

    /// Resolve a port reference
    pub fn port(&self, port: &PortRef) -> Result<&Port> {
        self.require_node(&port.node)?
            .port(port.direction, &port.name)
            .ok_or_else(|| port_not_found(port))
    }

    fn port_mut(&mut self, port: &PortRef) -> Result<&mut Port> {
        self.node_mut(&port.node)
            .ok_or_else(|| NodeEngineError::NodeNotFound(port.node.clone()))?
            .port_mut(port.direction, &port.name)
            .ok_or_else(|| port_not_found(port))
    }

    /// Connect an output to an input, or a flow-out to a flow-in
    ///
    /// # Errors
    ///
    /// - `InvalidEndpointKind` for any other pairing of directions
    /// - `NodeNotFound` / `PortNotFound` for dangling endpoints
    /// - `AlreadyConnected` if the same pair is already linked
    /// - `IncompatibleType` if the input cannot accept the output's type
    pub fn connect(&mut self, source: PortRef, target: PortRef) -> Result<Connection> {
        let connection = Connection::new(source, target)?;
        self.attach(connection)
    }

    /// Insert a pre-built connection, applying the same checks as `connect`
    pub(crate) fn attach(&mut self, connection: Connection) -> Result<Connection> {
        let source_type = self.port(connection.source())?.data_type();
        let target_type = self.port(connection.target())?.data_type();

        if self
            .connections
            .iter()
            .any(|c| c.links(connection.source(), connection.target()))
        {
            return Err(NodeEngineError::AlreadyConnected {
                from: connection.source().to_string(),
                to: connection.target().to_string(),
            });
        }

        if !connection.is_flow() && !source_type.is_compatible_with(&target_type) {
            return Err(NodeEngineError::IncompatibleType {
                source_type,
                target_type,
            });
        }

        let id = connection.id().to_string();
        self.port_mut(connection.source())?.attach(id.clone());
        self.port_mut(connection.target())?.attach(id);
        log::debug!(
            "Connected {} -> {}",
            connection.source(),
            connection.target()
        );
        self.connections.push(connection.clone());
        Ok(connection)
    }

    /// Connect a data output to a data input
    pub fn connect_data(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<Connection> {
        self.connect(
            PortRef::output(source, source_port),
            PortRef::input(target, target_port),
        )
    }

    /// Connect a flow-out port to a flow-in port
    pub fn connect_flow(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<Connection> {
        self.connect(
            PortRef::flow_out(source, source_port),
            PortRef::flow_in(target, target_port),
        )
    }

    /// Remove a connection from the graph and both endpoints
    ///
    /// Returns `false` if it was already gone; never fails.
    pub fn disconnect(&mut self, connection_id: &str) -> bool {
        let Some(position) = self.connections.iter().position(|c| c.id() == connection_id) else {
            return false;
        };
        let connection = self.connections.remove(position);
        for endpoint in [connection.source(), connection.target()] {
            if let Ok(port) = self.port_mut(endpoint) {
                port.detach(connection_id);
            }
        }
        log::debug!(
            "Disconnected {} -> {}",
            connection.source(),
            connection.target()
        );
        true
    }

    /// Set the local value of an input port
    pub fn set_input_value(&self, node_id: &str, port: &str, value: Option<Value>) -> Result<()> {
        self.port(&PortRef::input(node_id, port))?.set_value(value);
        Ok(())
    }

    /// Connections whose target is a data input of `node_id`
    pub fn incoming_data(&self, node_id: &str) -> impl Iterator<Item = &Connection> + '_ {
        let node_id = node_id.to_string();
        self.connections
            .iter()
            .filter(move |c| !c.is_flow() && c.target().node == node_id)
    }

    /// Connections whose source is a data output of `node_id`
    pub fn outgoing_data(&self, node_id: &str) -> impl Iterator<Item = &Connection> + '_ {
        let node_id = node_id.to_string();
        self.connections
            .iter()
            .filter(move |c| !c.is_flow() && c.source().node == node_id)
    }

    /// Flow-in ports reached from one flow-out port
    pub fn flow_targets(&self, node_id: &str, flow_out: &str) -> Vec<PortRef> {
        self.connections
            .iter()
            .filter(|c| {
                c.is_flow() && c.source().node == node_id && c.source().name == flow_out
            })
            .map(|c| c.target().clone())
            .collect()
    }

    /// Upstream nodes feeding this node's data inputs, without duplicates
    pub fn data_dependencies(&self, node_id: &str) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = Vec::new();
        for connection in self.incoming_data(node_id) {
            if !deps.contains(&connection.source().node) {
                deps.push(connection.source().node.clone());
            }
        }
        deps
    }

    /// Nodes reached from `starts` along data and flow connections
    ///
    /// The starts themselves are included. The walk never passes through
    /// `barrier`.
    pub fn downstream_nodes(
        &self,
        starts: impl IntoIterator<Item = NodeId>,
        barrier: Option<&str>,
    ) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = starts.into_iter().collect();

        while let Some(node_id) = queue.pop_front() {
            if barrier == Some(node_id.as_str()) || !seen.insert(node_id.clone()) {
                continue;
            }
            queue.extend(
                self.connections
                    .iter()
                    .filter(|c| c.source().node == node_id)
                    .map(|c| c.target().node.clone()),
            );
        }
        seen
    }

    /// Effective value of an input port
    ///
    /// Connected inputs read the cached output of their source through the
    /// context and coerce it to the declared type. Unconnected inputs, or
    /// inputs whose value cannot be coerced, fall back to the local value.
    pub fn effective_input_value(
        &self,
        node_id: &str,
        port: &str,
        context: &ExecutionContext,
        converters: &ConverterRegistry,
    ) -> Result<Option<Value>> {
        let input = self.port(&PortRef::input(node_id, port))?;

        for connection_id in input.connections() {
            let Some(connection) = self.connection(connection_id) else {
                continue;
            };
            let source = connection.source();
            if let Some(cached) = context.get_cached_output(&source.node, &source.name) {
                match converters.try_convert(&cached, input.data_type()) {
                    Some(converted) => return Ok(Some(converted)),
                    None => log::debug!(
                        "Could not coerce {} into {} for {}.{}; using local value",
                        cached.data_type(),
                        input.data_type(),
                        node_id,
                        port
                    ),
                }
                break;
            }
        }

        Ok(input.value())
    }

    /// Effective values of every data input that has one
    pub fn effective_inputs(
        &self,
        node_id: &str,
        context: &ExecutionContext,
        converters: &ConverterRegistry,
    ) -> Result<HashMap<PortId, Value>> {
        let node = self.require_node(node_id)?;
        let mut inputs = HashMap::new();
        for port in node.ports(PortDirection::Input) {
            if let Some(value) = self.effective_input_value(node_id, port.name(), context, converters)? {
                inputs.insert(port.name().to_string(), value);
            }
        }
        Ok(inputs)
    }
}

fn port_not_found(port: &PortRef) -> NodeEngineError {
    NodeEngineError::PortNotFound {
        node_id: port.node.clone(),
        direction: port.direction,
        port: port.name.clone(),
    }
}

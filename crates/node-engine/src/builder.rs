//! Fluent builder for graphs
//!
//! Provides a fluent API for constructing graphs programmatically. The
//! first failing step is remembered and returned from [`GraphBuilder::build`],
//! so chains do not need a `?` after every call.

use crate::error::{NodeEngineError, Result};
use crate::graph::Graph;
use crate::node::{Node, NodeBehavior};
use crate::registry::NodeRegistry;
use crate::types::NodeId;
use crate::value::Value;

/// Fluent builder for constructing graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("wf-1", "My Workflow")
///     .node_of_type(&registry, "five", "constant")
///     .at((0.0, 0.0))
///     .value("five", "value", Value::Double(5.0))
///     .node_of_type(&registry, "add", "add")
///     .connect_data("five", "value", "add", "a")
///     .build()?;
/// ```
pub struct GraphBuilder {
    graph: Graph,
    last: Option<NodeId>,
    error: Option<NodeEngineError>,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id, name),
            last: None,
            error: None,
        }
    }

    /// Add a node with a concrete behavior
    pub fn node(self, id: impl Into<String>, behavior: impl NodeBehavior + 'static) -> Self {
        self.push(Ok(Node::with_behavior(id, behavior)))
    }

    /// Add a node created from a registered node type
    pub fn node_of_type(
        self,
        registry: &NodeRegistry,
        id: impl Into<String>,
        node_type: &str,
    ) -> Self {
        let node = registry.create_node(id, node_type);
        self.push(node)
    }

    /// Set the position of the most recently added node
    ///
    /// Must be called immediately after `node` or `node_of_type`.
    pub fn at(mut self, position: (f64, f64)) -> Self {
        if let Some(id) = &self.last {
            if let Some(node) = self.graph.node_mut(id) {
                node.set_position(position);
            }
        }
        self
    }

    /// Set the local value of a data input
    pub fn value(self, node: &str, port: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.step(|graph| graph.set_input_value(node, port, Some(value)))
    }

    /// Connect a data output to a data input
    pub fn connect_data(
        self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Self {
        self.step(|graph| {
            graph
                .connect_data(source, source_port, target, target_port)
                .map(|_| ())
        })
    }

    /// Connect a flow-out port to a flow-in port
    pub fn connect_flow(
        self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Self {
        self.step(|graph| {
            graph
                .connect_flow(source, source_port, target, target_port)
                .map(|_| ())
        })
    }

    /// Build the graph, or return the first error encountered
    pub fn build(self) -> Result<Graph> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.graph),
        }
    }

    fn push(mut self, node: Result<Node>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let added = node.and_then(|node| {
            let id = node.id().to_string();
            self.graph.add_node(node).map(|_| id)
        });
        match added {
            Ok(id) => self.last = Some(id),
            Err(e) => self.error = Some(e),
        }
        self
    }

    fn step(mut self, f: impl FnOnce(&mut Graph) -> Result<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = f(&mut self.graph) {
                self.error = Some(e);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BranchNode, ConstNode, ScaleNode, StepNode};
    use crate::types::PortDirection;

    #[test]
    fn test_build_graph() {
        let graph = GraphBuilder::new("wf-1", "Test")
            .node("c", ConstNode::double(2.0))
            .at((100.0, 50.0))
            .node("s", ScaleNode::new(3.0))
            .node("if", BranchNode::new())
            .node("step", StepNode::new())
            .connect_data("c", "value", "s", "value")
            .connect_flow("if", "true", "step", "exec")
            .value("if", "condition", true)
            .build()
            .unwrap();

        assert_eq!(graph.id(), "wf-1");
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.connections().len(), 2);
        assert_eq!(graph.node("c").unwrap().position(), (100.0, 50.0));
        assert_eq!(graph.node("s").unwrap().position(), (0.0, 0.0));
        assert_eq!(
            graph.node("if").unwrap().input("condition").unwrap().value(),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn test_build_from_registry() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(ScaleNode::new(1.0)));

        let graph = GraphBuilder::new("wf", "Registry")
            .node_of_type(&registry, "s", "scale")
            .build()
            .unwrap();
        assert_eq!(graph.node("s").unwrap().ports(PortDirection::Input).len(), 1);

        let err = GraphBuilder::new("wf", "Registry")
            .node_of_type(&registry, "x", "missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeEngineError::UnknownNodeType(_)));
    }

    #[test]
    fn test_first_error_is_kept() {
        let err = GraphBuilder::new("wf", "Errors")
            .node("c", ConstNode::double(1.0))
            .node("c", ConstNode::double(2.0))
            .connect_data("c", "value", "missing", "value")
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeEngineError::DuplicateNode(_)));
    }
}

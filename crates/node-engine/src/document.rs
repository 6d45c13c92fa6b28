//! Serializable graph documents
//!
//! A [`GraphDocument`] is the on-disk form of a [`Graph`]. Nodes are stored
//! by type and rebuilt through a [`NodeRegistry`], so their ports always
//! come from the current metadata; connections are stored as endpoint
//! triples and re-attached with the usual checks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::graph::Graph;
use crate::node::Node;
use crate::port::{Connection, PortRef};
use crate::registry::NodeRegistry;
use crate::types::{PortDirection, PortId};
use crate::value::Value;

/// A node as stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub id: String,
    pub node_type: String,
    #[serde(default)]
    pub position: (f64, f64),
    /// Values from the behavior's `save_state`
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
    /// Local input values keyed by port name
    #[serde(default)]
    pub values: Vec<(PortId, Value)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden: Vec<(PortDirection, PortId)>,
}

/// A connection as stored in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDocument {
    pub id: String,
    pub source: PortRef,
    pub target: PortRef,
}

/// A whole graph as stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeDocument>,
    pub connections: Vec<ConnectionDocument>,
}

impl GraphDocument {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a document from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let document = Self::from_json_str(&json)?;
        log::debug!(
            "Loaded graph '{}' ({} nodes) from {}",
            document.id,
            document.nodes.len(),
            path.display()
        );
        Ok(document)
    }

    /// Write the document to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

impl Graph {
    /// Capture the graph as a document
    ///
    /// Fails if a node body is running, since its state cannot be read
    /// consistently.
    pub fn to_document(&self) -> Result<GraphDocument> {
        let mut nodes = Vec::with_capacity(self.node_count());
        for node in self.nodes() {
            let state = node
                .behavior()
                .try_lock()
                .map_err(|_| {
                    NodeEngineError::failed(format!("node '{}' is running", node.id()))
                })?
                .save_state();

            let values = node
                .ports(PortDirection::Input)
                .iter()
                .filter_map(|p| p.value().map(|v| (p.name().to_string(), v)))
                .collect();

            let hidden = [
                PortDirection::Input,
                PortDirection::Output,
                PortDirection::FlowIn,
                PortDirection::FlowOut,
            ]
            .into_iter()
            .flat_map(|direction| {
                node.ports(direction)
                    .iter()
                    .filter(|p| !p.is_visible())
                    .map(move |p| (direction, p.name().to_string()))
            })
            .collect();

            nodes.push(NodeDocument {
                id: node.id().to_string(),
                node_type: node.node_type().to_string(),
                position: node.position(),
                state,
                values,
                hidden,
            });
        }

        let connections = self
            .connections()
            .iter()
            .map(|c| ConnectionDocument {
                id: c.id().to_string(),
                source: c.source().clone(),
                target: c.target().clone(),
            })
            .collect();

        Ok(GraphDocument {
            id: self.id().to_string(),
            name: self.name().to_string(),
            nodes,
            connections,
        })
    }

    /// Rebuild a graph from a document
    ///
    /// Each node's state is loaded before its ports are built, so behaviors
    /// whose port list depends on saved state come back with the same
    /// shape.
    pub fn from_document(document: &GraphDocument, registry: &NodeRegistry) -> Result<Self> {
        let mut graph = Graph::new(document.id.clone(), document.name.clone());

        for doc in &document.nodes {
            let mut behavior = registry.create_behavior(&doc.node_type)?;
            behavior.load_state(&doc.state)?;
            let mut node = Node::new(doc.id.clone(), behavior);
            node.set_position(doc.position);

            for (direction, name) in &doc.hidden {
                node.port_mut(*direction, name)
                    .ok_or_else(|| NodeEngineError::PortNotFound {
                        node_id: doc.id.clone(),
                        direction: *direction,
                        port: name.clone(),
                    })?
                    .set_visible(false);
            }
            graph.add_node(node)?;

            for (port, value) in &doc.values {
                graph.set_input_value(&doc.id, port, Some(value.clone()))?;
            }
        }

        for doc in &document.connections {
            let connection =
                Connection::with_id(doc.id.clone(), doc.source.clone(), doc.target.clone())?;
            graph.attach(connection)?;
        }

        log::debug!(
            "Rebuilt graph '{}' with {} nodes and {} connections",
            graph.id(),
            graph.node_count(),
            graph.connections().len()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBehavior;
    use crate::testing::{BranchNode, ConstNode, ScaleNode, StepNode};
    use crate::types::PortDataType;
    use tokio_test::assert_ok;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(|| -> Box<dyn NodeBehavior> { Box::new(ConstNode::double(0.0)) });
        registry.register(|| Box::new(ScaleNode::new(2.0)));
        registry.register(|| Box::new(BranchNode::new()));
        registry.register(|| Box::new(StepNode::new()));
        registry
    }

    fn sample_graph() -> Graph {
        let mut graph = Graph::new("doc", "Document");
        let mut source = Node::with_behavior("c", ConstNode::double(4.0));
        source.set_position((10.0, 20.0));
        graph.add_node(source).unwrap();
        graph
            .add_node(Node::with_behavior("s", ScaleNode::new(2.0)))
            .unwrap();
        graph
            .add_node(Node::with_behavior("if", BranchNode::new()))
            .unwrap();
        graph
            .add_node(Node::with_behavior("step", StepNode::new()))
            .unwrap();
        graph.connect_data("c", "value", "s", "value").unwrap();
        graph.connect_flow("if", "true", "step", "exec").unwrap();
        graph
            .set_input_value("if", "condition", Some(Value::Bool(true)))
            .unwrap();
        graph
            .node_mut("step")
            .unwrap()
            .port_mut(PortDirection::Output, "value")
            .unwrap()
            .set_visible(false);
        graph
    }

    #[test]
    fn test_document_captures_graph() {
        let document = sample_graph().to_document().unwrap();

        assert_eq!(document.nodes.len(), 4);
        assert_eq!(document.connections.len(), 2);

        let constant = &document.nodes[0];
        assert_eq!(constant.node_type, "test-const");
        assert_eq!(constant.position, (10.0, 20.0));
        assert_eq!(constant.state.get("value"), Some(&serde_json::json!(4.0)));

        let branch = &document.nodes[2];
        assert_eq!(
            branch.values,
            vec![("condition".to_string(), Value::Bool(true))]
        );
        assert_eq!(
            document.nodes[3].hidden,
            vec![(PortDirection::Output, "value".to_string())]
        );
    }

    #[test]
    fn test_graph_rebuilt_from_document() {
        let original = sample_graph();
        let document = original.to_document().unwrap();
        let rebuilt = Graph::from_document(&document, &registry()).unwrap();

        assert_eq!(rebuilt.node_count(), 4);
        assert_eq!(rebuilt.connections(), original.connections());
        assert_eq!(rebuilt.node("c").unwrap().position(), (10.0, 20.0));
        assert_eq!(
            rebuilt.node("c").unwrap().output("value").unwrap().data_type(),
            PortDataType::Double
        );
        assert_eq!(
            rebuilt.node("if").unwrap().input("condition").unwrap().value(),
            Some(Value::Bool(true))
        );
        assert!(!rebuilt.node("step").unwrap().output("value").unwrap().is_visible());
        assert!(rebuilt.node("step").unwrap().is_flow_driven());
        assert_eq!(rebuilt.to_document().unwrap(), document);
    }

    #[tokio::test]
    async fn test_restored_state_is_used_when_running() {
        let document = sample_graph().to_document().unwrap();
        let graph = Graph::from_document(&document, &registry()).unwrap();

        let report = graph
            .execute(Default::default(), &Default::default())
            .await
            .unwrap();
        assert_eq!(report.output("s", "result"), Some(&Value::Double(8.0)));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let document = sample_graph().to_document().unwrap();
        assert_ok!(document.save(&path));
        let loaded = assert_ok!(GraphDocument::load(&path));
        assert_eq!(loaded, document);
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let mut document = sample_graph().to_document().unwrap();
        document.nodes[0].node_type = "missing".to_string();

        let err = Graph::from_document(&document, &registry()).unwrap_err();
        assert!(matches!(err, NodeEngineError::UnknownNodeType(_)));
    }

    #[test]
    fn test_invalid_connection_rejected() {
        let mut document = sample_graph().to_document().unwrap();
        document.connections[0].target = PortRef::input("s", "missing");

        let err = Graph::from_document(&document, &registry()).unwrap_err();
        assert!(matches!(err, NodeEngineError::PortNotFound { .. }));
    }
}

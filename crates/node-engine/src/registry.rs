//! Node type registry
//!
//! Maps node type strings to metadata and behavior factories, so graphs
//! can be rebuilt from documents and editors can list what is available.
//!
//! # Usage
//!
//! ```ignore
//! use node_engine::{NodeRegistration, NodeRegistry};
//!
//! // In a node crate, next to the behavior:
//! fn create() -> Box<dyn NodeBehavior> { Box::new(AddNode::default()) }
//! inventory::submit!(NodeRegistration(create));
//!
//! // In the host:
//! let registry = NodeRegistry::with_builtins();
//! let node = registry.create_node("add-1", "add")?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::NodeMetadata;
use crate::error::{NodeEngineError, Result};
use crate::node::{Node, NodeBehavior};
use crate::types::NodeCategory;

/// Link-time registration of a built-in node type
///
/// Node crates submit one of these per behavior with
/// `inventory::submit!`; [`NodeRegistry::with_builtins`] collects them.
pub struct NodeRegistration(pub fn() -> Box<dyn NodeBehavior>);

inventory::collect!(NodeRegistration);

type Factory = Arc<dyn Fn() -> Box<dyn NodeBehavior> + Send + Sync>;

/// A registration entry combining metadata with its factory
struct RegistryEntry {
    metadata: NodeMetadata,
    factory: Factory,
}

/// Registry of node types with their metadata and factories
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::with_builtins();
/// registry.merge(plugin_registry); // later entries win
/// ```
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every node type submitted through `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            registry.register(registration.0);
        }
        log::debug!("Collected {} built-in node types", registry.entries.len());
        registry
    }

    /// Register a node type
    ///
    /// The factory is called once to read the metadata; the node type it
    /// reports becomes the registry key. A previous entry with the same
    /// type is replaced.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn NodeBehavior> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        self.entries.insert(
            metadata.node_type.clone(),
            RegistryEntry {
                metadata,
                factory: Arc::new(factory),
            },
        );
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<&NodeMetadata> {
        self.entries.get(node_type).map(|e| &e.metadata)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&NodeMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Get metadata grouped by category
    pub fn metadata_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeMetadata>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Create a fresh behavior for a node type
    pub fn create_behavior(&self, node_type: &str) -> Result<Box<dyn NodeBehavior>> {
        self.entries
            .get(node_type)
            .map(|e| (e.factory)())
            .ok_or_else(|| NodeEngineError::UnknownNodeType(node_type.to_string()))
    }

    /// Create a node with ports built from the type's metadata
    pub fn create_node(&self, id: impl Into<String>, node_type: &str) -> Result<Node> {
        Ok(Node::new(id, self.create_behavior(node_type)?))
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BranchNode, ConstNode, ScaleNode};
    use crate::types::PortDirection;

    #[test]
    fn test_register_and_lookup_metadata() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(ScaleNode::new(2.0)));

        assert!(registry.has_node_type("scale"));
        assert!(!registry.has_node_type("unknown"));

        let meta = registry.get_metadata("scale").unwrap();
        assert_eq!(meta.label, "Scale");
    }

    #[test]
    fn test_create_node_builds_ports() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(BranchNode::new()));

        let node = registry.create_node("if-1", "test-branch").unwrap();
        assert_eq!(node.id(), "if-1");
        assert_eq!(node.ports(PortDirection::FlowOut).len(), 2);

        let err = registry.create_node("x", "missing").unwrap_err();
        assert!(matches!(err, NodeEngineError::UnknownNodeType(_)));
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = NodeRegistry::new();
        registry1.register(|| Box::new(ScaleNode::new(1.0)));
        registry1.register(|| Box::new(ConstNode::double(1.0)));

        let mut registry2 = NodeRegistry::new();
        registry2.register(|| Box::new(ScaleNode::new(9.0)));

        registry1.merge(registry2);
        assert_eq!(registry1.all_metadata().len(), 2);
        assert_eq!(registry1.node_types(), vec!["scale", "test-const"]);
    }

    #[test]
    fn test_metadata_by_category() {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(ScaleNode::new(1.0)));
        registry.register(|| Box::new(ConstNode::double(1.0)));
        registry.register(|| Box::new(BranchNode::new()));

        let grouped = registry.metadata_by_category();
        assert_eq!(grouped.get(&NodeCategory::Math).unwrap().len(), 1);
        assert_eq!(grouped.get(&NodeCategory::Input).unwrap().len(), 1);
        assert_eq!(grouped.get(&NodeCategory::Control).unwrap().len(), 1);
    }

    #[test]
    fn test_with_builtins_collects_submissions() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.has_node_type("scale"));
        assert!(registry.has_node_type("countdown"));
    }
}

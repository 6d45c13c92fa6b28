//! Nodes and node behaviors
//!
//! A [`Node`] owns its ports and a boxed [`NodeBehavior`]. Behaviors form a
//! closed contract: every node processes, and optional capabilities
//! (resetting, looping) are discovered through accessor methods rather
//! than through a class hierarchy.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::descriptor::NodeMetadata;
use crate::error::Result;
use crate::extensions::ExecutorExtensions;
use crate::port::Port;
use crate::types::{NodeCategory, NodeId, PortDirection, PortId};
use crate::value::Value;

/// Name of the flow-out port a loop follows once it has finished
pub const LOOP_COMPLETED_PORT: &str = "completed";

/// Behavior of a node type
///
/// # Example
///
/// ```ignore
/// struct Negate;
///
/// #[async_trait]
/// impl NodeBehavior for Negate {
///     fn metadata(&self) -> NodeMetadata {
///         NodeMetadata::new("negate", NodeCategory::Math, "Negate", "Flips the sign")
///             .input(PortMetadata::new("value", "Value", PortDataType::Double))
///             .output(PortMetadata::new("result", "Result", PortDataType::Double))
///     }
///
///     async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
///         let value = ctx.input_f64("value").unwrap_or(0.0);
///         ctx.set_output("result", -value);
///         Ok(FlowActivation::none())
///     }
/// }
/// ```
#[async_trait]
pub trait NodeBehavior: Send {
    /// Describe the node type and its ports
    fn metadata(&self) -> NodeMetadata;

    /// Run the node body
    ///
    /// Reads inputs from and writes outputs to `ctx`, and returns the
    /// flow-out ports to activate (none for pure data nodes).
    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation>;

    /// Capability: reset internal state before a loop starts
    fn as_resettable(&mut self) -> Option<&mut dyn Resettable> {
        None
    }

    /// Capability: act as a loop header
    fn as_loop(&mut self) -> Option<&mut dyn LoopBehavior> {
        None
    }

    /// Apply a run parameter directly to the behavior
    ///
    /// Returns `false` when the behavior does not take overrides, in which
    /// case the engine writes the value to the node's first data input.
    fn apply_override(&mut self, _value: &Value) -> bool {
        false
    }

    /// Values to persist, keyed by declared names
    fn save_state(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    /// Restore values written by [`NodeBehavior::save_state`]
    fn load_state(&mut self, _state: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        Ok(())
    }
}

/// Behaviors that can clear internal state
pub trait Resettable {
    fn reset(&mut self);
}

/// Loop header capability
#[async_trait]
pub trait LoopBehavior: Send {
    /// Whether another iteration should run
    async fn should_continue(&mut self, cancel: &CancellationToken) -> Result<bool>;

    /// Whether the loop asked to stop early
    fn is_loop_completed(&self) -> bool {
        false
    }

    /// Flow-out port followed after the loop terminates
    fn completed_port(&self) -> &str {
        LOOP_COMPLETED_PORT
    }
}

/// Flow-out ports a node chose to activate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowActivation {
    ports: Vec<PortId>,
}

impl FlowActivation {
    /// Activate nothing; ends this branch of execution
    pub fn none() -> Self {
        Self::default()
    }

    /// Activate a single flow-out port
    pub fn port(name: impl Into<String>) -> Self {
        Self {
            ports: vec![name.into()],
        }
    }

    /// Activate several flow-out ports, followed in order
    pub fn ports<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.ports.push(name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ports.iter().any(|p| p == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortId> {
        self.ports.iter()
    }

    pub fn into_ports(self) -> Vec<PortId> {
        self.ports
    }
}

/// Everything a node body can see while it runs
pub struct ProcessContext<'a> {
    node_id: &'a str,
    inputs: HashMap<PortId, Value>,
    outputs: HashMap<PortId, Value>,
    active_flow_input: Option<PortId>,
    cancel: &'a CancellationToken,
    extensions: &'a ExecutorExtensions,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        node_id: &'a str,
        inputs: HashMap<PortId, Value>,
        active_flow_input: Option<PortId>,
        cancel: &'a CancellationToken,
        extensions: &'a ExecutorExtensions,
    ) -> Self {
        Self {
            node_id,
            inputs,
            outputs: HashMap::new(),
            active_flow_input,
            cancel,
            extensions,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Effective value of an input port
    pub fn input(&self, port: &str) -> Option<&Value> {
        self.inputs.get(port)
    }

    /// Every input that resolved to a value
    pub fn inputs(&self) -> &HashMap<PortId, Value> {
        &self.inputs
    }

    pub fn input_f64(&self, port: &str) -> Option<f64> {
        self.input(port).and_then(Value::as_f64)
    }

    pub fn input_i64(&self, port: &str) -> Option<i64> {
        self.input(port).and_then(Value::as_i64)
    }

    /// Truthiness of an input; missing inputs are false
    pub fn input_truthy(&self, port: &str) -> bool {
        self.input(port).map(Value::is_truthy).unwrap_or(false)
    }

    /// Write an output value; cached only if the body succeeds
    pub fn set_output(&mut self, port: impl Into<String>, value: impl Into<Value>) {
        self.outputs.insert(port.into(), value.into());
    }

    /// Outputs written so far
    pub fn outputs(&self) -> &HashMap<PortId, Value> {
        &self.outputs
    }

    pub fn output(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port)
    }

    /// Flow-in port through which this node was entered
    pub fn active_flow_input(&self) -> Option<&str> {
        self.active_flow_input.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Services injected by the engine's owner
    pub fn extensions(&self) -> &ExecutorExtensions {
        self.extensions
    }

    pub(crate) fn into_outputs(self) -> HashMap<PortId, Value> {
        self.outputs
    }
}

/// Capabilities captured when the node is created
#[derive(Debug, Clone, Default)]
struct NodeCapabilities {
    resettable: bool,
    completed_port: Option<PortId>,
}

/// A node instance in a graph
pub struct Node {
    id: NodeId,
    node_type: String,
    label: String,
    category: NodeCategory,
    position: (f64, f64),
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    flow_inputs: Vec<Port>,
    flow_outputs: Vec<Port>,
    capabilities: NodeCapabilities,
    processing: AtomicBool,
    behavior: tokio::sync::Mutex<Box<dyn NodeBehavior>>,
}

impl Node {
    /// Create a node, building its ports from the behavior's metadata
    pub fn new(id: impl Into<String>, mut behavior: Box<dyn NodeBehavior>) -> Self {
        let metadata = behavior.metadata();
        let capabilities = NodeCapabilities {
            resettable: behavior.as_resettable().is_some(),
            completed_port: behavior.as_loop().map(|l| l.completed_port().to_string()),
        };
        let build = |direction: PortDirection| {
            metadata
                .ports(direction)
                .iter()
                .map(|p| Port::from_metadata(direction, p))
                .collect::<Vec<_>>()
        };

        Self {
            id: id.into(),
            inputs: build(PortDirection::Input),
            outputs: build(PortDirection::Output),
            flow_inputs: build(PortDirection::FlowIn),
            flow_outputs: build(PortDirection::FlowOut),
            node_type: metadata.node_type,
            label: metadata.label,
            category: metadata.category,
            position: (0.0, 0.0),
            capabilities,
            processing: AtomicBool::new(false),
            behavior: tokio::sync::Mutex::new(behavior),
        }
    }

    /// Create a node from a concrete behavior
    pub fn with_behavior(id: impl Into<String>, behavior: impl NodeBehavior + 'static) -> Self {
        Self::new(id, Box::new(behavior))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category(&self) -> NodeCategory {
        self.category
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn set_position(&mut self, position: (f64, f64)) {
        self.position = position;
    }

    /// Whether the node body is currently running
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub(crate) fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::Release);
    }

    /// Ports for one direction, in declaration order
    pub fn ports(&self, direction: PortDirection) -> &[Port] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
            PortDirection::FlowIn => &self.flow_inputs,
            PortDirection::FlowOut => &self.flow_outputs,
        }
    }

    pub(crate) fn ports_mut(&mut self, direction: PortDirection) -> &mut Vec<Port> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
            PortDirection::FlowIn => &mut self.flow_inputs,
            PortDirection::FlowOut => &mut self.flow_outputs,
        }
    }

    pub fn port(&self, direction: PortDirection, name: &str) -> Option<&Port> {
        self.ports(direction).iter().find(|p| p.name() == name)
    }

    pub fn port_mut(&mut self, direction: PortDirection, name: &str) -> Option<&mut Port> {
        self.ports_mut(direction).iter_mut().find(|p| p.name() == name)
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.port(PortDirection::Input, name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.port(PortDirection::Output, name)
    }

    /// Whether any flow-in port has a connection
    pub fn is_flow_driven(&self) -> bool {
        self.flow_inputs.iter().any(Port::is_connected)
    }

    pub fn is_loop(&self) -> bool {
        self.capabilities.completed_port.is_some()
    }

    pub fn is_resettable(&self) -> bool {
        self.capabilities.resettable
    }

    /// Flow-out port a loop node follows after finishing
    pub fn loop_completed_port(&self) -> Option<&str> {
        self.capabilities.completed_port.as_deref()
    }

    pub(crate) fn behavior(&self) -> &tokio::sync::Mutex<Box<dyn NodeBehavior>> {
        &self.behavior
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("position", &self.position)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("flow_inputs", &self.flow_inputs)
            .field("flow_outputs", &self.flow_outputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountdownLoop, ScaleNode};

    #[test]
    fn test_ports_created_from_metadata() {
        let node = Node::with_behavior("scale-1", ScaleNode::new(2.0));
        assert_eq!(node.node_type(), "scale");
        assert_eq!(node.ports(PortDirection::Input).len(), 1);
        assert_eq!(node.ports(PortDirection::Output).len(), 1);
        assert!(node.input("value").is_some());
        assert!(node.output("value").is_none());
        assert!(!node.is_loop());
        assert!(!node.is_flow_driven());
    }

    #[test]
    fn test_loop_capability_detected() {
        let node = Node::with_behavior("loop", CountdownLoop::new(3));
        assert!(node.is_loop());
        assert!(node.is_resettable());
        assert_eq!(node.loop_completed_port(), Some(LOOP_COMPLETED_PORT));
    }

    #[test]
    fn test_flow_activation() {
        let mut activation = FlowActivation::port("true");
        activation.push("after");
        assert!(activation.contains("after"));
        assert_eq!(activation.into_ports(), vec!["true", "after"]);
        assert!(FlowActivation::none().is_empty());
    }

    #[tokio::test]
    async fn test_process_context_outputs() {
        let cancel = CancellationToken::new();
        let extensions = ExecutorExtensions::new();
        let mut inputs = HashMap::new();
        inputs.insert("value".to_string(), Value::Double(2.5));

        let mut behavior = ScaleNode::new(2.0);
        let mut ctx = ProcessContext::new("scale-1", inputs, None, &cancel, &extensions);
        let activation = behavior.process(&mut ctx).await.unwrap();

        assert!(activation.is_empty());
        assert_eq!(ctx.into_outputs().get("result"), Some(&Value::Double(5.0)));
    }
}

//! Output Node
//!
//! Publishes a value to the host. The host registers an [`OutputCollector`]
//! under [`extension_keys::OUTPUT_COLLECTOR`] to receive the values; without
//! one the node only logs.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use node_engine::{
    extension_keys, FlowActivation, NodeBehavior, NodeCategory, NodeId, NodeMetadata,
    NodeRegistration, PortDataType, PortMetadata, ProcessContext, Result, Value,
};

/// Values published by output nodes, in the order they arrived
#[derive(Debug, Default)]
pub struct OutputCollector {
    values: Mutex<Vec<(NodeId, Value)>>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_id: &str, value: Value) {
        self.values.lock().push((node_id.to_string(), value));
    }

    /// Every value a node published
    pub fn values(&self, node_id: &str) -> Vec<Value> {
        self.values
            .lock()
            .iter()
            .filter(|(id, _)| id == node_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Most recent value a node published
    pub fn last(&self, node_id: &str) -> Option<Value> {
        self.values
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == node_id)
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Remove and return everything collected so far
    pub fn take(&self) -> Vec<(NodeId, Value)> {
        std::mem::take(&mut *self.values.lock())
    }
}

/// Output Node
///
/// # Inputs
/// - `value` - The value to publish
///
/// # Outputs
/// - `value` - The published value, so the run caches it for the host
#[derive(Debug, Clone, Default)]
pub struct OutputNode;

impl OutputNode {
    /// Port ID for the published value, on both sides
    pub const PORT_VALUE: &'static str = "value";
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(OutputNode)
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for OutputNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "output",
            NodeCategory::Output,
            "Output",
            "Publishes a value to the host",
        )
        .input(PortMetadata::new(Self::PORT_VALUE, "Value", PortDataType::Any))
        .output(PortMetadata::new(Self::PORT_VALUE, "Value", PortDataType::Any))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        let value = ctx.input(Self::PORT_VALUE).cloned().unwrap_or_default();
        log::debug!("Output '{}': {}", ctx.node_id(), value);

        if let Some(collector) = ctx
            .extensions()
            .get::<Arc<OutputCollector>>(extension_keys::OUTPUT_COLLECTOR)
        {
            collector.record(ctx.node_id(), value.clone());
        }
        ctx.set_output(Self::PORT_VALUE, value);
        Ok(FlowActivation::none())
    }
}

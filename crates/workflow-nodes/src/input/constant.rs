//! Constant Node
//!
//! Emits a configured value. The value is saved with the graph and can be
//! replaced for a single run through run parameters.

use async_trait::async_trait;
use node_engine::{
    FlowActivation, NodeBehavior, NodeCategory, NodeMetadata, NodeRegistration, PortDataType,
    PortMetadata, ProcessContext, Result, Value,
};

/// Constant Node
///
/// # Outputs
/// - `value` - The configured value (`Null` until one is set)
#[derive(Debug, Clone, Default)]
pub struct ConstantNode {
    value: Value,
}

impl ConstantNode {
    /// Port ID for the value output
    pub const PORT_VALUE: &'static str = "value";
    /// State key holding the configured value
    pub const STATE_VALUE: &'static str = "value";

    /// Create a constant node emitting `value`
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(ConstantNode::default())
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for ConstantNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "constant",
            NodeCategory::Input,
            "Constant",
            "Emits a fixed value",
        )
        .output(PortMetadata::new(Self::PORT_VALUE, "Value", PortDataType::Any))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        ctx.set_output(Self::PORT_VALUE, self.value.clone());
        Ok(FlowActivation::none())
    }

    fn apply_override(&mut self, value: &Value) -> bool {
        self.value = value.clone();
        true
    }

    fn save_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut state = serde_json::Map::new();
        if let Ok(value) = serde_json::to_value(&self.value) {
            state.insert(Self::STATE_VALUE.to_string(), value);
        }
        state
    }

    fn load_state(&mut self, state: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(value) = state.get(Self::STATE_VALUE) {
            self.value = serde_json::from_value(value.clone())?;
        }
        Ok(())
    }
}

//! For Loop Node
//!
//! Runs the nodes connected to `body` a fixed number of times, exposing the
//! zero-based iteration on `index`, then continues on `completed`. The count
//! is part of the node's configuration and can be overridden per run.

use async_trait::async_trait;
use node_engine::{
    CancellationToken, FlowActivation, LoopBehavior, NodeBehavior, NodeCategory,
    NodeEngineError, NodeMetadata, NodeRegistration, PortDataType, PortMetadata, ProcessContext,
    Resettable, Result, Value, LOOP_COMPLETED_PORT,
};

/// For Loop Node
///
/// # Outputs
/// - `index` - Zero-based index of the running iteration
///
/// # Flow
/// - `exec` in; `body` once per iteration, `completed` at the end
///
/// The count is capped at `i32::MAX`, the largest index `index` can carry.
#[derive(Debug, Clone, Default)]
pub struct ForLoopNode {
    count: u32,
    iteration: u32,
}

impl ForLoopNode {
    pub const PORT_INDEX: &'static str = "index";
    pub const FLOW_EXEC: &'static str = "exec";
    /// Flow-out port driving the loop body
    pub const FLOW_BODY: &'static str = "body";
    /// State key holding the iteration count
    pub const STATE_COUNT: &'static str = "count";
    /// Largest accepted iteration count
    pub const MAX_COUNT: u32 = i32::MAX as u32;

    pub fn new(count: u32) -> Self {
        Self {
            count: count.min(Self::MAX_COUNT),
            iteration: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(ForLoopNode::default())
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for ForLoopNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "for-loop",
            NodeCategory::Control,
            "For Loop",
            "Runs its body a fixed number of times",
        )
        .output(PortMetadata::new(Self::PORT_INDEX, "Index", PortDataType::Int))
        .flow_input(Self::FLOW_EXEC, "Exec")
        .flow_output(Self::FLOW_BODY, "Body")
        .flow_output(LOOP_COMPLETED_PORT, "Completed")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        let index = i32::try_from(self.iteration.saturating_sub(1)).unwrap_or(i32::MAX);
        ctx.set_output(Self::PORT_INDEX, Value::Int(index));
        Ok(FlowActivation::port(Self::FLOW_BODY))
    }

    fn as_resettable(&mut self) -> Option<&mut dyn Resettable> {
        Some(self)
    }

    fn as_loop(&mut self) -> Option<&mut dyn LoopBehavior> {
        Some(self)
    }

    fn apply_override(&mut self, value: &Value) -> bool {
        match value.as_i64() {
            Some(count) => {
                self.count = count.clamp(0, i64::from(Self::MAX_COUNT)) as u32;
                true
            }
            None => false,
        }
    }

    fn save_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut state = serde_json::Map::new();
        state.insert(Self::STATE_COUNT.to_string(), self.count.into());
        state
    }

    fn load_state(&mut self, state: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(count) = state.get(Self::STATE_COUNT) {
            self.count = count
                .as_u64()
                .and_then(|c| u32::try_from(c).ok())
                .ok_or_else(|| {
                    NodeEngineError::failed(format!("Invalid for-loop count: {}", count))
                })?
                .min(Self::MAX_COUNT);
        }
        Ok(())
    }
}

impl Resettable for ForLoopNode {
    fn reset(&mut self) {
        self.iteration = 0;
    }
}

#[async_trait]
impl LoopBehavior for ForLoopNode {
    async fn should_continue(&mut self, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(NodeEngineError::Cancelled);
        }
        if self.iteration >= self.count {
            return Ok(false);
        }
        self.iteration += 1;
        Ok(true)
    }
}

//! Sequence Node
//!
//! Fans control out to `then_0`, `then_1`, ... in order. Each branch runs
//! to completion before the next one starts.

use async_trait::async_trait;
use node_engine::{
    FlowActivation, NodeBehavior, NodeCategory, NodeEngineError, NodeMetadata, NodeRegistration,
    ProcessContext, Result,
};

const DEFAULT_OUTPUTS: usize = 2;

/// Sequence Node
///
/// The number of `then_N` ports is saved with the node, so a document
/// rebuilds the same ports.
#[derive(Debug, Clone)]
pub struct SequenceNode {
    outputs: usize,
}

impl SequenceNode {
    pub const FLOW_EXEC: &'static str = "exec";
    /// State key holding the number of outputs
    pub const STATE_OUTPUTS: &'static str = "outputs";

    pub fn new(outputs: usize) -> Self {
        Self { outputs }
    }

    /// Name of the `index`-th flow-out port
    pub fn then_port(index: usize) -> String {
        format!("then_{}", index)
    }
}

impl Default for SequenceNode {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUTS)
    }
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(SequenceNode::default())
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for SequenceNode {
    fn metadata(&self) -> NodeMetadata {
        let mut meta = NodeMetadata::new(
            "sequence",
            NodeCategory::Control,
            "Sequence",
            "Runs each output branch in order",
        )
        .flow_input(Self::FLOW_EXEC, "Exec");
        for index in 0..self.outputs {
            meta = meta.flow_output(Self::then_port(index), format!("Then {}", index));
        }
        meta
    }

    async fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        Ok(FlowActivation::ports((0..self.outputs).map(Self::then_port)))
    }

    fn save_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut state = serde_json::Map::new();
        state.insert(Self::STATE_OUTPUTS.to_string(), self.outputs.into());
        state
    }

    fn load_state(&mut self, state: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(outputs) = state.get(Self::STATE_OUTPUTS) {
            self.outputs = outputs
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    NodeEngineError::failed(format!("Invalid sequence output count: {}", outputs))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::{CancellationToken, ExecutorExtensions};
    use std::collections::HashMap;

    #[test]
    fn test_ports_follow_output_count() {
        let meta = SequenceNode::new(3).metadata();
        let names: Vec<&str> = meta.flow_outputs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(names, vec!["then_0", "then_1", "then_2"]);
    }

    #[tokio::test]
    async fn test_activates_all_in_order() {
        let cancel = CancellationToken::new();
        let extensions = ExecutorExtensions::new();
        let mut ctx = ProcessContext::new("seq", HashMap::new(), None, &cancel, &extensions);

        let activation = SequenceNode::default().process(&mut ctx).await.unwrap();
        assert_eq!(activation.into_ports(), vec!["then_0", "then_1"]);
    }

    #[test]
    fn test_output_count_state() {
        let mut node = SequenceNode::default();
        let mut state = serde_json::Map::new();
        state.insert("outputs".to_string(), serde_json::json!(4));
        node.load_state(&state).unwrap();
        assert_eq!(node.metadata().flow_outputs.len(), 4);

        state.insert("outputs".to_string(), serde_json::json!("four"));
        assert!(node.load_state(&state).is_err());
    }
}

//! If Node
//!
//! Branches control flow on the truthiness of its condition. Only the
//! chosen flow-out port is activated; nodes reachable solely through the
//! other one never run.

use async_trait::async_trait;
use node_engine::{
    FlowActivation, NodeBehavior, NodeCategory, NodeMetadata, NodeRegistration, PortDataType,
    PortMetadata, ProcessContext, Result,
};

/// If Node
///
/// # Inputs
/// - `condition` - Any value; numbers are true when non-zero, strings when
///   non-empty and not `"false"` or `"0"`
///
/// # Flow
/// - `exec` in; `true` or `false` out
#[derive(Debug, Clone, Default)]
pub struct IfNode;

impl IfNode {
    /// Port ID for the condition input
    pub const PORT_CONDITION: &'static str = "condition";
    pub const FLOW_EXEC: &'static str = "exec";
    /// Flow-out port taken when the condition holds
    pub const FLOW_TRUE: &'static str = "true";
    /// Flow-out port taken otherwise
    pub const FLOW_FALSE: &'static str = "false";
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(IfNode)
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for IfNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "if",
            NodeCategory::Control,
            "If",
            "Continues on True or False depending on a condition",
        )
        .input(PortMetadata::new(
            Self::PORT_CONDITION,
            "Condition",
            PortDataType::Any,
        ))
        .flow_input(Self::FLOW_EXEC, "Exec")
        .flow_output(Self::FLOW_TRUE, "True")
        .flow_output(Self::FLOW_FALSE, "False")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        let condition = ctx.input_truthy(Self::PORT_CONDITION);
        log::debug!("If '{}': condition={}", ctx.node_id(), condition);

        let port = if condition {
            Self::FLOW_TRUE
        } else {
            Self::FLOW_FALSE
        };
        Ok(FlowActivation::port(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::{CancellationToken, ExecutorExtensions, Value};
    use std::collections::HashMap;

    async fn branch(condition: Option<Value>) -> Vec<String> {
        let cancel = CancellationToken::new();
        let extensions = ExecutorExtensions::new();
        let inputs: HashMap<_, _> = condition
            .into_iter()
            .map(|v| ("condition".to_string(), v))
            .collect();
        let mut ctx = ProcessContext::new("if", inputs, None, &cancel, &extensions);
        IfNode.process(&mut ctx).await.unwrap().into_ports()
    }

    #[test]
    fn test_descriptor() {
        let meta = IfNode.metadata();
        assert_eq!(meta.node_type, "if");
        assert_eq!(meta.category, NodeCategory::Control);
        assert_eq!(meta.flow_inputs.len(), 1);
        assert!(meta.flow_outputs.iter().any(|p| p.id == "true"));
        assert!(meta.flow_outputs.iter().any(|p| p.id == "false"));
    }

    #[tokio::test]
    async fn test_branches_on_truthiness() {
        assert_eq!(branch(Some(Value::Double(1.0))).await, vec!["true"]);
        assert_eq!(branch(Some(Value::Int(0))).await, vec!["false"]);
        assert_eq!(branch(Some(Value::from("yes"))).await, vec!["true"]);
        assert_eq!(branch(Some(Value::from("false"))).await, vec!["false"]);
        assert_eq!(branch(None).await, vec!["false"]);
    }
}

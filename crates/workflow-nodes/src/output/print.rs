//! Print Node
//!
//! Logs a value each time control reaches it, then continues on `next`.
//! Lines are also appended to a [`PrintLog`] when the host registers one
//! under [`extension_keys::PRINT_LOG`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use node_engine::{
    extension_keys, FlowActivation, NodeBehavior, NodeCategory, NodeMetadata, NodeRegistration,
    PortDataType, PortMetadata, ProcessContext, Result,
};

/// Lines printed during a run
#[derive(Debug, Default)]
pub struct PrintLog {
    lines: Mutex<Vec<String>>,
}

impl PrintLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// Print Node
///
/// # Inputs
/// - `value` - The value to print
///
/// # Flow
/// - `exec` in, `next` out
#[derive(Debug, Clone, Default)]
pub struct PrintNode;

impl PrintNode {
    pub const PORT_VALUE: &'static str = "value";
    pub const FLOW_EXEC: &'static str = "exec";
    pub const FLOW_NEXT: &'static str = "next";
}

fn create() -> Box<dyn NodeBehavior> {
    Box::new(PrintNode)
}

inventory::submit!(NodeRegistration(create));

#[async_trait]
impl NodeBehavior for PrintNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("print", NodeCategory::Utility, "Print", "Logs a value")
            .input(PortMetadata::new(Self::PORT_VALUE, "Value", PortDataType::Any))
            .flow_input(Self::FLOW_EXEC, "Exec")
            .flow_output(Self::FLOW_NEXT, "Next")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        let line = ctx
            .input(Self::PORT_VALUE)
            .map(|v| v.to_string())
            .unwrap_or_default();
        log::info!("[{}] {}", ctx.node_id(), line);

        if let Some(log) = ctx
            .extensions()
            .get::<Arc<PrintLog>>(extension_keys::PRINT_LOG)
        {
            log.push(line);
        }
        Ok(FlowActivation::port(Self::FLOW_NEXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::{CancellationToken, ExecutorExtensions, Value};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_prints_and_continues() {
        let cancel = CancellationToken::new();
        let print_log = Arc::new(PrintLog::new());
        let mut extensions = ExecutorExtensions::new();
        extensions.set(extension_keys::PRINT_LOG, print_log.clone());

        let inputs = HashMap::from([("value".to_string(), Value::from("hi"))]);
        let mut ctx = ProcessContext::new(
            "p",
            inputs,
            Some("exec".to_string()),
            &cancel,
            &extensions,
        );
        let activation = PrintNode.process(&mut ctx).await.unwrap();

        assert_eq!(activation.into_ports(), vec!["next"]);
        assert_eq!(print_log.lines(), vec!["hi".to_string()]);
    }
}

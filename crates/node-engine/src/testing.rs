//! Node behaviors used by the engine's unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::coercion::ConverterRegistry;
use crate::descriptor::{NodeMetadata, PortMetadata};
use crate::error::{NodeEngineError, Result};
use crate::graph::Graph;
use crate::node::{FlowActivation, LoopBehavior, Node, NodeBehavior, ProcessContext, Resettable};
use crate::registry::NodeRegistration;
use crate::types::{NodeCategory, PortDataType, PortId};
use crate::value::Value;

/// One recorded node body invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub node_id: String,
    pub inputs: HashMap<PortId, Value>,
    pub flow_input: Option<String>,
}

/// Shared log of node body invocations
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, ctx: &ProcessContext<'_>) {
        self.0.lock().push(Call {
            node_id: ctx.node_id().to_string(),
            inputs: ctx.inputs().clone(),
            flow_input: ctx.active_flow_input().map(str::to_string),
        });
    }

    pub fn count(&self, node_id: &str) -> usize {
        self.0.lock().iter().filter(|c| c.node_id == node_id).count()
    }

    pub fn order(&self) -> Vec<String> {
        self.0.lock().iter().map(|c| c.node_id.clone()).collect()
    }

    pub fn calls(&self, node_id: &str) -> Vec<Call> {
        self.0
            .lock()
            .iter()
            .filter(|c| c.node_id == node_id)
            .cloned()
            .collect()
    }
}

fn record(recorder: &Option<Recorder>, ctx: &ProcessContext<'_>) {
    if let Some(recorder) = recorder {
        recorder.record(ctx);
    }
}

/// Emits a fixed value on "value"
pub struct ConstNode {
    data_type: PortDataType,
    value: Value,
    delay: Option<Duration>,
    recorder: Option<Recorder>,
}

impl ConstNode {
    pub fn double(value: f64) -> Self {
        Self::typed(PortDataType::Double, Value::Double(value))
    }

    pub fn typed(data_type: PortDataType, value: Value) -> Self {
        Self {
            data_type,
            value,
            delay: None,
            recorder: None,
        }
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for ConstNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-const", NodeCategory::Input, "Const", "Emits a fixed value")
            .output(PortMetadata::new("value", "Value", self.data_type))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        record(&self.recorder, ctx);
        ctx.set_output("value", self.value.clone());
        Ok(FlowActivation::none())
    }

    fn apply_override(&mut self, value: &Value) -> bool {
        self.value = value.clone();
        true
    }

    fn save_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut state = serde_json::Map::new();
        state.insert("value".to_string(), self.value.to_json());
        state
    }

    fn load_state(&mut self, state: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(value) = state.get("value") {
            let json = Value::Json(value.clone());
            self.value = ConverterRegistry::new()
                .try_convert(&json, self.data_type)
                .unwrap_or(json);
        }
        Ok(())
    }
}

/// Multiplies "value" by a factor into "result"
pub struct ScaleNode {
    factor: f64,
    recorder: Option<Recorder>,
}

impl ScaleNode {
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for ScaleNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("scale", NodeCategory::Math, "Scale", "Multiplies by a factor")
            .input(PortMetadata::new("value", "Value", PortDataType::Double))
            .output(PortMetadata::new("result", "Result", PortDataType::Double))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        let value = ctx.input_f64("value").unwrap_or(0.0);
        ctx.set_output("result", value * self.factor);
        Ok(FlowActivation::none())
    }
}

/// Adds "a" and "b" into "sum"
pub struct SumNode {
    data_type: PortDataType,
    recorder: Option<Recorder>,
}

impl SumNode {
    pub fn new() -> Self {
        Self::typed(PortDataType::Double)
    }

    pub fn typed(data_type: PortDataType) -> Self {
        Self {
            data_type,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for SumNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-sum", NodeCategory::Math, "Sum", "Adds two inputs")
            .input(PortMetadata::new("a", "A", self.data_type))
            .input(PortMetadata::new("b", "B", self.data_type))
            .output(PortMetadata::new("sum", "Sum", PortDataType::Double))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        let a = ctx.input_f64("a").unwrap_or(0.0);
        let b = ctx.input_f64("b").unwrap_or(0.0);
        ctx.set_output("sum", a + b);
        Ok(FlowActivation::none())
    }
}

/// Activates "true" or "false" from the truthiness of "condition"
pub struct BranchNode {
    recorder: Option<Recorder>,
}

impl BranchNode {
    pub fn new() -> Self {
        Self { recorder: None }
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for BranchNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-branch", NodeCategory::Control, "Branch", "Branches on a condition")
            .input(PortMetadata::new("condition", "Condition", PortDataType::Any))
            .flow_input("exec", "Exec")
            .flow_output("true", "True")
            .flow_output("false", "False")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        let port = if ctx.input_truthy("condition") { "true" } else { "false" };
        Ok(FlowActivation::port(port))
    }
}

/// Flow pass-through: "exec" in, "next" out, copies "value" through
pub struct StepNode {
    activate: Vec<String>,
    recorder: Option<Recorder>,
}

impl StepNode {
    pub fn new() -> Self {
        Self {
            activate: vec!["next".to_string()],
            recorder: None,
        }
    }

    /// Activate these ports instead of "next"
    pub fn activating(ports: &[&str]) -> Self {
        Self {
            activate: ports.iter().map(|p| p.to_string()).collect(),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for StepNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-step", NodeCategory::Utility, "Step", "Passes control through")
            .input(PortMetadata::new("value", "Value", PortDataType::Any))
            .output(PortMetadata::new("value", "Value", PortDataType::Any))
            .flow_input("exec", "Exec")
            .flow_output("next", "Next")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        let value = ctx.input("value").cloned().unwrap_or(Value::Null);
        ctx.set_output("value", value);
        Ok(FlowActivation::ports(self.activate.clone()))
    }
}

/// Always fails
pub struct FailNode;

#[async_trait]
impl NodeBehavior for FailNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-fail", NodeCategory::Utility, "Fail", "Always fails")
            .input(PortMetadata::new("value", "Value", PortDataType::Any))
            .output(PortMetadata::new("value", "Value", PortDataType::Any))
            .flow_input("exec", "Exec")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        ctx.set_output("value", Value::Null);
        Err(NodeEngineError::failed("boom"))
    }
}

/// Cancels the run's token, then succeeds
pub struct CancelNode {
    recorder: Option<Recorder>,
}

impl CancelNode {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: Some(recorder.clone()),
        }
    }
}

#[async_trait]
impl NodeBehavior for CancelNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("test-cancel", NodeCategory::Utility, "Cancel", "Cancels the run")
            .input(PortMetadata::new("value", "Value", PortDataType::Any))
            .output(PortMetadata::new("value", "Value", PortDataType::Any))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        ctx.cancellation().cancel();
        ctx.set_output("value", Value::Bool(true));
        Ok(FlowActivation::none())
    }
}

/// Loop header that runs its body a fixed number of times
pub struct CountdownLoop {
    count: u32,
    iteration: u32,
    stop_after: Option<u32>,
    recorder: Option<Recorder>,
}

impl CountdownLoop {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            iteration: 0,
            stop_after: None,
            recorder: None,
        }
    }

    /// Report the loop as completed once this many iterations ran
    pub fn stop_after(mut self, iterations: u32) -> Self {
        self.stop_after = Some(iterations);
        self
    }

    pub fn with_recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }
}

#[async_trait]
impl NodeBehavior for CountdownLoop {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("countdown", NodeCategory::Control, "Countdown", "Repeats its body")
            .output(PortMetadata::new("index", "Index", PortDataType::Int))
            .flow_input("exec", "Exec")
            .flow_output("body", "Body")
            .flow_output("completed", "Completed")
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        record(&self.recorder, ctx);
        ctx.set_output("index", Value::Int(self.iteration.saturating_sub(1) as i32));
        Ok(FlowActivation::port("body"))
    }

    fn as_resettable(&mut self) -> Option<&mut dyn Resettable> {
        Some(self)
    }

    fn as_loop(&mut self) -> Option<&mut dyn LoopBehavior> {
        Some(self)
    }
}

impl Resettable for CountdownLoop {
    fn reset(&mut self) {
        self.iteration = 0;
    }
}

#[async_trait]
impl LoopBehavior for CountdownLoop {
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

    fn is_loop_completed(&self) -> bool {
        self.stop_after.is_some_and(|n| self.iteration >= n)
    }
}

fn create_scale() -> Box<dyn NodeBehavior> {
    Box::new(ScaleNode::new(1.0))
}

fn create_countdown() -> Box<dyn NodeBehavior> {
    Box::new(CountdownLoop::new(1))
}

inventory::submit!(NodeRegistration(create_scale));
inventory::submit!(NodeRegistration(create_countdown));

/// Build a graph from nodes, panicking on duplicate IDs
pub fn graph_of(nodes: Vec<Node>) -> Graph {
    let mut graph = Graph::new("test", "Test");
    for node in nodes {
        graph.add_node(node).expect("unique node ids");
    }
    graph
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

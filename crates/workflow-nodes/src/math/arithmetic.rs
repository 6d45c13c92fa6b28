//! Arithmetic Nodes
//!
//! `add`, `subtract`, `multiply` and `divide` share one behavior and differ
//! only in their operator. Division by zero yields `NaN` rather than an
//! error so a single bad input does not stop the whole run.

use async_trait::async_trait;
use node_engine::{
    FlowActivation, NodeBehavior, NodeCategory, NodeMetadata, NodeRegistration, PortDataType,
    PortMetadata, ProcessContext, Result,
};

/// Binary operator applied by an [`ArithmeticNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn node_type(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "Add",
            ArithmeticOp::Subtract => "Subtract",
            ArithmeticOp::Multiply => "Multiply",
            ArithmeticOp::Divide => "Divide",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "Adds B to A",
            ArithmeticOp::Subtract => "Subtracts B from A",
            ArithmeticOp::Multiply => "Multiplies A by B",
            ArithmeticOp::Divide => "Divides A by B (NaN when B is zero)",
        }
    }

    /// Apply the operator
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Subtract => a - b,
            ArithmeticOp::Multiply => a * b,
            ArithmeticOp::Divide if b == 0.0 => f64::NAN,
            ArithmeticOp::Divide => a / b,
        }
    }
}

/// Arithmetic Node
///
/// # Inputs
/// - `a` - Left operand (defaults to 0)
/// - `b` - Right operand (defaults to 0)
///
/// # Outputs
/// - `result` - `a <op> b`
#[derive(Debug, Clone)]
pub struct ArithmeticNode {
    op: ArithmeticOp,
}

impl ArithmeticNode {
    /// Port ID for the left operand
    pub const PORT_A: &'static str = "a";
    /// Port ID for the right operand
    pub const PORT_B: &'static str = "b";
    /// Port ID for the result
    pub const PORT_RESULT: &'static str = "result";

    pub fn new(op: ArithmeticOp) -> Self {
        Self { op }
    }

    pub fn op(&self) -> ArithmeticOp {
        self.op
    }
}

fn create_add() -> Box<dyn NodeBehavior> {
    Box::new(ArithmeticNode::new(ArithmeticOp::Add))
}

fn create_subtract() -> Box<dyn NodeBehavior> {
    Box::new(ArithmeticNode::new(ArithmeticOp::Subtract))
}

fn create_multiply() -> Box<dyn NodeBehavior> {
    Box::new(ArithmeticNode::new(ArithmeticOp::Multiply))
}

fn create_divide() -> Box<dyn NodeBehavior> {
    Box::new(ArithmeticNode::new(ArithmeticOp::Divide))
}

inventory::submit!(NodeRegistration(create_add));
inventory::submit!(NodeRegistration(create_subtract));
inventory::submit!(NodeRegistration(create_multiply));
inventory::submit!(NodeRegistration(create_divide));

#[async_trait]
impl NodeBehavior for ArithmeticNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            self.op.node_type(),
            NodeCategory::Math,
            self.op.label(),
            self.op.description(),
        )
        .input(PortMetadata::new(Self::PORT_A, "A", PortDataType::Double).with_default(0.0))
        .input(PortMetadata::new(Self::PORT_B, "B", PortDataType::Double).with_default(0.0))
        .output(PortMetadata::new(
            Self::PORT_RESULT,
            "Result",
            PortDataType::Double,
        ))
    }

    async fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<FlowActivation> {
        let a = ctx.input_f64(Self::PORT_A).unwrap_or(0.0);
        let b = ctx.input_f64(Self::PORT_B).unwrap_or(0.0);
        let result = self.op.apply(a, b);

        if result.is_nan() {
            log::debug!(
                "{} '{}': {} {} produced NaN",
                self.op.label(),
                ctx.node_id(),
                a,
                b
            );
        }
        ctx.set_output(Self::PORT_RESULT, result);
        Ok(FlowActivation::none())
    }
}

//! Math nodes
//!
//! Binary arithmetic over `Double` inputs.

mod arithmetic;

pub use arithmetic::{ArithmeticNode, ArithmeticOp};

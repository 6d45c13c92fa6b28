//! Input nodes
//!
//! Nodes that provide values to the rest of the graph.

mod constant;

pub use constant::ConstantNode;

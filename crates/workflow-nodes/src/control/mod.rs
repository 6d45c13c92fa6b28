//! Control nodes
//!
//! Nodes that steer execution through flow ports: branching, loops and
//! ordered fan-out.

mod conditional;
mod for_loop;
mod sequence;

pub use conditional::IfNode;
pub use for_loop::ForLoopNode;
pub use sequence::SequenceNode;

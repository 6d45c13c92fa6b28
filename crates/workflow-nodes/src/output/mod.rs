//! Output nodes
//!
//! Nodes that publish results to the host.

mod print;
mod value_output;

pub use print::{PrintLog, PrintNode};
pub use value_output::{OutputCollector, OutputNode};

//! Node Engine - Dataflow graph execution
//!
//! Nodes expose typed data ports and flow ports; connections carry values
//! between data ports and control between flow ports. A run walks the graph
//! level by level, deferring any node whose data dependencies have not
//! executed yet (backpressure) and promoting it once they have.
//!
//! - Typed ports with coercion between compatible data types
//! - Sequential, parallel and loop executors over a shared context
//! - Flow branching: only the flow-out ports a node activates continue
//! - Cooperative cancellation through a `CancellationToken`
//!
//! # Architecture
//!
//! - `Graph`: nodes, ports and connections, plus mutation primitives
//! - `ExecutionPlan`: levels of independent nodes and loop bodies
//! - `ExecutionContext`: per-run states, cached outputs and the ready queue
//! - `GraphEngine`: owns converters, extensions and the event sink
//! - `EventSink`: generic event streaming for progress reporting
//!
//! # Example
//!
//! ```ignore
//! use node_engine::{GraphBuilder, NodeRegistry, Value};
//!
//! let registry = NodeRegistry::with_builtins();
//! let graph = GraphBuilder::new("demo", "Demo")
//!     .node_of_type(&registry, "five", "constant")
//!     .value("five", "value", 5.0)
//!     .node_of_type(&registry, "add", "add")
//!     .value("add", "b", 3.0)
//!     .connect_data("five", "value", "add", "a")
//!     .build()?;
//!
//! let report = graph.execute(Default::default(), &Default::default()).await?;
//! assert_eq!(report.output("add", "result"), Some(&Value::Double(8.0)));
//! ```

pub mod builder;
pub mod coercion;
pub mod composite_executor;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod extensions;
pub mod graph;
pub mod loop_executor;
pub mod node;
pub mod planner;
pub mod port;
pub mod registry;
pub mod types;
pub mod validation;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export key types
pub use builder::GraphBuilder;
pub use coercion::ConverterRegistry;
pub use composite_executor::{ParallelExecutor, SequentialExecutor};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use descriptor::{NodeMetadata, PortMetadata};
pub use document::{ConnectionDocument, GraphDocument, NodeDocument};
pub use engine::{ExecutionReport, GraphEngine};
pub use error::{NodeEngineError, Result};
pub use events::{EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use executor::{Executor, NodeExecutor, RunEnv};
pub use extensions::{extension_keys, ExecutorExtensions};
pub use graph::Graph;
pub use loop_executor::LoopExecutor;
pub use node::{
    FlowActivation, LoopBehavior, Node, NodeBehavior, ProcessContext, Resettable,
    LOOP_COMPLETED_PORT,
};
pub use planner::ExecutionPlan;
pub use port::{Connection, Port, PortRef};
pub use registry::{NodeRegistration, NodeRegistry};
pub use types::{ConnectionId, ExecutionState, NodeCategory, NodeId, PortDataType, PortDirection, PortId};
pub use validation::{validate_document, validate_graph, ValidationError};
pub use value::Value;

// Re-exported so node crates can register without a direct dependency
pub use async_trait::async_trait;
pub use inventory;
pub use tokio_util::sync::CancellationToken;

//! Graph-level driver
//!
//! [`GraphEngine`] owns everything a run needs besides the graph itself:
//! the converter table, the services handed to node bodies, the event
//! sink and the configuration. A run plans the graph, executes the root
//! executor in a fresh [`ExecutionContext`] and then classifies whatever is
//! still pending.
//!
//! # Example
//!
//! ```ignore
//! let engine = GraphEngine::new().with_event_sink(Arc::new(VecEventSink::new()));
//! let cancel = CancellationToken::new();
//! let report = engine.execute(&graph, HashMap::new(), &cancel).await?;
//! println!("{:?}", report.output("output-1", "value"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::coercion::ConverterRegistry;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::events::{emit, EventSink, NullEventSink, WorkflowEvent};
use crate::executor::{circular_wait, drain, Executor, RunEnv};
use crate::extensions::ExecutorExtensions;
use crate::graph::Graph;
use crate::planner::ExecutionPlan;
use crate::types::{ExecutionState, NodeId, PortDirection, PortId};
use crate::value::Value;

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    /// Cached outputs, by node and port
    pub outputs: HashMap<NodeId, HashMap<PortId, Value>>,
    /// Final state of every node the run touched
    pub states: HashMap<NodeId, ExecutionState>,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn output(&self, node_id: &str, port: &str) -> Option<&Value> {
        self.outputs.get(node_id).and_then(|ports| ports.get(port))
    }

    /// State of a node; untouched nodes are `NotStarted`
    pub fn state(&self, node_id: &str) -> ExecutionState {
        self.states.get(node_id).copied().unwrap_or_default()
    }

    pub fn executed_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == ExecutionState::Executed)
            .count()
    }
}

/// Runs graphs
pub struct GraphEngine {
    converters: ConverterRegistry,
    extensions: ExecutorExtensions,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine {
    /// Engine with the default converters, no services and no event sink
    pub fn new() -> Self {
        Self {
            converters: ConverterRegistry::new(),
            extensions: ExecutorExtensions::new(),
            events: Arc::new(NullEventSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    pub fn extensions(&self) -> &ExecutorExtensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut ExecutorExtensions {
        &mut self.extensions
    }

    /// Apply parameters, run the graph in a fresh context and report
    ///
    /// Each parameter goes to its node's behavior if it takes overrides,
    /// otherwise to the node's first data input.
    pub async fn execute(
        &self,
        graph: &Graph,
        parameters: HashMap<NodeId, Value>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        self.apply_parameters(graph, &parameters).await?;

        let context = ExecutionContext::new();
        let execution_id = self.config.new_execution_id();
        let started = Instant::now();
        self.run_with_id(graph, &context, cancel, &execution_id).await?;

        Ok(ExecutionReport {
            execution_id,
            outputs: context.snapshot_outputs(),
            states: context.snapshot_states(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Run the graph in a caller-provided context
    pub async fn run(
        &self,
        graph: &Graph,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let execution_id = self.config.new_execution_id();
        self.run_with_id(graph, context, cancel, &execution_id).await
    }

    async fn run_with_id(
        &self,
        graph: &Graph,
        context: &ExecutionContext,
        cancel: &CancellationToken,
        execution_id: &str,
    ) -> Result<()> {
        let plan = ExecutionPlan::build(graph);
        let env = RunEnv {
            graph,
            plan: &plan,
            converters: &self.converters,
            extensions: &self.extensions,
            events: self.events.as_ref(),
            cancel,
            config: &self.config,
            execution_id,
        };

        log::info!(
            "Starting run {} of graph '{}' ({} nodes)",
            execution_id,
            graph.id(),
            graph.node_count()
        );
        emit(
            env.events,
            WorkflowEvent::WorkflowStarted {
                workflow_id: graph.id().to_string(),
                execution_id: execution_id.to_string(),
            },
        );
        let started = Instant::now();

        let result = match plan.root_executor().execute(&env, context).await {
            Ok(()) => drain(&env, context).await,
            Err(e) => Err(e),
        }
        .and_then(|()| self.check_pending(graph, context));

        match &result {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                log::info!("Run {} completed in {}ms", execution_id, elapsed_ms);
                emit(
                    env.events,
                    WorkflowEvent::WorkflowCompleted {
                        workflow_id: graph.id().to_string(),
                        execution_id: execution_id.to_string(),
                        elapsed_ms,
                    },
                );
            }
            Err(e) if e.is_cancelled() => {
                log::info!("Run {} cancelled", execution_id);
                emit(
                    env.events,
                    WorkflowEvent::WorkflowCancelled {
                        workflow_id: graph.id().to_string(),
                        execution_id: execution_id.to_string(),
                    },
                );
            }
            Err(e) => {
                log::error!("Run {} failed: {}", execution_id, e);
                emit(
                    env.events,
                    WorkflowEvent::WorkflowFailed {
                        workflow_id: graph.id().to_string(),
                        execution_id: execution_id.to_string(),
                        error: e.to_string(),
                    },
                );
            }
        }
        result
    }

    /// Classify nodes still pending after the root executor finished
    ///
    /// Nodes waiting on each other, or on something that can only run
    /// after them, are a circular wait. The rest wait on nodes that never
    /// ran (an inactive branch) and stay `NotStarted`.
    fn check_pending(&self, graph: &Graph, context: &ExecutionContext) -> Result<()> {
        if let Some(waiting) = circular_wait(graph, context) {
            return Err(NodeEngineError::CircularWait { waiting });
        }

        let stranded = context.pending_nodes();
        if stranded.is_empty() {
            return Ok(());
        }
        log::debug!("Nodes left waiting on nodes that never ran: {:?}", stranded);
        if self.config.fail_on_stranded_nodes {
            let names: Vec<&str> = stranded.iter().map(|(node, _)| node.as_str()).collect();
            return Err(NodeEngineError::failed(format!(
                "Nodes never became ready: {}",
                names.join(", ")
            )));
        }
        Ok(())
    }

    async fn apply_parameters(
        &self,
        graph: &Graph,
        parameters: &HashMap<NodeId, Value>,
    ) -> Result<()> {
        for (node_id, value) in parameters {
            let node = graph.require_node(node_id)?;
            if node.behavior().lock().await.apply_override(value) {
                log::debug!("Parameter applied to behavior of '{}'", node_id);
                continue;
            }

            let port = node.ports(PortDirection::Input).first().ok_or_else(|| {
                NodeEngineError::InvalidParameter {
                    node_id: node_id.clone(),
                    message: "node takes no overrides and has no data input".to_string(),
                }
            })?;
            let coerced = self
                .converters
                .try_convert(value, port.data_type())
                .ok_or_else(|| NodeEngineError::InvalidParameter {
                    node_id: node_id.clone(),
                    message: format!(
                        "cannot convert {} into {} for input '{}'",
                        value.data_type(),
                        port.data_type(),
                        port.name()
                    ),
                })?;
            port.set_value(Some(coerced));
        }
        Ok(())
    }
}

impl Graph {
    /// Run this graph with a default engine
    pub async fn execute(
        &self,
        parameters: HashMap<NodeId, Value>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        GraphEngine::new().execute(self, parameters, cancel).await
    }
}

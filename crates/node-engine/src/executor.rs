//! Executor trait and the single-node executor
//!
//! Every executor follows the same contract: it is a no-op for nodes that
//! already executed, it checks cancellation before starting a node, and it
//! drains the context's queues before returning, so deferred nodes
//! released by its work and flow targets it activated run before control
//! goes back to the caller.
//!
//! Scheduling is iterative. A node never runs its successors itself: it
//! queues activated flow targets and released nodes in the context, and
//! [`drain`] runs them one at a time. Long chains therefore cost queue
//! entries, not stack frames.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::coercion::ConverterRegistry;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::events::{emit, EventSink, WorkflowEvent};
use crate::extensions::ExecutorExtensions;
use crate::graph::Graph;
use crate::node::{FlowActivation, Node, ProcessContext};
use crate::planner::ExecutionPlan;
use crate::types::{NodeId, PortDirection, PortId};
use crate::value::Value;

/// Everything shared by the executors of one run
pub struct RunEnv<'a> {
    pub graph: &'a Graph,
    pub plan: &'a ExecutionPlan,
    pub converters: &'a ConverterRegistry,
    pub extensions: &'a ExecutorExtensions,
    pub events: &'a dyn EventSink,
    pub cancel: &'a CancellationToken,
    pub config: &'a EngineConfig,
    pub execution_id: &'a str,
}

/// A unit of scheduled work within a run
#[async_trait]
pub trait Executor: Send + Sync {
    /// Do this unit's own work, leaving whatever it scheduled queued
    async fn run(&self, env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()>;

    /// Do this unit's work, then drain everything it scheduled
    async fn execute(&self, env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()> {
        self.run(env, context).await?;
        drain(env, context).await
    }
}

/// Run queued work until the context has nothing scheduled
///
/// Flow targets go first, so control finishes the branch it is on before
/// released nodes are picked up.
pub async fn drain(env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()> {
    loop {
        let node_id = if let Some((node_id, port)) = context.pop_flow_target() {
            context.set_active_flow_input(&node_id, &port);
            node_id
        } else if let Some(node_id) = context.dequeue_scheduled_node() {
            node_id
        } else {
            return Ok(());
        };

        if env.cancel.is_cancelled() {
            return Err(NodeEngineError::Cancelled);
        }
        log::trace!("Running scheduled node '{}'", node_id);
        env.plan.executor_for(&node_id).run(env, context).await?;
    }
}

/// Executes one node
pub struct NodeExecutor {
    node_id: NodeId,
}

impl NodeExecutor {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl Executor for NodeExecutor {
    async fn run(&self, env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()> {
        let node_id = self.node_id.as_str();
        if context.is_executed(node_id) || context.is_aborted() {
            return Ok(());
        }
        if env.cancel.is_cancelled() {
            return Err(NodeEngineError::Cancelled);
        }

        let node = env.graph.require_node(node_id)?;
        if !context.begin_node(node_id) {
            return Ok(());
        }

        if defer_if_blocked(env, context, node_id)? {
            return Ok(());
        }

        emit(
            env.events,
            WorkflowEvent::NodeStarted {
                node_id: node_id.to_string(),
                execution_id: env.execution_id.to_string(),
            },
        );

        let (activation, outputs) = match run_body(env, context, node).await {
            Ok(result) => result,
            Err(e) => return Err(failure(env, context, node_id, e)),
        };

        let outputs = accept_outputs(node, outputs);
        finish(env, context, node_id, outputs);
        follow_flow(env, context, node, &activation, None);
        Ok(())
    }
}

/// Dependencies of `node_id` that have not executed in `context`
pub(crate) fn unmet_dependencies(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node_id: &str,
) -> Vec<NodeId> {
    env.plan
        .dependencies(node_id)
        .iter()
        .filter(|dep| !context.is_executed(dep))
        .cloned()
        .collect()
}

/// Pending nodes that can never run
///
/// Either they only wait on each other, or one of their blockers is
/// downstream of them and so can only run after they do.
pub(crate) fn circular_wait(
    graph: &Graph,
    context: &ExecutionContext,
) -> Option<Vec<(NodeId, Vec<NodeId>)>> {
    if let Some(waiting) = context.pending_wait_cycle() {
        return Some(waiting);
    }

    let waiting: Vec<(NodeId, Vec<NodeId>)> = context
        .pending_nodes()
        .into_iter()
        .filter(|(node_id, blockers)| {
            let downstream = graph.downstream_nodes([node_id.clone()], None);
            blockers
                .iter()
                .any(|b| b != node_id && downstream.contains(b))
        })
        .collect();
    if waiting.is_empty() {
        None
    } else {
        Some(waiting)
    }
}

/// Park a running node if any dependency is unmet
///
/// Returns `true` when the node was deferred.
pub(crate) fn defer_if_blocked(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node_id: &str,
) -> Result<bool> {
    let unmet = unmet_dependencies(env, context, node_id);
    if unmet.is_empty() {
        return Ok(false);
    }

    log::debug!("Deferring node '{}' until {:?} execute", node_id, unmet);
    emit(
        env.events,
        WorkflowEvent::node_deferred(node_id, env.execution_id, unmet.clone()),
    );
    if let Err(e) = context.defer_node(node_id, unmet, env.config.max_deferrals_per_node) {
        log::error!("Node '{}' exceeded its deferral limit", node_id);
        context.abort();
        return Err(e);
    }
    Ok(true)
}

/// Invoke a node's body with its effective inputs
pub(crate) async fn run_body(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node: &Node,
) -> Result<(FlowActivation, HashMap<PortId, Value>)> {
    let inputs = env.graph.effective_inputs(node.id(), context, env.converters)?;
    let flow_input = context.active_flow_input(node.id());

    let mut behavior = node.behavior().lock().await;
    node.set_processing(true);
    let mut process_ctx =
        ProcessContext::new(node.id(), inputs, flow_input, env.cancel, env.extensions);
    let result = behavior.process(&mut process_ctx).await;
    node.set_processing(false);

    let activation = result?;
    Ok((activation, process_ctx.into_outputs()))
}

/// Drop outputs for undeclared ports and store the rest as port values
pub(crate) fn accept_outputs(
    node: &Node,
    outputs: HashMap<PortId, Value>,
) -> HashMap<PortId, Value> {
    outputs
        .into_iter()
        .filter(|(port, value)| match node.output(port) {
            Some(output) => {
                output.set_value(Some(value.clone()));
                true
            }
            None => {
                log::warn!(
                    "Node '{}' wrote to unknown output port '{}'; ignoring",
                    node.id(),
                    port
                );
                false
            }
        })
        .collect()
}

/// Record a successful body run and release waiting nodes
pub(crate) fn finish(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node_id: &str,
    outputs: HashMap<PortId, Value>,
) {
    let rendered: serde_json::Map<String, serde_json::Value> = outputs
        .iter()
        .map(|(port, value)| (port.clone(), value.to_json()))
        .collect();

    context.complete_node(node_id, outputs);
    context.check_and_schedule_pending_nodes(node_id);
    if context.is_cycle_completed(context.current_cycle()) {
        context.advance_cycle();
    }

    emit(
        env.events,
        WorkflowEvent::NodeCompleted {
            node_id: node_id.to_string(),
            execution_id: env.execution_id.to_string(),
            outputs: serde_json::Value::Object(rendered),
        },
    );
}

/// Mark a node failed, abort the run and wrap the error
pub(crate) fn failure(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node_id: &str,
    error: NodeEngineError,
) -> NodeEngineError {
    context.fail_node(node_id);
    context.abort();

    if error.is_cancelled() {
        log::info!("Node '{}' stopped by cancellation", node_id);
        return NodeEngineError::Cancelled;
    }

    log::error!("Node '{}' failed: {}", node_id, error);
    emit(
        env.events,
        WorkflowEvent::NodeFailed {
            node_id: node_id.to_string(),
            execution_id: env.execution_id.to_string(),
            error: error.to_string(),
        },
    );

    let in_flight = context
        .in_flight()
        .into_iter()
        .filter(|n| n != node_id)
        .collect();
    NodeEngineError::NodeProcessingFailure {
        node_id: node_id.to_string(),
        in_flight,
        source: Box::new(error),
    }
}

/// Queue the flow-in ports connected to activated flow-out ports
///
/// Ports are followed in activation order, and targets of one port in
/// connection order. `skip` names a port that must not be followed here.
pub(crate) fn follow_flow(
    env: &RunEnv<'_>,
    context: &ExecutionContext,
    node: &Node,
    activation: &FlowActivation,
    skip: Option<&str>,
) {
    let mut targets = Vec::new();
    for port in activation.iter() {
        if skip == Some(port.as_str()) {
            continue;
        }
        if node.port(PortDirection::FlowOut, port).is_none() {
            log::warn!(
                "Node '{}' activated unknown flow port '{}'; ignoring",
                node.id(),
                port
            );
            continue;
        }

        for target in env.graph.flow_targets(node.id(), port) {
            emit(
                env.events,
                WorkflowEvent::FlowActivated {
                    node_id: node.id().to_string(),
                    execution_id: env.execution_id.to_string(),
                    port: port.clone(),
                    target_node: target.node.clone(),
                    target_port: target.name.clone(),
                },
            );
            targets.push((target.node, target.name));
        }
    }
    if !targets.is_empty() {
        context.push_flow_targets(targets);
    }
}

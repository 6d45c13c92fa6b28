//! Loop executor
//!
//! Each iteration runs in its own context forked from the parent, so body
//! nodes start every iteration as `NotStarted` while still seeing every
//! upstream output the parent already has. Iteration results are folded
//! into an accumulator (last iteration wins) which is merged into the
//! parent once the loop ends.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::events::{emit, WorkflowEvent};
use crate::executor::{
    accept_outputs, circular_wait, defer_if_blocked, drain, failure, finish, follow_flow,
    run_body, Executor, RunEnv,
};
use crate::node::{FlowActivation, Node, LOOP_COMPLETED_PORT};
use crate::types::{NodeId, PortId};
use crate::value::Value;

/// Executes a loop node and its body
pub struct LoopExecutor {
    node_id: NodeId,
}

impl LoopExecutor {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    async fn reset(&self, node: &Node) {
        if !node.is_resettable() {
            return;
        }
        let mut behavior = node.behavior().lock().await;
        if let Some(resettable) = behavior.as_resettable() {
            resettable.reset();
        }
    }

    async fn should_continue(&self, env: &RunEnv<'_>, node: &Node) -> Result<bool> {
        let mut behavior = node.behavior().lock().await;
        match behavior.as_loop() {
            Some(header) => header.should_continue(env.cancel).await,
            None => Err(NodeEngineError::failed(format!(
                "Node '{}' is not a loop",
                node.id()
            ))),
        }
    }

    async fn is_loop_completed(&self, node: &Node) -> bool {
        let mut behavior = node.behavior().lock().await;
        behavior
            .as_loop()
            .map(|header| header.is_loop_completed())
            .unwrap_or(true)
    }

    /// Fail the loop node because of an error raised outside its own body
    fn abandon(&self, context: &ExecutionContext, error: NodeEngineError) -> NodeEngineError {
        context.fail_node(&self.node_id);
        context.abort();
        error
    }

    /// Run one iteration of the body in `iteration`
    async fn run_iteration(
        &self,
        env: &RunEnv<'_>,
        iteration: &ExecutionContext,
        node: &Node,
        activation: &FlowActivation,
        completed_port: &str,
    ) -> Result<()> {
        follow_flow(env, iteration, node, activation, Some(completed_port));
        drain(env, iteration).await?;
        env.plan
            .body_executor(&self.node_id)
            .execute(env, iteration)
            .await?;

        if let Some(waiting) = circular_wait(env.graph, iteration) {
            return Err(NodeEngineError::CircularWait { waiting });
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for LoopExecutor {
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
        self.reset(node).await;

        let completed_port = node
            .loop_completed_port()
            .unwrap_or(LOOP_COMPLETED_PORT)
            .to_string();
        let accumulator = ExecutionContext::new();
        let mut last_outputs: HashMap<PortId, Value> = HashMap::new();
        let mut iterations: u32 = 0;

        loop {
            if env.cancel.is_cancelled() {
                log::info!("Loop '{}' cancelled after {} iterations", node_id, iterations);
                return Err(self.abandon(context, NodeEngineError::Cancelled));
            }

            match self.should_continue(env, node).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(failure(env, context, node_id, e)),
            }

            if iterations >= env.config.max_loop_iterations {
                log::error!(
                    "Loop '{}' exceeded {} iterations",
                    node_id,
                    env.config.max_loop_iterations
                );
                return Err(self.abandon(
                    context,
                    NodeEngineError::LoopLimitExceeded {
                        node_id: node_id.to_string(),
                        limit: env.config.max_loop_iterations,
                    },
                ));
            }
            iterations += 1;
            log::debug!("Loop '{}' iteration {}", node_id, iterations);
            emit(
                env.events,
                WorkflowEvent::loop_iteration(node_id, env.execution_id, iterations),
            );

            let (activation, outputs) = match run_body(env, context, node).await {
                Ok(result) => result,
                Err(e) => return Err(failure(env, context, node_id, e)),
            };
            let outputs = accept_outputs(node, outputs);
            last_outputs = outputs.clone();

            let iteration = context.fork();
            iteration.complete_node(node_id, outputs);

            if let Err(e) = self
                .run_iteration(env, &iteration, node, &activation, &completed_port)
                .await
            {
                context.merge_execution_state(&iteration);
                return Err(self.abandon(context, e));
            }

            accumulator.merge_execution_state(&iteration);
            if self.is_loop_completed(node).await {
                log::debug!("Loop '{}' completed early", node_id);
                break;
            }
            context.advance_cycle();
        }

        log::debug!("Loop '{}' finished after {} iterations", node_id, iterations);
        context.merge_execution_state(&accumulator);
        finish(env, context, node_id, last_outputs);
        follow_flow(
            env,
            context,
            node,
            &FlowActivation::port(completed_port.as_str()),
            None,
        );
        Ok(())
    }
}

//! Executors that compose other executors
//!
//! [`SequentialExecutor`] runs its children one after another and drains
//! the ready queue after each. [`ParallelExecutor`] starts every child
//! concurrently and waits for all of them before draining once.

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::executor::{Executor, RunEnv};

/// Runs children in order
pub struct SequentialExecutor {
    children: Vec<Box<dyn Executor>>,
}

impl SequentialExecutor {
    pub fn new(children: Vec<Box<dyn Executor>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Executor for SequentialExecutor {
    async fn run(&self, env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()> {
        for child in &self.children {
            if env.cancel.is_cancelled() {
                return Err(NodeEngineError::Cancelled);
            }
            child.execute(env, context).await?;
        }
        Ok(())
    }
}

/// Runs children concurrently
///
/// All children settle before the first error (in child order) is
/// returned; a failing child aborts the context so no sibling starts new
/// nodes, but siblings already running finish.
pub struct ParallelExecutor {
    children: Vec<Box<dyn Executor>>,
}

impl ParallelExecutor {
    pub fn new(children: Vec<Box<dyn Executor>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
    async fn run(&self, env: &RunEnv<'_>, context: &ExecutionContext) -> Result<()> {
        let results = join_all(
            self.children
                .iter()
                .map(|child| child.execute(env, context)),
        )
        .await;

        match results.into_iter().find_map(Result::err) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::ConverterRegistry;
    use crate::config::EngineConfig;
    use crate::events::NullEventSink;
    use crate::executor::NodeExecutor;
    use crate::extensions::ExecutorExtensions;
    use crate::node::Node;
    use crate::planner::ExecutionPlan;
    use crate::testing::{graph_of, ConstNode, FailNode, Recorder, SumNode};
    use crate::types::ExecutionState;
    use crate::value::Value;
    use tokio_util::sync::CancellationToken;

    fn node(id: &str) -> Box<dyn Executor> {
        Box::new(NodeExecutor::new(id))
    }

    #[tokio::test]
    async fn test_parallel_runs_all_then_drains() {
        let recorder = Recorder::new();
        let mut graph = graph_of(vec![
            Node::with_behavior("sum", SumNode::new().with_recorder(&recorder)),
            Node::with_behavior("slow", ConstNode::double(2.0).with_delay(20)),
            Node::with_behavior("fast", ConstNode::double(3.0)),
        ]);
        graph.connect_data("slow", "value", "sum", "a").unwrap();
        graph.connect_data("fast", "value", "sum", "b").unwrap();

        let plan = ExecutionPlan::build(&graph);
        let converters = ConverterRegistry::new();
        let extensions = ExecutorExtensions::new();
        let cancel = CancellationToken::new();
        let config = EngineConfig::default();
        let env = RunEnv {
            graph: &graph,
            plan: &plan,
            converters: &converters,
            extensions: &extensions,
            events: &NullEventSink,
            cancel: &cancel,
            config: &config,
            execution_id: "exec-test",
        };
        let ctx = ExecutionContext::new();

        // The consumer is listed first and has to wait for both producers
        ParallelExecutor::new(vec![node("sum"), node("slow"), node("fast")])
            .execute(&env, &ctx)
            .await
            .unwrap();

        assert_eq!(recorder.count("sum"), 1);
        assert_eq!(ctx.get_cached_output("sum", "sum"), Some(Value::Double(5.0)));
        let call = &recorder.calls("sum")[0];
        assert_eq!(call.inputs.get("a"), Some(&Value::Double(2.0)));
        assert_eq!(call.inputs.get("b"), Some(&Value::Double(3.0)));
    }

    #[tokio::test]
    async fn test_parallel_surfaces_error_after_siblings_settle() {
        let graph = graph_of(vec![
            Node::with_behavior("bad", FailNode),
            Node::with_behavior("slow", ConstNode::double(1.0).with_delay(20)),
        ]);
        let plan = ExecutionPlan::build(&graph);
        let converters = ConverterRegistry::new();
        let extensions = ExecutorExtensions::new();
        let cancel = CancellationToken::new();
        let config = EngineConfig::default();
        let env = RunEnv {
            graph: &graph,
            plan: &plan,
            converters: &converters,
            extensions: &extensions,
            events: &NullEventSink,
            cancel: &cancel,
            config: &config,
            execution_id: "exec-test",
        };
        let ctx = ExecutionContext::new();

        let err = ParallelExecutor::new(vec![node("slow"), node("bad")])
            .execute(&env, &ctx)
            .await
            .unwrap_err();

        assert_eq!(err.failed_node(), Some("bad"));
        // slow had already started and was allowed to finish
        assert_eq!(ctx.state("slow"), ExecutionState::Executed);
        assert_eq!(ctx.state("bad"), ExecutionState::Failed);
    }

    #[tokio::test]
    async fn test_sequential_stops_on_cancellation() {
        let graph = graph_of(vec![
            Node::with_behavior("a", ConstNode::double(1.0)),
            Node::with_behavior("b", ConstNode::double(2.0)),
        ]);
        let plan = ExecutionPlan::build(&graph);
        let converters = ConverterRegistry::new();
        let extensions = ExecutorExtensions::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = EngineConfig::default();
        let env = RunEnv {
            graph: &graph,
            plan: &plan,
            converters: &converters,
            extensions: &extensions,
            events: &NullEventSink,
            cancel: &cancel,
            config: &config,
            execution_id: "exec-test",
        };
        let ctx = ExecutionContext::new();

        let sequence = SequentialExecutor::new(vec![node("a"), node("b")]);
        assert_eq!(sequence.len(), 2);
        let err = sequence.execute(&env, &ctx).await.unwrap_err();
        assert!(matches!(err, NodeEngineError::Cancelled));
        assert!(ctx.executed_nodes().is_empty());
    }
}

//! Workflow Nodes
//!
//! Built-in node behaviors for the node engine. Every node here registers
//! itself through `inventory`, so `NodeRegistry::with_builtins()` finds it
//! without a central list.
//!
//! # Categories
//!
//! - **Input**: Nodes that provide values
//! - **Math**: Binary arithmetic
//! - **Output**: Nodes that publish results to the host
//! - **Control**: Nodes for control flow (branches, loops, sequences)

pub mod control;
pub mod input;
pub mod math;
pub mod output;
pub mod setup;

// Re-export all nodes for convenience
pub use control::*;
pub use input::*;
pub use math::*;
pub use output::*;
pub use setup::{setup_extensions, BuiltinServices};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use node_engine::{
        CancellationToken, ExecutionState, ExecutorExtensions, GraphBuilder, GraphEngine,
        NodeRegistry, Value,
    };

    use crate::setup_extensions;

    fn engine() -> (GraphEngine, crate::BuiltinServices) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut extensions = ExecutorExtensions::new();
        let services = setup_extensions(&mut extensions);
        (GraphEngine::new().with_extensions(extensions), services)
    }

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = NodeRegistry::with_builtins();
        let all = registry.all_metadata();
        assert_eq!(all.len(), 10, "Expected 10 built-in nodes");

        // Spot-check known types
        for node_type in [
            "constant", "add", "subtract", "multiply", "divide", "output", "if", "for-loop",
            "sequence", "print",
        ] {
            assert!(registry.has_node_type(node_type), "missing {}", node_type);
        }
    }

    #[tokio::test]
    async fn test_constant_add_output() {
        let registry = NodeRegistry::with_builtins();
        let graph = GraphBuilder::new("sum", "Sum")
            .node_of_type(&registry, "five", "constant")
            .node_of_type(&registry, "add", "add")
            .node_of_type(&registry, "out", "output")
            .value("add", "b", 3.0)
            .connect_data("five", "value", "add", "a")
            .connect_data("add", "result", "out", "value")
            .build()
            .unwrap();

        let (engine, services) = engine();
        let parameters = HashMap::from([("five".to_string(), Value::Double(5.0))]);
        let report = engine
            .execute(&graph, parameters, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.output("out", "value"), Some(&Value::Double(8.0)));
        assert_eq!(report.output("add", "result"), Some(&Value::Double(8.0)));
        assert_eq!(services.outputs.last("out"), Some(Value::Double(8.0)));
    }

    #[tokio::test]
    async fn test_divide_by_zero_yields_nan() {
        let registry = NodeRegistry::with_builtins();
        let graph = GraphBuilder::new("div", "Divide")
            .node_of_type(&registry, "div", "divide")
            .value("div", "a", 10.0)
            .value("div", "b", 0.0)
            .build()
            .unwrap();

        let (engine, _) = engine();
        let report = engine
            .execute(&graph, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state("div"), ExecutionState::Executed);
        let result = report.output("div", "result").and_then(Value::as_f64);
        assert!(result.is_some_and(f64::is_nan));
    }

    #[tokio::test]
    async fn test_if_zero_takes_false_branch() {
        let registry = NodeRegistry::with_builtins();
        let graph = GraphBuilder::new("branch", "Branch")
            .node_of_type(&registry, "if", "if")
            .node_of_type(&registry, "yes", "print")
            .node_of_type(&registry, "no", "print")
            .value("if", "condition", 0)
            .value("yes", "value", "took true")
            .value("no", "value", "took false")
            .connect_flow("if", "true", "yes", "exec")
            .connect_flow("if", "false", "no", "exec")
            .build()
            .unwrap();

        let (engine, services) = engine();
        let report = engine
            .execute(&graph, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state("no"), ExecutionState::Executed);
        assert_eq!(report.state("yes"), ExecutionState::NotStarted);
        assert_eq!(services.print_log.lines(), vec!["took false".to_string()]);
    }

    #[tokio::test]
    async fn test_for_loop_prints_each_index() {
        let registry = NodeRegistry::with_builtins();
        let graph = GraphBuilder::new("loop", "Loop")
            .node_of_type(&registry, "loop", "for-loop")
            .node_of_type(&registry, "body", "print")
            .node_of_type(&registry, "done", "print")
            .value("done", "value", "done")
            .connect_flow("loop", "body", "body", "exec")
            .connect_data("loop", "index", "body", "value")
            .connect_flow("loop", "completed", "done", "exec")
            .build()
            .unwrap();

        let (engine, services) = engine();
        let parameters = HashMap::from([("loop".to_string(), Value::Int(3))]);
        let report = engine
            .execute(&graph, parameters, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            services.print_log.lines(),
            vec!["0", "1", "2", "done"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(report.state("loop"), ExecutionState::Executed);
        assert_eq!(report.state("body"), ExecutionState::Executed);
    }

    #[tokio::test]
    async fn test_sequence_runs_branches_in_order() {
        let registry = NodeRegistry::with_builtins();
        let graph = GraphBuilder::new("seq", "Sequence")
            .node_of_type(&registry, "seq", "sequence")
            .node_of_type(&registry, "first", "print")
            .node_of_type(&registry, "second", "print")
            .value("first", "value", "one")
            .value("second", "value", "two")
            .connect_flow("seq", "then_1", "second", "exec")
            .connect_flow("seq", "then_0", "first", "exec")
            .build()
            .unwrap();

        let (engine, services) = engine();
        engine
            .execute(&graph, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            services.print_log.lines(),
            vec!["one".to_string(), "two".to_string()]
        );
    }
}

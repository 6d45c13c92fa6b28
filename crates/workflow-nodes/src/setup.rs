//! Extensions setup for host applications.
//!
//! Hosts call [`setup_extensions`] before building a `GraphEngine` to
//! register the services the built-in nodes publish to. The returned
//! handles stay with the host so it can read results after a run.

use std::sync::Arc;

use node_engine::{extension_keys, ExecutorExtensions};

use crate::output::{OutputCollector, PrintLog};

/// Host-side handles to the services registered by [`setup_extensions`]
#[derive(Debug, Clone)]
pub struct BuiltinServices {
    pub outputs: Arc<OutputCollector>,
    pub print_log: Arc<PrintLog>,
}

/// Register an [`OutputCollector`] and a [`PrintLog`] in `extensions`.
///
/// # Example
///
/// ```ignore
/// let mut extensions = node_engine::ExecutorExtensions::new();
/// let services = workflow_nodes::setup_extensions(&mut extensions);
/// let engine = GraphEngine::new().with_extensions(extensions);
/// engine.execute(&graph, params, &cancel).await?;
/// println!("{:?}", services.outputs.last("out"));
/// ```
pub fn setup_extensions(extensions: &mut ExecutorExtensions) -> BuiltinServices {
    let services = BuiltinServices {
        outputs: Arc::new(OutputCollector::new()),
        print_log: Arc::new(PrintLog::new()),
    };
    extensions.set(extension_keys::OUTPUT_COLLECTOR, services.outputs.clone());
    extensions.set(extension_keys::PRINT_LOG, services.print_log.clone());
    log::debug!("Registered output collector and print log");
    services
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_registered() {
        let mut extensions = ExecutorExtensions::new();
        let services = setup_extensions(&mut extensions);

        let outputs = extensions
            .get::<Arc<OutputCollector>>(extension_keys::OUTPUT_COLLECTOR)
            .unwrap();
        assert!(Arc::ptr_eq(outputs, &services.outputs));
        assert!(extensions.has(extension_keys::PRINT_LOG));
    }
}

//! Typed service map handed to node bodies.
//!
//! The engine owner constructs an `ExecutorExtensions`, fills it with the
//! services its nodes need (output collectors, clocks, clients) and hands
//! it to [`GraphEngine`](crate::engine::GraphEngine). Node bodies reach the
//! services through [`ProcessContext::extensions`](crate::node::ProcessContext::extensions).
//! Nothing is stored in process-wide statics.
//!
//! # Example
//!
//! ```ignore
//! let mut ext = ExecutorExtensions::new();
//! ext.set(extension_keys::OUTPUT_COLLECTOR, Arc::new(OutputCollector::default()));
//!
//! // In a node body:
//! if let Some(collector) = ctx.extensions().get::<Arc<OutputCollector>>(extension_keys::OUTPUT_COLLECTOR) {
//!     collector.record(ctx.node_id(), value);
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;

/// Keyed map of `Send + Sync` services of arbitrary type.
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    /// Create an empty extension map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a typed value under the given key, replacing any previous one.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Get a reference to a typed value by key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    /// Check whether a key exists in the map.
    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Remove a service, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }
}

impl Default for ExecutorExtensions {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known extension keys for services the built-in nodes understand.
pub mod extension_keys {
    /// Key for `Arc<workflow_nodes::OutputCollector>`, fed by output nodes.
    pub const OUTPUT_COLLECTOR: &str = "output_collector";
    /// Key for `Arc<workflow_nodes::PrintLog>`, fed by print nodes.
    pub const PRINT_LOG: &str = "print_log";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_get() {
        let mut ext = ExecutorExtensions::new();
        ext.set(extension_keys::OUTPUT_COLLECTOR, "collector".to_string());

        assert_eq!(
            ext.get::<String>(extension_keys::OUTPUT_COLLECTOR),
            Some(&"collector".to_string())
        );
        assert!(ext.has(extension_keys::OUTPUT_COLLECTOR));
        assert!(!ext.has(extension_keys::PRINT_LOG));
    }

    #[test]
    fn test_type_mismatch_returns_none() {
        let mut ext = ExecutorExtensions::new();
        ext.set("threshold", 42u32);

        assert!(ext.get::<String>("threshold").is_none());
        assert_eq!(ext.get::<u32>("threshold"), Some(&42));
    }

    #[test]
    fn test_shared_service_and_removal() {
        let mut ext = ExecutorExtensions::new();
        let lines = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        ext.set(extension_keys::PRINT_LOG, lines.clone());

        ext.get::<Arc<parking_lot::Mutex<Vec<String>>>>(extension_keys::PRINT_LOG)
            .unwrap()
            .lock()
            .push("hello".to_string());
        assert_eq!(lines.lock().as_slice(), ["hello".to_string()]);

        assert!(ext.remove(extension_keys::PRINT_LOG));
        assert!(!ext.remove(extension_keys::PRINT_LOG));
    }
}

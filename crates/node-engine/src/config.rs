//! Engine configuration
//!
//! Bounds and naming used by a [`GraphEngine`](crate::engine::GraphEngine).
//! Every field has a default, so a partial JSON document is enough.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default values for [`EngineConfig`]
pub mod defaults {
    /// Iterations a single loop node may run before the run fails
    pub const MAX_LOOP_ITERATIONS: u32 = 10_000;
    /// Times one node may be deferred in a run before it counts as a wait cycle
    pub const MAX_DEFERRALS_PER_NODE: u32 = 64;
    /// Prefix of generated execution IDs
    pub const EXECUTION_ID_PREFIX: &str = "exec";
}

/// Configuration for graph runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Upper bound on iterations of any loop node
    pub max_loop_iterations: u32,
    /// Upper bound on deferrals of any node within a run
    pub max_deferrals_per_node: u32,
    /// Prefix for execution IDs (`{prefix}-{uuid}`)
    pub execution_id_prefix: String,
    /// Fail the run if pending nodes are left waiting on nodes that never ran
    ///
    /// Off by default: nodes behind an inactive branch are expected to be
    /// stranded and simply stay `NotStarted`.
    pub fail_on_stranded_nodes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: defaults::MAX_LOOP_ITERATIONS,
            max_deferrals_per_node: defaults::MAX_DEFERRALS_PER_NODE,
            execution_id_prefix: defaults::EXECUTION_ID_PREFIX.to_string(),
            fail_on_stranded_nodes: false,
        }
    }
}

impl EngineConfig {
    /// Parse from a JSON string; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn with_max_loop_iterations(mut self, limit: u32) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    pub fn with_max_deferrals_per_node(mut self, limit: u32) -> Self {
        self.max_deferrals_per_node = limit;
        self
    }

    pub fn with_fail_on_stranded_nodes(mut self, fail: bool) -> Self {
        self.fail_on_stranded_nodes = fail;
        self
    }

    /// Generate a fresh execution ID
    pub fn new_execution_id(&self) -> String {
        format!("{}-{}", self.execution_id_prefix, uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "maxLoopIterations": 5 }"#).unwrap();
        assert_eq!(config.max_loop_iterations, 5);
        assert_eq!(config.max_deferrals_per_node, defaults::MAX_DEFERRALS_PER_NODE);
        assert_eq!(config.execution_id_prefix, "exec");
        assert!(!config.fail_on_stranded_nodes);
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::NodeEngineError::Serialization(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig::default()
            .with_max_loop_iterations(12)
            .with_fail_on_stranded_nodes(true);
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let config = EngineConfig::default();
        let a = config.new_execution_id();
        let b = config.new_execution_id();
        assert!(a.starts_with("exec-"));
        assert_ne!(a, b);
    }
}

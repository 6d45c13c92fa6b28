//! Per-run execution context
//!
//! Tracks node states, cached outputs, the current cycle and the
//! pending/ready queues that implement backpressure. A context is created
//! fresh for every top-level run and is never persisted.
//!
//! All state sits behind a single mutex, so every operation is atomic
//! with respect to the others. The lock is never held across an `.await`.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

use crate::error::{NodeEngineError, Result};
use crate::types::{ExecutionState, NodeId, PortId};
use crate::value::Value;

/// A node waiting for upstream nodes to finish
#[derive(Debug, Clone)]
struct PendingNode {
    node_id: NodeId,
    blockers: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct ContextState {
    states: HashMap<NodeId, ExecutionState>,
    outputs: HashMap<NodeId, HashMap<PortId, Value>>,
    cycle: u64,
    cycle_nodes: HashSet<NodeId>,
    pending: VecDeque<PendingNode>,
    ready: VecDeque<NodeId>,
    /// Flow targets waiting to run; the last entry runs next
    flow: Vec<(NodeId, PortId)>,
    active_flow: HashMap<NodeId, PortId>,
    deferrals: HashMap<NodeId, u32>,
    aborted: bool,
}

impl ContextState {
    fn state(&self, node_id: &str) -> ExecutionState {
        self.states.get(node_id).copied().unwrap_or_default()
    }

    fn is_executed(&self, node_id: &str) -> bool {
        self.state(node_id) == ExecutionState::Executed
    }

    fn enqueue_ready(&mut self, node_id: NodeId) {
        if !self.ready.contains(&node_id) {
            self.ready.push_back(node_id);
        }
    }

    /// Move every pending node whose blockers have all executed to the
    /// ready queue, preserving FIFO order
    fn promote_satisfied(&mut self) -> Vec<NodeId> {
        let mut promoted = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.pending.len());

        while let Some(mut pending) = self.pending.pop_front() {
            let states = &self.states;
            pending
                .blockers
                .retain(|b| states.get(b) != Some(&ExecutionState::Executed));
            if pending.blockers.is_empty() {
                promoted.push(pending.node_id);
            } else {
                remaining.push_back(pending);
            }
        }

        self.pending = remaining;
        for node_id in &promoted {
            self.enqueue_ready(node_id.clone());
        }
        promoted
    }
}

/// Mutable state of one graph run
#[derive(Debug, Default)]
pub struct ExecutionContext {
    inner: Mutex<ContextState>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execution state of a node; unknown nodes are `NotStarted`
    pub fn state(&self, node_id: &str) -> ExecutionState {
        self.inner.lock().state(node_id)
    }

    pub fn is_executed(&self, node_id: &str) -> bool {
        self.inner.lock().is_executed(node_id)
    }

    /// Mark a node executed without touching its cached outputs
    pub fn mark_executed(&self, node_id: &str) {
        let mut inner = self.inner.lock();
        inner
            .states
            .insert(node_id.to_string(), ExecutionState::Executed);
        inner.pending.retain(|p| p.node_id != node_id);
    }

    /// Cache a single output value
    pub fn set_output(&self, node_id: &str, port: &str, value: Value) {
        self.inner
            .lock()
            .outputs
            .entry(node_id.to_string())
            .or_default()
            .insert(port.to_string(), value);
    }

    pub fn get_cached_output(&self, node_id: &str, port: &str) -> Option<Value> {
        self.inner
            .lock()
            .outputs
            .get(node_id)
            .and_then(|ports| ports.get(port))
            .cloned()
    }

    /// All cached outputs of one node
    pub fn outputs_of(&self, node_id: &str) -> HashMap<PortId, Value> {
        self.inner
            .lock()
            .outputs
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn register_node_in_cycle(&self, node_id: &str) {
        self.inner.lock().cycle_nodes.insert(node_id.to_string());
    }

    pub fn current_cycle(&self) -> u64 {
        self.inner.lock().cycle
    }

    /// Start the next cycle
    ///
    /// Nodes still running stay registered in the new cycle.
    pub fn advance_cycle(&self) {
        let mut inner = self.inner.lock();
        inner.cycle += 1;
        let states = inner.states.clone();
        inner
            .cycle_nodes
            .retain(|n| states.get(n) == Some(&ExecutionState::Running));
        log::debug!("Advanced to cycle {}", inner.cycle);
    }

    /// Whether `cycle` is over
    ///
    /// Earlier cycles are always completed; the current one is completed
    /// once every node registered in it has settled. Later cycles have not
    /// started.
    pub fn is_cycle_completed(&self, cycle: u64) -> bool {
        let inner = self.inner.lock();
        if cycle < inner.cycle {
            return true;
        }
        if cycle > inner.cycle {
            return false;
        }
        inner
            .cycle_nodes
            .iter()
            .all(|n| inner.state(n).is_settled())
    }

    /// Nodes registered in the current cycle that are still running
    pub fn in_flight(&self) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut running: Vec<NodeId> = inner
            .cycle_nodes
            .iter()
            .filter(|n| inner.state(n) == ExecutionState::Running)
            .cloned()
            .collect();
        running.sort();
        running
    }

    /// Transition `NotStarted -> Running` and register the node in the
    /// current cycle
    ///
    /// Returns `false` (and changes nothing) if the node is not
    /// `NotStarted` or the run has been aborted.
    pub fn begin_node(&self, node_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.aborted || inner.state(node_id) != ExecutionState::NotStarted {
            return false;
        }
        inner
            .states
            .insert(node_id.to_string(), ExecutionState::Running);
        inner.cycle_nodes.insert(node_id.to_string());
        true
    }

    /// Transition `Running -> NotStarted` and park the node until
    /// `blockers` have executed
    ///
    /// # Errors
    ///
    /// `CircularWait` when the node has been deferred more than
    /// `max_deferrals` times in this run.
    pub fn defer_node(&self, node_id: &str, blockers: Vec<NodeId>, max_deferrals: u32) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner
                .states
                .insert(node_id.to_string(), ExecutionState::NotStarted);
            inner.cycle_nodes.remove(node_id);

            let count = inner.deferrals.entry(node_id.to_string()).or_insert(0);
            *count += 1;
            if *count > max_deferrals {
                return Err(NodeEngineError::CircularWait {
                    waiting: vec![(node_id.to_string(), blockers)],
                });
            }
        }
        self.add_pending_node(node_id, blockers);
        Ok(())
    }

    /// Park a node until every blocker has executed
    ///
    /// Blockers that already executed are dropped; if none remain the node
    /// goes straight to the ready queue. Parking an already pending node
    /// widens its blocking set.
    pub fn add_pending_node(&self, node_id: &str, blockers: Vec<NodeId>) {
        let mut inner = self.inner.lock();
        let blockers: Vec<NodeId> = blockers
            .into_iter()
            .filter(|b| !inner.is_executed(b))
            .collect();

        if blockers.is_empty() {
            log::debug!("Node '{}' has no outstanding dependencies, scheduling", node_id);
            inner.pending.retain(|p| p.node_id != node_id);
            inner.enqueue_ready(node_id.to_string());
            return;
        }

        log::debug!("Node '{}' pending on {:?}", node_id, blockers);
        if let Some(existing) = inner.pending.iter_mut().find(|p| p.node_id == node_id) {
            for blocker in blockers {
                if !existing.blockers.contains(&blocker) {
                    existing.blockers.push(blocker);
                }
            }
        } else {
            inner.pending.push_back(PendingNode {
                node_id: node_id.to_string(),
                blockers,
            });
        }
    }

    /// Remove `just_executed` from every blocking set and schedule the
    /// pending nodes that became ready, in FIFO order
    pub fn check_and_schedule_pending_nodes(&self, just_executed: &str) -> Vec<NodeId> {
        let mut inner = self.inner.lock();
        for pending in inner.pending.iter_mut() {
            pending.blockers.retain(|b| b != just_executed);
        }
        let promoted = inner.promote_satisfied();
        if !promoted.is_empty() {
            log::debug!(
                "Node '{}' released pending nodes {:?}",
                just_executed,
                promoted
            );
        }
        promoted
    }

    /// Whether any ready node or flow target is waiting to run
    pub fn has_scheduled_nodes(&self) -> bool {
        let inner = self.inner.lock();
        !inner.ready.is_empty() || !inner.flow.is_empty()
    }

    pub fn dequeue_scheduled_node(&self) -> Option<NodeId> {
        self.inner.lock().ready.pop_front()
    }

    /// Queue flow targets, each entered through its flow-in port
    ///
    /// Targets queued together run in the given order, and before anything
    /// queued earlier, so control follows one branch to its end before
    /// moving on to the next.
    pub fn push_flow_targets(&self, targets: Vec<(NodeId, PortId)>) {
        self.inner.lock().flow.extend(targets.into_iter().rev());
    }

    pub fn pop_flow_target(&self) -> Option<(NodeId, PortId)> {
        self.inner.lock().flow.pop()
    }

    pub fn has_pending_nodes(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Pending nodes with their remaining blockers, in FIFO order
    pub fn pending_nodes(&self) -> Vec<(NodeId, Vec<NodeId>)> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|p| (p.node_id.clone(), p.blockers.clone()))
            .collect()
    }

    /// Pending nodes that only wait on each other and can never run
    ///
    /// Returns `None` when every pending node waits, directly or
    /// transitively, on something outside the pending set.
    pub fn pending_wait_cycle(&self) -> Option<Vec<(NodeId, Vec<NodeId>)>> {
        let inner = self.inner.lock();
        let mut stuck: HashSet<&str> = inner.pending.iter().map(|p| p.node_id.as_str()).collect();

        loop {
            let escaping: Vec<&str> = inner
                .pending
                .iter()
                .filter(|p| stuck.contains(p.node_id.as_str()))
                .filter(|p| p.blockers.iter().any(|b| !stuck.contains(b.as_str())))
                .map(|p| p.node_id.as_str())
                .collect();
            if escaping.is_empty() {
                break;
            }
            for node_id in escaping {
                stuck.remove(node_id);
            }
        }

        if stuck.is_empty() {
            return None;
        }
        let mut waiting: Vec<(NodeId, Vec<NodeId>)> = inner
            .pending
            .iter()
            .filter(|p| stuck.contains(p.node_id.as_str()))
            .map(|p| (p.node_id.clone(), p.blockers.clone()))
            .collect();
        waiting.sort();
        Some(waiting)
    }

    /// Cache a node's outputs and mark it `Executed` in one step
    pub fn complete_node(&self, node_id: &str, outputs: HashMap<PortId, Value>) {
        let mut inner = self.inner.lock();
        inner
            .outputs
            .entry(node_id.to_string())
            .or_default()
            .extend(outputs);
        inner
            .states
            .insert(node_id.to_string(), ExecutionState::Executed);
        inner.pending.retain(|p| p.node_id != node_id);
    }

    pub fn fail_node(&self, node_id: &str) {
        self.inner
            .lock()
            .states
            .insert(node_id.to_string(), ExecutionState::Failed);
    }

    /// Stop new nodes from starting; running nodes finish
    pub fn abort(&self) {
        self.inner.lock().aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    /// Record the flow-in port through which a node is being entered
    pub fn set_active_flow_input(&self, node_id: &str, port: &str) {
        self.inner
            .lock()
            .active_flow
            .insert(node_id.to_string(), port.to_string());
    }

    pub fn active_flow_input(&self, node_id: &str) -> Option<PortId> {
        self.inner.lock().active_flow.get(node_id).cloned()
    }

    /// Iteration context seeded with this context's executed nodes and
    /// their outputs
    pub fn fork(&self) -> ExecutionContext {
        let inner = self.inner.lock();
        let states: HashMap<NodeId, ExecutionState> = inner
            .states
            .iter()
            .filter(|(_, state)| **state == ExecutionState::Executed)
            .map(|(node, state)| (node.clone(), *state))
            .collect();
        let outputs = inner
            .outputs
            .iter()
            .filter(|(node, _)| states.contains_key(*node))
            .map(|(node, ports)| (node.clone(), ports.clone()))
            .collect();

        ExecutionContext {
            inner: Mutex::new(ContextState {
                states,
                outputs,
                cycle: inner.cycle,
                ..Default::default()
            }),
        }
    }

    /// Fold another context's results into this one
    ///
    /// Settled states and cached outputs from `other` overwrite ours, so
    /// when iterations are merged in order the last one wins. Pending
    /// nodes whose blockers are now satisfied are scheduled.
    pub fn merge_execution_state(&self, other: &ExecutionContext) {
        let snapshot = other.inner.lock().clone();
        let mut inner = self.inner.lock();

        for (node_id, state) in snapshot.states {
            if state.is_settled() {
                inner.states.insert(node_id, state);
            }
        }
        for (node_id, ports) in snapshot.outputs {
            inner.outputs.entry(node_id).or_default().extend(ports);
        }
        if snapshot.aborted {
            inner.aborted = true;
        }

        inner.promote_satisfied();
    }

    /// Executed node IDs, sorted
    pub fn executed_nodes(&self) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut executed: Vec<NodeId> = inner
            .states
            .iter()
            .filter(|(_, state)| **state == ExecutionState::Executed)
            .map(|(node, _)| node.clone())
            .collect();
        executed.sort();
        executed
    }

    pub fn snapshot_outputs(&self) -> HashMap<NodeId, HashMap<PortId, Value>> {
        self.inner.lock().outputs.clone()
    }

    pub fn snapshot_states(&self) -> HashMap<NodeId, ExecutionState> {
        self.inner.lock().states.clone()
    }

    /// Forget everything; the context can be reused for a fresh run
    pub fn reset(&self) {
        *self.inner.lock() = ContextState::default();
    }
}

//! Execution planning
//!
//! The plan decides which nodes are started directly and in which order.
//! Nodes with a connected flow-in port only run when control reaches them.
//! Every other node is a root of its scope: the top level, or the body of
//! the innermost loop that contains it. Roots are grouped into dependency
//! levels; each level runs in parallel and levels run in sequence.
//!
//! A loop's body is everything reached from its non-`completed` flow-out
//! ports along flow connections, plus data-only nodes downstream of the
//! loop or its body. A data-only node that also reads from anything after
//! the loop (reachable from its `completed` port) stays outside the body:
//! it runs once, after the loop. Expansion stops at nested loop nodes,
//! whose own bodies are computed separately; only their `completed` port
//! is followed by the enclosing loop.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::composite_executor::{ParallelExecutor, SequentialExecutor};
use crate::executor::{Executor, NodeExecutor};
use crate::graph::Graph;
use crate::loop_executor::LoopExecutor;
use crate::node::LOOP_COMPLETED_PORT;
use crate::types::{NodeId, PortDirection};

/// Body of one loop node
#[derive(Debug, Clone, Default)]
pub struct LoopScope {
    /// Every node inside the loop, nested bodies included, in graph order
    pub members: Vec<NodeId>,
    /// Root nodes owned directly by this loop, grouped by dependency level
    pub levels: Vec<Vec<NodeId>>,
}

/// Static schedule derived from a graph
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    levels: Vec<Vec<NodeId>>,
    loops: HashMap<NodeId, LoopScope>,
    owners: HashMap<NodeId, NodeId>,
    dependencies: HashMap<NodeId, Vec<NodeId>>,
}

impl ExecutionPlan {
    /// Build a plan for the graph as it is now
    pub fn build(graph: &Graph) -> Self {
        let order: Vec<NodeId> = graph.nodes().map(|n| n.id().to_string()).collect();
        let loop_ids: Vec<NodeId> = graph
            .nodes()
            .filter(|n| n.is_loop())
            .map(|n| n.id().to_string())
            .collect();

        let direct: HashMap<NodeId, HashSet<NodeId>> = loop_ids
            .iter()
            .map(|id| (id.clone(), direct_body(graph, id)))
            .collect();

        let mut full: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for id in &loop_ids {
            let mut visiting = HashSet::new();
            full_body(id, &direct, &mut full, &mut visiting);
        }

        // Innermost loop wins: the candidate with the smallest full body
        let mut owners: HashMap<NodeId, NodeId> = HashMap::new();
        for node_id in &order {
            let owner = loop_ids
                .iter()
                .filter(|l| direct[*l].contains(node_id))
                .min_by_key(|l| full.get(*l).map(HashSet::len).unwrap_or(0));
            if let Some(owner) = owner {
                owners.insert(node_id.clone(), owner.clone());
            }
        }

        let mut dependencies: HashMap<NodeId, Vec<NodeId>> = order
            .iter()
            .map(|id| (id.clone(), graph.data_dependencies(id)))
            .collect();
        for id in &loop_ids {
            let body = full.get(id).cloned().unwrap_or_default();
            let mut external: Vec<NodeId> = Vec::new();
            let sources = std::iter::once(id).chain(order.iter().filter(|n| body.contains(*n)));
            for member in sources {
                for dep in graph.data_dependencies(member) {
                    if dep != *id && !body.contains(&dep) && !external.contains(&dep) {
                        external.push(dep);
                    }
                }
            }
            dependencies.insert(id.clone(), external);
        }

        let mut plan = Self {
            levels: Vec::new(),
            loops: HashMap::new(),
            owners,
            dependencies,
        };

        let is_root = |id: &NodeId, scope: Option<&NodeId>| {
            plan.owners.get(id) == scope
                && graph.node(id).map(|n| !n.is_flow_driven()).unwrap_or(false)
        };
        let top: Vec<NodeId> = order.iter().filter(|id| is_root(*id, None)).cloned().collect();
        let scopes: Vec<(NodeId, Vec<NodeId>)> = loop_ids
            .iter()
            .map(|l| {
                let members = order.iter().filter(|id| is_root(*id, Some(l))).cloned().collect();
                (l.clone(), members)
            })
            .collect();

        plan.levels = plan.group_levels(&top, None);
        for (loop_id, roots) in scopes {
            let levels = plan.group_levels(&roots, Some(&loop_id));
            let members = order
                .iter()
                .filter(|n| full.get(&loop_id).is_some_and(|b| b.contains(*n)))
                .cloned()
                .collect();
            plan.loops.insert(loop_id, LoopScope { members, levels });
        }

        log::debug!(
            "Planned {} top-level nodes in {} levels, {} loops",
            top.len(),
            plan.levels.len(),
            plan.loops.len()
        );
        plan
    }

    /// Top-level dependency levels
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    pub fn loop_scope(&self, loop_id: &str) -> Option<&LoopScope> {
        self.loops.get(loop_id)
    }

    pub fn is_loop(&self, node_id: &str) -> bool {
        self.loops.contains_key(node_id)
    }

    /// Innermost loop containing the node
    pub fn owner(&self, node_id: &str) -> Option<&str> {
        self.owners.get(node_id).map(String::as_str)
    }

    /// Nodes that must execute before this one may start
    ///
    /// For loop nodes this includes every external node the body reads.
    pub fn dependencies(&self, node_id: &str) -> &[NodeId] {
        self.dependencies
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Executor that runs a single node
    pub fn executor_for(&self, node_id: &str) -> Box<dyn Executor> {
        if self.is_loop(node_id) {
            Box::new(LoopExecutor::new(node_id))
        } else {
            Box::new(NodeExecutor::new(node_id))
        }
    }

    /// Executor for the whole top level
    pub fn root_executor(&self) -> SequentialExecutor {
        self.levels_executor(&self.levels)
    }

    /// Executor for the roots of a loop body
    pub fn body_executor(&self, loop_id: &str) -> SequentialExecutor {
        match self.loops.get(loop_id) {
            Some(scope) => self.levels_executor(&scope.levels),
            None => SequentialExecutor::new(Vec::new()),
        }
    }

    fn levels_executor(&self, levels: &[Vec<NodeId>]) -> SequentialExecutor {
        SequentialExecutor::new(
            levels
                .iter()
                .map(|level| {
                    let children = level.iter().map(|id| self.executor_for(id)).collect();
                    Box::new(ParallelExecutor::new(children)) as Box<dyn Executor>
                })
                .collect(),
        )
    }

    /// The member of `scope` that stands for `node_id`
    ///
    /// A node inside a nested loop is represented by that loop's node.
    /// Returns `None` for nodes outside the scope.
    fn representative(&self, node_id: &str, scope: Option<&NodeId>) -> Option<NodeId> {
        let mut current = node_id.to_string();
        for _ in 0..=self.owners.len() {
            match self.owners.get(&current) {
                owner if owner == scope => return Some(current),
                None => return None,
                Some(owner) => current = owner.clone(),
            }
        }
        None
    }

    /// Kahn's algorithm over one scope's roots
    ///
    /// Nodes caught in dependency cycles end up together in a final level;
    /// at run time they defer on each other and surface as a circular wait.
    fn group_levels(&self, roots: &[NodeId], scope: Option<&NodeId>) -> Vec<Vec<NodeId>> {
        let members: HashSet<&NodeId> = roots.iter().collect();
        let mut incoming: HashMap<&NodeId, HashSet<NodeId>> = HashMap::new();

        for node_id in roots {
            let mut deps = HashSet::new();
            for dep in self.dependencies(node_id) {
                if let Some(rep) = self.representative(dep, scope) {
                    if rep != *node_id && members.contains(&rep) {
                        deps.insert(rep);
                    }
                }
            }
            incoming.insert(node_id, deps);
        }

        let mut levels = Vec::new();
        let mut placed: HashSet<NodeId> = HashSet::new();
        let mut remaining: VecDeque<&NodeId> = roots.iter().collect();

        while !remaining.is_empty() {
            let level: Vec<NodeId> = remaining
                .iter()
                .filter(|id| incoming[**id].iter().all(|d| placed.contains(d)))
                .map(|id| (*id).clone())
                .collect();

            if level.is_empty() {
                let stuck: Vec<NodeId> = remaining.iter().map(|id| (*id).clone()).collect();
                log::warn!("Nodes {:?} depend on each other and cannot be ordered", stuck);
                levels.push(stuck);
                break;
            }

            remaining.retain(|id| !level.contains(*id));
            placed.extend(level.iter().cloned());
            levels.push(level);
        }
        levels
    }
}

/// Nodes directly inside a loop's body, not expanding past nested loops
fn direct_body(graph: &Graph, loop_id: &str) -> HashSet<NodeId> {
    let mut body = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    let Some(loop_node) = graph.node(loop_id) else {
        return body;
    };
    let completed = loop_node.loop_completed_port().unwrap_or(LOOP_COMPLETED_PORT);
    let after = graph.downstream_nodes(
        graph.flow_targets(loop_id, completed).into_iter().map(|t| t.node),
        Some(loop_id),
    );
    for port in loop_node.ports(PortDirection::FlowOut) {
        if port.name() != completed {
            queue.extend(graph.flow_targets(loop_id, port.name()).into_iter().map(|t| t.node));
        }
    }
    queue.extend(data_only_targets(graph, loop_id, &after));

    while let Some(node_id) = queue.pop_front() {
        if node_id == loop_id || !body.insert(node_id.clone()) {
            continue;
        }
        let Some(node) = graph.node(&node_id) else {
            continue;
        };

        if let Some(nested_completed) = node.loop_completed_port() {
            queue.extend(graph.flow_targets(&node_id, nested_completed).into_iter().map(|t| t.node));
            continue;
        }
        for port in node.ports(PortDirection::FlowOut) {
            queue.extend(graph.flow_targets(&node_id, port.name()).into_iter().map(|t| t.node));
        }
        queue.extend(data_only_targets(graph, &node_id, &after));
    }
    body
}

/// Downstream data consumers that are not flow-driven, skipping `excluded`
fn data_only_targets(graph: &Graph, node_id: &str, excluded: &HashSet<NodeId>) -> Vec<NodeId> {
    graph
        .outgoing_data(node_id)
        .map(|c| c.target().node.clone())
        .filter(|target| !excluded.contains(target))
        .filter(|target| graph.node(target).is_some_and(|n| !n.is_flow_driven()))
        .collect()
}

/// Direct body plus the full bodies of nested loops
fn full_body(
    loop_id: &NodeId,
    direct: &HashMap<NodeId, HashSet<NodeId>>,
    full: &mut HashMap<NodeId, HashSet<NodeId>>,
    visiting: &mut HashSet<NodeId>,
) -> HashSet<NodeId> {
    if let Some(done) = full.get(loop_id) {
        return done.clone();
    }
    if !visiting.insert(loop_id.clone()) {
        return direct.get(loop_id).cloned().unwrap_or_default();
    }

    let mut body = direct.get(loop_id).cloned().unwrap_or_default();
    let nested: Vec<NodeId> = body
        .iter()
        .filter(|n| direct.contains_key(*n) && *n != loop_id)
        .cloned()
        .collect();
    for inner in nested {
        body.extend(full_body(&inner, direct, full, visiting));
    }
    body.remove(loop_id);

    full.insert(loop_id.clone(), body.clone());
    body
}

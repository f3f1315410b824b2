// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::registry::TaskRegistry;
use crate::errors::{BatchdagError, Result};
use crate::types::TaskName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct prerequisites, in declared order.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that list this one as a prerequisite.
    dependents: Vec<TaskName>,
}

/// The part of a pipeline reachable from one root task.
///
/// Construction checks that every prerequisite exists and that there is no
/// cycle, before anything runs.
#[derive(Debug, Clone)]
pub struct DagGraph {
    root: TaskName,
    nodes: BTreeMap<TaskName, DagNode>,
    /// Prerequisites before dependents, siblings in declared order.
    order: Vec<TaskName>,
}

impl DagGraph {
    /// Resolve everything reachable from `root` in `registry`.
    pub fn resolve(registry: &TaskRegistry, root: &str) -> Result<Self> {
        if !registry.contains(root) {
            return Err(BatchdagError::TaskNotFound(root.to_string()));
        }

        // First pass: walk from the root and collect nodes with their deps.
        let mut nodes: BTreeMap<TaskName, DagNode> = BTreeMap::new();
        let mut stack = vec![root.to_string()];
        while let Some(name) = stack.pop() {
            if nodes.contains_key(&name) {
                continue;
            }
            let task = registry
                .get(&name)
                .ok_or_else(|| BatchdagError::TaskNotFound(name.clone()))?;
            for dep in task.prerequisites() {
                if !registry.contains(dep) {
                    return Err(BatchdagError::TaskNotFound(format!(
                        "'{dep}' (prerequisite of '{name}')"
                    )));
                }
                stack.push(dep.clone());
            }
            nodes.insert(
                name,
                DagNode {
                    deps: task.prerequisites().to_vec(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let task_names: Vec<TaskName> = nodes.keys().cloned().collect();
        for task_name in task_names {
            let deps = nodes
                .get(&task_name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(task_name.clone());
                }
            }
        }

        check_acyclic(&nodes)?;

        let order = flatten(&nodes, root);
        Ok(Self {
            root: root.to_string(),
            nodes,
            order,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// All reachable task names.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flattened dependency order: every task appears after its prerequisites.
    pub fn order(&self) -> &[TaskName] {
        &self.order
    }

    /// Immediate prerequisites of a task, in declared order.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task within the reachable graph.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

fn check_acyclic(nodes: &BTreeMap<TaskName, DagNode>) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in nodes.keys() {
        graph.add_node(name.as_str());
    }
    for (name, node) in nodes.iter() {
        for dep in node.deps.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle (self-loops included).
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BatchdagError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// Post-order walk from `root`, visiting prerequisites in declared order.
fn flatten(nodes: &BTreeMap<TaskName, DagNode>, root: &str) -> Vec<TaskName> {
    fn visit(
        name: &str,
        nodes: &BTreeMap<TaskName, DagNode>,
        seen: &mut BTreeSet<TaskName>,
        out: &mut Vec<TaskName>,
    ) {
        if !seen.insert(name.to_string()) {
            return;
        }
        if let Some(node) = nodes.get(name) {
            for dep in &node.deps {
                visit(dep, nodes, seen, out);
            }
        }
        out.push(name.to_string());
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(nodes.len());
    visit(root, nodes, &mut seen, &mut out);
    out
}

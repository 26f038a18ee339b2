// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Dependency graph between named values.
//!
//! Nodes live in an arena and refer to each other by index. An edge
//! `dependent -> dependency` means the dependent is re-evaluated whenever the
//! dependency changes. Edges that would close a cycle are rejected.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency of '{dependent}' on '{dependency}' would create a cycle")]
    Cycle {
        dependent: String,
        dependency: String,
    },
}

pub type NodeId = usize;

#[derive(Debug, Clone, Default)]
struct Node {
    dependencies: IndexSet<NodeId>,
    dependents: IndexSet<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: IndexMap<String, NodeId>,
    nodes: Vec<Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena index of `name`, inserting a node if it does not exist yet.
    pub fn node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::default());
        self.names.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.names
            .get_index(id)
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            stack.extend(self.nodes[id].dependencies.iter().copied());
        }
        false
    }

    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<(), GraphError> {
        let from = self.node(dependent);
        let to = self.node(dependency);
        if self.reaches(to, from) {
            return Err(GraphError::Cycle {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }
        self.nodes[from].dependencies.insert(to);
        self.nodes[to].dependents.insert(from);
        Ok(())
    }

    pub fn clear_dependencies(&mut self, dependent: &str) {
        let Some(&from) = self.names.get(dependent) else {
            return;
        };
        for to in std::mem::take(&mut self.nodes[from].dependencies) {
            self.nodes[to].dependents.shift_remove(&from);
        }
    }

    /// Replace all dependencies of `dependent`; on a cycle the old edges stay.
    pub fn set_dependencies<'a>(
        &mut self,
        dependent: &str,
        dependencies: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), GraphError> {
        let from = self.node(dependent);
        let previous: Vec<NodeId> = self.nodes[from].dependencies.iter().copied().collect();
        self.clear_dependencies(dependent);
        for dependency in dependencies {
            if let Err(err) = self.add_dependency(dependent, dependency) {
                self.clear_dependencies(dependent);
                for to in previous {
                    self.nodes[from].dependencies.insert(to);
                    self.nodes[to].dependents.insert(from);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.names
            .get(name)
            .map(|&id| {
                self.nodes[id]
                    .dependencies
                    .iter()
                    .map(|&dep| self.name(dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Transitive dependents of `changed` in an order where every node comes
    /// after all of its dependencies. `changed` itself is not included.
    pub fn propagation_order(&self, changed: &str) -> Vec<&str> {
        let Some(&start) = self.names.get(changed) else {
            return Vec::new();
        };
        // Collect the affected subgraph.
        let mut affected = IndexSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            for &dependent in &self.nodes[id].dependents {
                if affected.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        // Kahn's algorithm restricted to the affected nodes.
        let mut pending: IndexMap<NodeId, usize> = affected
            .iter()
            .map(|&id| {
                let count = self.nodes[id]
                    .dependencies
                    .iter()
                    .filter(|dep| affected.contains(*dep))
                    .count();
                (id, count)
            })
            .collect();
        let mut ready: VecDeque<NodeId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(affected.len());
        while let Some(id) = ready.pop_front() {
            order.push(self.name(id));
            for dependent in &self.nodes[id].dependents {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }
        order
    }
}

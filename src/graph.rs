//! Dependency graph over the enabled sub-units
//!
//! Nodes are the enabled sub-units in declared order; a node's index is its
//! original position and doubles as the sorter's tie-break key. An edge runs
//! from a dependent to one of its prerequisites.

use crate::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    positions: HashMap<String, usize>,
    /// `prerequisites[d]` lists the nodes `d` requires, each once
    prerequisites: Vec<Vec<usize>>,
    /// `dependents[p]` lists the nodes requiring `p`
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph
    ///
    /// For every enabled sub-unit and each of its declared prerequisites:
    ///
    /// - prerequisite enabled: add an edge
    /// - prerequisite known (metadata observed) but not enabled: fail with
    ///   [`Error::DependencyViolation`]
    /// - prerequisite never observed: skip it; the package providing it may
    ///   simply not be downloaded yet
    ///
    /// Duplicate IDs in `order` keep their first position. Self-requirements
    /// are ignored.
    pub fn build<F>(order: &[String], requires: &HashMap<String, Vec<String>>, is_known: F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        let mut graph = DependencyGraph::default();
        for id in order {
            if graph.positions.contains_key(id) {
                continue;
            }
            graph.positions.insert(id.clone(), graph.nodes.len());
            graph.nodes.push(id.clone());
        }
        graph.prerequisites = vec![Vec::new(); graph.nodes.len()];
        graph.dependents = vec![Vec::new(); graph.nodes.len()];

        for (dependent, id) in graph.nodes.iter().enumerate() {
            let Some(declared) = requires.get(id) else {
                continue;
            };
            for prerequisite in declared {
                if prerequisite == id {
                    continue;
                }
                match graph.positions.get(prerequisite) {
                    Some(&p) => {
                        if !graph.prerequisites[dependent].contains(&p) {
                            graph.prerequisites[dependent].push(p);
                            graph.dependents[p].push(dependent);
                        }
                    }
                    None if is_known(prerequisite) => {
                        return Err(Error::DependencyViolation {
                            unit: id.clone(),
                            requires: prerequisite.clone(),
                        });
                    }
                    None => {
                        tracing::debug!(unit = %id, requires = %prerequisite, "prerequisite not observed; no edge");
                    }
                }
            }
        }

        Ok(graph)
    }

    /// Sub-unit IDs in original order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Original position of a sub-unit
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn prerequisites(&self, node: usize) -> &[usize] {
        &self.prerequisites[node]
    }

    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// All edges as `(dependent, prerequisite)` ID pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.prerequisites.iter().enumerate().flat_map(move |(d, prereqs)| {
            prereqs
                .iter()
                .map(move |&p| (self.nodes[d].as_str(), self.nodes[p].as_str()))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.prerequisites.iter().map(Vec::len).sum()
    }

    /// True when every prerequisite appears before its dependent in `order`
    pub fn is_satisfied_by(&self, order: &[String]) -> bool {
        let positions: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        self.edges().all(|(dependent, prerequisite)| {
            match (positions.get(dependent), positions.get(prerequisite)) {
                (Some(d), Some(p)) => p < d,
                _ => false,
            }
        })
    }
}

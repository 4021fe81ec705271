//! Stable topological sort of the activation order
//!
//! The operator's declared order is kept whenever it already satisfies every
//! dependency. Otherwise a Kahn elimination repeatedly takes the ready node
//! with the smallest original position, so the output depends only on the
//! declared order and the edges, never on hash iteration order.
//!
//! # Examples
//!
//! ```
//! use modsync::graph::DependencyGraph;
//! use modsync::resolver::{resolve, Resolution};
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let order = vec!["RavenCreek".to_string(), "tsarslib".to_string()];
//! let mut requires = HashMap::new();
//! requires.insert("RavenCreek".to_string(), vec!["tsarslib".to_string()]);
//!
//! let graph = DependencyGraph::build(&order, &requires, |_| true)?;
//! let resolution = resolve(&graph)?;
//! assert_eq!(resolution.order(), &["tsarslib".to_string(), "RavenCreek".to_string()]);
//! # Ok(())
//! # }
//! ```

use crate::graph::DependencyGraph;
use crate::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

/// A sub-unit that changed position (0-based positions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub unit: String,
    pub from: usize,
    pub to: usize,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: position {} → {}", self.unit, self.from + 1, self.to + 1)
    }
}

/// Outcome of a successful sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The declared order already satisfied every edge
    Unchanged(Vec<String>),
    Reordered { order: Vec<String>, moves: Vec<Move> },
}

impl Resolution {
    pub fn order(&self) -> &[String] {
        match self {
            Resolution::Unchanged(order) => order,
            Resolution::Reordered { order, .. } => order,
        }
    }

    pub fn into_order(self) -> Vec<String> {
        match self {
            Resolution::Unchanged(order) => order,
            Resolution::Reordered { order, .. } => order,
        }
    }

    pub fn moves(&self) -> &[Move] {
        match self {
            Resolution::Unchanged(_) => &[],
            Resolution::Reordered { moves, .. } => moves,
        }
    }

    pub fn is_reordered(&self) -> bool {
        matches!(self, Resolution::Reordered { .. })
    }
}

/// Sort the graph's nodes so every prerequisite precedes its dependents
///
/// Fails with [`Error::CycleDetected`] carrying every node that could not be
/// placed, in original order.
pub fn resolve(graph: &DependencyGraph) -> Result<Resolution> {
    let nodes = graph.nodes();
    if graph.is_satisfied_by(nodes) {
        return Ok(Resolution::Unchanged(nodes.to_vec()));
    }

    let mut in_degree: Vec<usize> = (0..graph.len())
        .map(|n| graph.prerequisites(n).len())
        .collect();
    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(n, _)| Reverse((n, nodes[n].as_str())))
        .collect();

    let mut placed: Vec<usize> = Vec::with_capacity(graph.len());
    while let Some(Reverse((node, _))) = ready.pop() {
        placed.push(node);
        for &dependent in graph.dependents(node) {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse((dependent, nodes[dependent].as_str())));
            }
        }
    }

    if placed.len() < graph.len() {
        let unresolved = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(n, _)| nodes[n].clone())
            .collect();
        return Err(Error::CycleDetected { nodes: unresolved });
    }

    let moves = placed
        .iter()
        .enumerate()
        .filter(|(to, from)| *to != **from)
        .map(|(to, &from)| Move {
            unit: nodes[from].clone(),
            from,
            to,
        })
        .collect();
    let order = placed.into_iter().map(|n| nodes[n].clone()).collect();

    Ok(Resolution::Reordered { order, moves })
}

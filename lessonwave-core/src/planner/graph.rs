//! Prerequisite graph over a chapter's concepts.
//!
//! Nodes are concept positions in the input slice. An edge `a → b` means
//! concept `a` must be taught before concept `b`. The graph may contain cycles.

use crate::types::{Concept, DependencyEdge};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraphMap<usize, ()>,
    ids: Vec<String>,
}

impl DependencyGraph {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_edge(&self, from: usize, to: usize) -> bool {
        self.graph.contains_edge(from, to)
    }

    /// Concepts that must precede `node`.
    pub fn prerequisites(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    /// Concepts that `node` is a prerequisite of.
    pub fn dependents(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.prerequisites(node).count()
    }

    /// Edges expressed as concept ids, sorted.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .all_edges()
            .map(|(from, to, _)| DependencyEdge {
                from_id: self.ids[from].clone(),
                to_id: self.ids[to].clone(),
            })
            .collect();
        edges.sort();
        edges
    }
}

/// Derives explicit edges from `related_ids` and implicit edges from the
/// type, difficulty and Bloom's orders.
#[derive(Debug, Clone)]
pub struct DependencyGraphBuilder {
    explicit: bool,
    implicit: bool,
}

impl Default for DependencyGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self {
            explicit: true,
            implicit: true,
        }
    }

    pub fn with_explicit(mut self, enabled: bool) -> Self {
        self.explicit = enabled;
        self
    }

    pub fn with_implicit(mut self, enabled: bool) -> Self {
        self.implicit = enabled;
        self
    }

    pub fn build(&self, concepts: &[Concept]) -> DependencyGraph {
        let mut graph = DiGraphMap::with_capacity(concepts.len(), concepts.len());
        for idx in 0..concepts.len() {
            graph.add_node(idx);
        }

        if self.explicit {
            // First occurrence wins if ids repeat; validation rejects that anyway.
            let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(concepts.len());
            for (idx, concept) in concepts.iter().enumerate() {
                index_of.entry(concept.id.as_str()).or_insert(idx);
            }
            for (from, concept) in concepts.iter().enumerate() {
                for related in &concept.related_ids {
                    if let Some(&to) = index_of.get(related.as_str()) {
                        if to != from {
                            graph.add_edge(from, to, ());
                        }
                    }
                }
            }
        }

        if self.implicit {
            for (a, ca) in concepts.iter().enumerate() {
                for (b, cb) in concepts.iter().enumerate() {
                    if a != b && precedes_in_any_order(ca, cb) {
                        graph.add_edge(a, b, ());
                    }
                }
            }
        }

        DependencyGraph {
            graph,
            ids: concepts.iter().map(|c| c.id.clone()).collect(),
        }
    }
}

fn precedes_in_any_order(a: &Concept, b: &Concept) -> bool {
    a.concept_type.teaching_rank() < b.concept_type.teaching_rank()
        || a.difficulty.rank() < b.difficulty.rank()
        || a.blooms_level.rank() < b.blooms_level.rank()
}

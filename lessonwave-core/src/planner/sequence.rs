//! Topological sequencing of concepts.
//!
//! Kahn's algorithm with the zero-in-degree frontier drained in ascending
//! name order. When a cycle stalls the frontier, the stalled concepts are
//! appended in input order by [`append_cyclic_remainder`].

use super::graph::DependencyGraph;
use crate::types::Concept;
use std::collections::BTreeSet;

/// A teaching order over concept positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Every concept position exactly once.
    pub order: Vec<usize>,
    /// Positions placed by the cycle fallback, in the order appended. Their
    /// prerequisites are not guaranteed to precede them.
    pub cyclic: Vec<usize>,
}

impl Sequence {
    pub fn has_cycles(&self) -> bool {
        !self.cyclic.is_empty()
    }

    /// Number of concepts ordered with prerequisites honored.
    pub fn acyclic_len(&self) -> usize {
        self.order.len() - self.cyclic.len()
    }
}

pub fn sequence_concepts(concepts: &[Concept], graph: &DependencyGraph) -> Sequence {
    let n = concepts.len();
    let mut in_degree: Vec<usize> = (0..n).map(|idx| graph.in_degree(idx)).collect();
    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);

    // (name, position): position breaks ties between equal names.
    let mut frontier: BTreeSet<(&str, usize)> = (0..n)
        .filter(|&idx| in_degree[idx] == 0)
        .map(|idx| (concepts[idx].name.as_str(), idx))
        .collect();

    while let Some((_, idx)) = frontier.pop_first() {
        emitted[idx] = true;
        order.push(idx);
        for next in graph.dependents(idx) {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                frontier.insert((concepts[next].name.as_str(), next));
            }
        }
    }

    let cyclic = append_cyclic_remainder(&mut order, &emitted);
    Sequence { order, cyclic }
}

/// Append every position not yet emitted, in input order, and return them.
///
/// Best-effort ordering for the part of the graph Kahn's algorithm cannot
/// drain: no error is raised and prerequisites inside the remainder are not
/// guaranteed to come first.
pub fn append_cyclic_remainder(order: &mut Vec<usize>, emitted: &[bool]) -> Vec<usize> {
    let remainder: Vec<usize> = emitted
        .iter()
        .enumerate()
        .filter(|&(_, &done)| !done)
        .map(|(idx, _)| idx)
        .collect();
    order.extend_from_slice(&remainder);
    remainder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::graph::DependencyGraphBuilder;

    fn explicit_only(concepts: &[Concept]) -> DependencyGraph {
        DependencyGraphBuilder::new()
            .with_implicit(false)
            .build(concepts)
    }

    #[test]
    fn test_frontier_uses_name_order_not_input_order() {
        let concepts = vec![
            Concept::new("z", "Zinc"),
            Concept::new("a", "Argon"),
            Concept::new("m", "Magnesium"),
        ];
        let seq = sequence_concepts(&concepts, &explicit_only(&concepts));
        assert_eq!(seq.order, vec![1, 2, 0]);
        assert!(!seq.has_cycles());
    }

    #[test]
    fn test_prerequisites_come_first() {
        // "Alpha" sorts first by name but requires "Omega".
        let concepts = vec![
            Concept::new("a", "Alpha"),
            Concept::new("o", "Omega").prerequisite_for("a"),
            Concept::new("b", "Beta"),
        ];
        let seq = sequence_concepts(&concepts, &explicit_only(&concepts));
        assert_eq!(seq.order, vec![2, 1, 0]);
    }

    #[test]
    fn test_cycle_remainder_appended_in_input_order() {
        let concepts = vec![
            Concept::new("x", "Xylem").prerequisite_for("y"),
            Concept::new("y", "Yeast").prerequisite_for("x"),
            Concept::new("c", "Cell"),
        ];
        let seq = sequence_concepts(&concepts, &explicit_only(&concepts));
        assert_eq!(seq.order, vec![2, 0, 1]);
        assert_eq!(seq.cyclic, vec![0, 1]);
        assert_eq!(seq.acyclic_len(), 1);
    }

    #[test]
    fn test_append_cyclic_remainder_in_isolation() {
        let mut order = vec![3, 1];
        let emitted = [false, true, false, true, false];
        let appended = append_cyclic_remainder(&mut order, &emitted);
        assert_eq!(appended, vec![0, 2, 4]);
        assert_eq!(order, vec![3, 1, 0, 2, 4]);
    }

    #[test]
    fn test_duplicate_names_break_ties_by_position() {
        let concepts = vec![Concept::new("b", "Same"), Concept::new("a", "Same")];
        let seq = sequence_concepts(&concepts, &explicit_only(&concepts));
        assert_eq!(seq.order, vec![0, 1]);
    }
}

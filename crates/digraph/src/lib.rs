// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Small generic directed-graph helper shared by the module dependency graph
//! and the live variable-reference graph: both need the same tri-color DFS
//! cycle check, just over different node/edge types.

use std::collections::HashMap;
use std::hash::Hash;

use petgraph::prelude::DiGraph;

/// NodeIndex as employed throughout this crate's callers.
pub type NodeIndex = petgraph::prelude::NodeIndex<u32>;

/// Simplistic encapsulation of petgraph APIs. `E` is the edge payload (e.g.
/// the source position of a `deps` entry); callers that don't need one can
/// use `Dag<N>` (edge weight defaults to `()`).
#[derive(Debug, Clone)]
pub struct Dag<N, E = ()>(DiGraph<N, E, u32>);

impl<N, E> Default for Dag<N, E> {
    fn default() -> Self {
        Self(DiGraph::default())
    }
}

impl<N, E> Dag<N, E>
where
    N: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds node N to the graph and returns the index.
    ///
    /// If N already exists, it'll return the index of that node.
    pub fn add_node_or_get_index(&mut self, node: &N) -> NodeIndex {
        if let Some(index) = self.get_index(node) {
            index
        } else {
            self.0.add_node(node.clone())
        }
    }

    pub fn node_exists(&self, node: &N) -> bool {
        self.get_index(node).is_some()
    }

    /// Add an edge from a to b, carrying `weight`. Unlike a plain DAG builder
    /// this does NOT refuse edges that would create a cycle: cycles are a
    /// file-author error to be *reported*, not a programming invariant to
    /// silently enforce, so they must be representable before [`Dag::find_cycles`]
    /// can find them.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex, weight: E) {
        self.0.add_edge(a, b, weight);
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &'_ N> {
        self.0.node_weights()
    }

    pub fn get_index(&self, node: &N) -> Option<NodeIndex> {
        self.0.node_indices().find(|i| self.0[*i] == *node)
    }
}

/// One discovered cycle: `start` both opens and closes it (the node the back
/// edge lands on), `edges` lists the cycle's edges in traversal order.
#[derive(Debug, Clone)]
pub struct Cycle<N, E> {
    pub start: N,
    pub edges: Vec<(N, N, E)>,
}

impl<N, E> Dag<N, E>
where
    N: Clone + PartialEq + Eq + Hash,
    E: Clone,
{
    /// Tri-color DFS cycle detection (§4.4, §4.8, §9). Roots are visited in
    /// node-insertion order for determinism; nodes already consumed by a
    /// discovered cycle are not re-explored as fresh roots or descended into
    /// again. Implemented iteratively (explicit stack) per §9's guidance to
    /// avoid deep recursion on large graphs.
    pub fn find_cycles(&self) -> Vec<Cycle<N, E>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let indices: Vec<NodeIndex> = self.0.node_indices().collect();
        let mut color: HashMap<NodeIndex, Color> = indices.iter().map(|&i| (i, Color::White)).collect();
        let mut cycles = Vec::new();

        for &root in &indices {
            if color[&root] != Color::White {
                continue;
            }

            let mut stack: Vec<(NodeIndex, usize)> = vec![(root, 0)];
            let mut path: Vec<NodeIndex> = vec![root];
            color.insert(root, Color::Gray);

            while let Some(&(node, pos)) = stack.last() {
                let neighbors: Vec<(NodeIndex, E)> =
                    self.0.edges(node).map(|e| (e.target(), e.weight().clone())).collect();

                if pos >= neighbors.len() {
                    color.insert(node, Color::Black);
                    stack.pop();
                    path.pop();
                    continue;
                }

                stack.last_mut().unwrap().1 += 1;
                let (next, weight) = neighbors[pos].clone();

                match color[&next] {
                    Color::White => {
                        color.insert(next, Color::Gray);
                        path.push(next);
                        stack.push((next, 0));
                    }
                    Color::Gray => {
                        let start_pos = path.iter().position(|&n| n == next).expect("gray node must be on path");

                        let mut edges = Vec::new();
                        for pair in path[start_pos..].windows(2) {
                            let (a, b) = (pair[0], pair[1]);
                            let w = self.0.edges(a).find(|e| e.target() == b).unwrap().weight().clone();
                            edges.push((self.0[a].clone(), self.0[b].clone(), w));
                        }
                        edges.push((self.0[node].clone(), self.0[next].clone(), weight));

                        cycles.push(Cycle {
                            start: self.0[next].clone(),
                            edges,
                        });

                        for &n in &path[start_pos..] {
                            color.insert(n, Color::Black);
                        }
                        while stack.len() > start_pos + 1 {
                            stack.pop();
                            path.pop();
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cycle_in_linear_chain() {
        let mut graph: Dag<i32> = Dag::new();
        let a = graph.add_node_or_get_index(&1);
        let b = graph.add_node_or_get_index(&2);
        let c = graph.add_node_or_get_index(&3);
        graph.add_edge(a, b, ());
        graph.add_edge(b, c, ());

        assert!(graph.find_cycles().is_empty());
    }

    #[test]
    fn detects_two_node_cycle() {
        let mut graph: Dag<&str> = Dag::new();
        let a = graph.add_node_or_get_index(&"A");
        let b = graph.add_node_or_get_index(&"B");
        graph.add_edge(a, b, "A->B");
        graph.add_edge(b, a, "B->A");

        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].edges.len(), 2);
        // the start is reachable from every node in the cycle, trivially true
        // for a 2-cycle; assert its presence on both edge endpoints.
        let start = cycles[0].start;
        assert!(cycles[0].edges.iter().any(|(from, _, _)| *from == start));
    }

    #[test]
    fn detects_self_loop() {
        let mut graph: Dag<&str> = Dag::new();
        let a = graph.add_node_or_get_index(&"A");
        graph.add_edge(a, a, ());

        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].start, "A");
        assert_eq!(cycles[0].edges, vec![("A", "A", ())]);
    }

    #[test]
    fn independent_cycles_both_reported() {
        let mut graph: Dag<i32> = Dag::new();
        let a = graph.add_node_or_get_index(&1);
        let b = graph.add_node_or_get_index(&2);
        let c = graph.add_node_or_get_index(&3);
        let d = graph.add_node_or_get_index(&4);
        graph.add_edge(a, b, ());
        graph.add_edge(b, a, ());
        graph.add_edge(c, d, ());
        graph.add_edge(d, c, ());

        assert_eq!(graph.find_cycles().len(), 2);
    }
}

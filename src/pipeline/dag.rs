// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Dependency graph for units
//!
//! Nodes are keyed by id and connected by their `needs` lists. The graph
//! reports cycles and missing dependencies, and flattens a set of targets
//! into the dependency-first order the sequential pipelines run in.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{RexError, RexResult};

/// Anything that can live in a [`DependencyGraph`]
pub trait GraphNode {
    fn id(&self) -> &str;

    fn needs(&self) -> &[String];
}

/// Ids a unit needs that are not part of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub id: String,
    pub missing: Vec<String>,
}

/// Serializable id + needs pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEdges {
    pub id: String,
    #[serde(default)]
    pub needs: Vec<String>,
}

impl GraphNode for NodeEdges {
    fn id(&self) -> &str {
        &self.id
    }

    fn needs(&self) -> &[String] {
        &self.needs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Units keyed by id, in insertion order
#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
    nodes: Vec<Arc<N>>,
    index: HashMap<String, usize>,
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<N: GraphNode> DependencyGraph<N> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph, rejecting duplicate ids
    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> RexResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            if graph.contains(node.id()) {
                return Err(RexError::DuplicateId {
                    id: node.id().to_string(),
                });
            }
            graph.insert(node);
        }
        Ok(graph)
    }

    /// Insert a node. A node with the same id is replaced in place and
    /// returned.
    pub fn insert(&mut self, node: N) -> Option<Arc<N>> {
        let node = Arc::new(node);
        match self.index.get(node.id()) {
            Some(&i) => Some(std::mem::replace(&mut self.nodes[i], node)),
            None => {
                self.index.insert(node.id().to_string(), self.nodes.len());
                self.nodes.push(node);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<N>> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<N>> {
        self.nodes.iter()
    }

    /// All ids in insertion order
    pub fn ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id().to_string()).collect()
    }

    /// Every node that is part of a cycle, in insertion order
    ///
    /// Three-colour DFS with low-links: gray nodes are on the DFS stack, and
    /// reaching one again closes a cycle. A node is reported when its
    /// strongly connected component has more than one member or it needs
    /// itself.
    pub fn find_cyclical_references(&self) -> Vec<Arc<N>> {
        let adjacency = self.adjacency();
        let mut search = CycleSearch::new(&adjacency);

        for start in 0..self.nodes.len() {
            if search.marks[start] == Mark::White {
                search.visit(start);
            }
        }

        search
            .in_cycle
            .iter()
            .enumerate()
            .filter(|(_, cyclic)| **cyclic)
            .map(|(i, _)| Arc::clone(&self.nodes[i]))
            .collect()
    }

    /// For every node, the `needs` entries that are not in the graph
    pub fn missing_dependencies(&self) -> Vec<MissingDependency> {
        self.nodes
            .iter()
            .filter_map(|node| {
                let missing: Vec<String> = node
                    .needs()
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .cloned()
                    .collect();

                (!missing.is_empty()).then(|| MissingDependency {
                    id: node.id().to_string(),
                    missing,
                })
            })
            .collect()
    }

    /// Check the whole graph for cycles and missing dependencies
    pub fn validate(&self) -> RexResult<()> {
        let cyclic = self.find_cyclical_references();
        if !cyclic.is_empty() {
            return Err(RexError::CircularDependency {
                ids: cyclic.iter().map(|n| n.id().to_string()).collect(),
            });
        }

        if let Some(first) = self.missing_dependencies().into_iter().next() {
            return Err(RexError::UnknownDependency {
                unit: first.id,
                dependency: first.missing[0].clone(),
            });
        }

        Ok(())
    }

    /// Ordered closure of everything needed to run `targets`
    ///
    /// Each node appears once, after all of its `needs`. Targets are visited
    /// in the given order and dependencies in declaration order.
    pub fn flatten<S: AsRef<str>>(&self, targets: &[S]) -> RexResult<Vec<Arc<N>>> {
        let mut walk = Flatten {
            graph: self,
            marks: vec![Mark::White; self.nodes.len()],
            path: Vec::new(),
            order: Vec::new(),
        };

        for target in targets {
            let target = target.as_ref();
            let &i = self
                .index
                .get(target)
                .ok_or_else(|| RexError::TargetNotFound {
                    target: target.to_string(),
                })?;
            walk.visit(i)?;
        }

        Ok(walk
            .order
            .into_iter()
            .map(|i| Arc::clone(&self.nodes[i]))
            .collect())
    }

    /// Flatten every node in insertion order
    pub fn flatten_all(&self) -> RexResult<Vec<Arc<N>>> {
        self.flatten(&self.ids())
    }

    /// Serializable id + needs list
    pub fn edges(&self) -> Vec<NodeEdges> {
        self.nodes
            .iter()
            .map(|n| NodeEdges {
                id: n.id().to_string(),
                needs: n.needs().to_vec(),
            })
            .collect()
    }

    /// Build a petgraph view; edges point from a dependency to its dependent
    pub fn to_petgraph(&self) -> RexResult<DiGraph<String, ()>> {
        let mut graph = DiGraph::new();
        let indices: Vec<NodeIndex> = self
            .nodes
            .iter()
            .map(|n| graph.add_node(n.id().to_string()))
            .collect();

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in node.needs() {
                let &j = self
                    .index
                    .get(dep)
                    .ok_or_else(|| RexError::UnknownDependency {
                        unit: node.id().to_string(),
                        dependency: dep.clone(),
                    })?;
                if !graph.contains_edge(indices[j], indices[i]) {
                    graph.add_edge(indices[j], indices[i], ());
                }
            }
        }

        Ok(graph)
    }

    /// Topological order of the whole graph
    pub fn topological_order(&self) -> RexResult<Vec<String>> {
        let graph = self.to_petgraph()?;
        toposort(&graph, None)
            .map(|nodes| nodes.into_iter().map(|n| graph[n].clone()).collect())
            .map_err(|_| RexError::CircularDependency {
                ids: self
                    .find_cyclical_references()
                    .iter()
                    .map(|n| n.id().to_string())
                    .collect(),
            })
    }

    /// Check if `a` depends (directly or transitively) on `b`
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        let Ok(graph) = self.to_petgraph() else {
            return false;
        };

        has_path_connecting(&graph, NodeIndex::new(ib), NodeIndex::new(ia), None)
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in &self.nodes {
            out.push_str(&format!("    {}[{}]\n", node.id(), node.id()));
        }

        for node in &self.nodes {
            for dep in node.needs() {
                out.push_str(&format!("    {} --> {}\n", dep, node.id()));
            }
        }

        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph rexflow {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in &self.nodes {
            if node.needs().is_empty() {
                out.push_str(&format!("    \"{}\";\n", node.id()));
            }
            for dep in node.needs() {
                out.push_str(&format!("    \"{}\" -> \"{}\";\n", dep, node.id()));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Numbered run order with direct dependencies
    pub fn to_text(&self) -> RexResult<String> {
        let order = self.flatten_all()?;
        let mut out = String::new();

        for (i, node) in order.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, node.id()));

            if !node.needs().is_empty() {
                out.push_str(&format!(" [needs: {}]", node.needs().join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        self.nodes
            .iter()
            .map(|n| {
                n.needs()
                    .iter()
                    .filter_map(|dep| self.index.get(dep).copied())
                    .collect()
            })
            .collect()
    }
}

impl DependencyGraph<NodeEdges> {
    /// Rebuild a graph from serialized edges
    pub fn from_edges(edges: Vec<NodeEdges>) -> RexResult<Self> {
        Self::from_nodes(edges)
    }
}

struct Flatten<'g, N> {
    graph: &'g DependencyGraph<N>,
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl<N: GraphNode> Flatten<'_, N> {
    fn visit(&mut self, i: usize) -> RexResult<()> {
        match self.marks[i] {
            Mark::Black => return Ok(()),
            Mark::Gray => {
                let start = self.path.iter().position(|&p| p == i).unwrap_or(0);
                let mut ids: Vec<String> = self.path[start..]
                    .iter()
                    .map(|&p| self.graph.nodes[p].id().to_string())
                    .collect();
                ids.push(self.graph.nodes[i].id().to_string());
                return Err(RexError::CircularDependency { ids });
            }
            Mark::White => {}
        }

        self.marks[i] = Mark::Gray;
        self.path.push(i);

        let node = Arc::clone(&self.graph.nodes[i]);
        for dep in node.needs() {
            let &j = self
                .graph
                .index
                .get(dep)
                .ok_or_else(|| RexError::UnknownDependency {
                    unit: node.id().to_string(),
                    dependency: dep.clone(),
                })?;
            self.visit(j)?;
        }

        self.path.pop();
        self.marks[i] = Mark::Black;
        self.order.push(i);
        Ok(())
    }
}

struct CycleSearch<'a> {
    adjacency: &'a [Vec<usize>],
    marks: Vec<Mark>,
    discovered: Vec<usize>,
    low: Vec<usize>,
    stack: Vec<usize>,
    counter: usize,
    in_cycle: Vec<bool>,
}

impl<'a> CycleSearch<'a> {
    fn new(adjacency: &'a [Vec<usize>]) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            marks: vec![Mark::White; n],
            discovered: vec![0; n],
            low: vec![0; n],
            stack: Vec::new(),
            counter: 0,
            in_cycle: vec![false; n],
        }
    }

    fn visit(&mut self, v: usize) {
        self.discovered[v] = self.counter;
        self.low[v] = self.counter;
        self.counter += 1;
        self.marks[v] = Mark::Gray;
        self.stack.push(v);

        for &w in &self.adjacency[v] {
            match self.marks[w] {
                Mark::White => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Mark::Gray => self.low[v] = self.low[v].min(self.discovered[w]),
                Mark::Black => {}
            }
        }

        if self.low[v] == self.discovered[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.marks[w] = Mark::Black;
                component.push(w);
                if w == v {
                    break;
                }
            }

            if component.len() > 1 || self.adjacency[v].contains(&v) {
                for w in component {
                    self.in_cycle[w] = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: Vec<(&str, Vec<&str>)>) -> DependencyGraph<NodeEdges> {
        DependencyGraph::from_edges(
            nodes
                .into_iter()
                .map(|(id, needs)| NodeEdges {
                    id: id.into(),
                    needs: needs.into_iter().map(String::from).collect(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn ids(nodes: &[Arc<NodeEdges>]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn position(order: &[&str], id: &str) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn test_linear_flatten() {
        let g = graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);
        let order = g.flatten(&["c"]).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_flatten() {
        let g = graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);

        let flattened = g.flatten(&["d"]).unwrap();
        let order = ids(&flattened);

        assert_eq!(order.len(), 4);
        assert_eq!(order.iter().filter(|&&x| x == "a").count(), 1);
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "a") < position(&order, "c"));
        assert!(position(&order, "b") < position(&order, "d"));
        assert!(position(&order, "c") < position(&order, "d"));
    }

    #[test]
    fn test_flatten_only_includes_required_units() {
        let g = graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("unrelated", vec![]),
        ]);
        let order = g.flatten(&["b"]).unwrap();
        assert_eq!(ids(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_flatten_multiple_targets_dedupes() {
        let g = graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["a"])]);
        let order = g.flatten(&["b", "c", "b"]).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flatten_detects_cycle() {
        let g = graph(vec![("a", vec!["c"]), ("b", vec!["a"]), ("c", vec!["b"])]);
        match g.flatten(&["a"]) {
            Err(RexError::CircularDependency { ids }) => {
                assert_eq!(ids.first(), ids.last());
                assert_eq!(ids.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_flatten_ignores_cycles_outside_targets() {
        let g = graph(vec![("a", vec![]), ("x", vec!["y"]), ("y", vec!["x"])]);
        assert_eq!(ids(&g.flatten(&["a"]).unwrap()), vec!["a"]);
        assert!(g.flatten(&["x"]).is_err());
    }

    #[test]
    fn test_flatten_missing_dependency() {
        let g = graph(vec![("a", vec!["ghost"])]);
        let result = g.flatten(&["a"]);
        assert!(matches!(
            result,
            Err(RexError::UnknownDependency { ref unit, ref dependency })
                if unit == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_flatten_unknown_target() {
        let g = graph(vec![("a", vec![])]);
        assert!(matches!(
            g.flatten(&["nope"]),
            Err(RexError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn test_find_cyclical_references() {
        let g = graph(vec![
            ("ok", vec![]),
            ("a", vec!["b"]),
            ("b", vec!["a"]),
            ("self", vec!["self"]),
            ("downstream", vec!["a"]),
        ]);

        let cyclic = g.find_cyclical_references();
        assert_eq!(ids(&cyclic), vec!["a", "b", "self"]);
    }

    #[test]
    fn test_cycle_members_reached_through_finished_nodes() {
        // w reaches p directly and through q; every node of w → q → p → w
        // must be reported even though p is finished before q is explored
        let g = graph(vec![("w", vec!["p", "q"]), ("q", vec!["p"]), ("p", vec!["w"])]);
        let cyclic = g.find_cyclical_references();
        assert_eq!(ids(&cyclic), vec!["w", "q", "p"]);
    }

    #[test]
    fn test_missing_dependencies() {
        let g = graph(vec![
            ("a", vec!["x", "b"]),
            ("b", vec![]),
            ("c", vec!["y", "z"]),
        ]);

        let missing = g.missing_dependencies();
        assert_eq!(
            missing,
            vec![
                MissingDependency {
                    id: "a".into(),
                    missing: vec!["x".into()]
                },
                MissingDependency {
                    id: "c".into(),
                    missing: vec!["y".into(), "z".into()]
                },
            ]
        );
    }

    #[test]
    fn test_insert_last_write_wins() {
        let mut g = graph(vec![("a", vec![]), ("b", vec![])]);
        let old = g.insert(NodeEdges {
            id: "a".into(),
            needs: vec!["b".into()],
        });

        assert_eq!(old.unwrap().needs, Vec::<String>::new());
        assert_eq!(g.len(), 2);
        assert_eq!(g.get("a").unwrap().needs, vec!["b"]);
        assert_eq!(g.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_nodes_rejects_duplicates() {
        let result = DependencyGraph::from_nodes(vec![
            NodeEdges {
                id: "a".into(),
                needs: vec![],
            },
            NodeEdges {
                id: "a".into(),
                needs: vec![],
            },
        ]);
        assert!(matches!(result, Err(RexError::DuplicateId { .. })));
    }

    #[test]
    fn test_edges_round_trip() {
        let g = graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a", "b"]),
        ]);

        let json = serde_json::to_string(&g.edges()).unwrap();
        let edges: Vec<NodeEdges> = serde_json::from_str(&json).unwrap();
        let rebuilt = DependencyGraph::from_edges(edges).unwrap();

        assert_eq!(rebuilt.ids(), g.ids());
        assert_eq!(rebuilt.edges(), g.edges());
    }

    #[test]
    fn test_topological_order_matches_needs() {
        let g = graph(vec![("c", vec!["b"]), ("b", vec!["a"]), ("a", vec![])]);
        let order = g.topological_order().unwrap();
        let order: Vec<&str> = order.iter().map(String::as_str).collect();
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "c"));
    }

    #[test]
    fn test_depends_on_check() {
        let g = graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);

        assert!(g.depends_on("c", "a"));
        assert!(g.depends_on("c", "b"));
        assert!(!g.depends_on("a", "c"));
        assert!(!g.depends_on("a", "missing"));
    }

    #[test]
    fn test_validate() {
        assert!(graph(vec![("a", vec![])]).validate().is_ok());
        assert!(matches!(
            graph(vec![("a", vec!["a"])]).validate(),
            Err(RexError::CircularDependency { .. })
        ));
        assert!(matches!(
            graph(vec![("a", vec!["b"])]).validate(),
            Err(RexError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_text_output() {
        let g = graph(vec![("build", vec![]), ("test", vec!["build"])]);
        insta::assert_snapshot!(g.to_text().unwrap(), @r"
        1. build
        2. test [needs: build]
        ");
    }

    #[test]
    fn test_mermaid_output() {
        let g = graph(vec![("a", vec![]), ("b", vec!["a"])]);
        let mermaid = g.to_mermaid();

        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("a --> b"));
    }

    #[test]
    fn test_dot_output() {
        let g = graph(vec![("a", vec![]), ("b", vec!["a"])]);
        let dot = g.to_dot();

        assert!(dot.starts_with("digraph rexflow {"));
        assert!(dot.contains("\"a\" -> \"b\";"));
    }
}

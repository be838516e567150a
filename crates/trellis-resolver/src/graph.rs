//! Module graph with arena storage and iterative cycle detection
//!
//! Nodes are stored by index with explicit edge lists, so cycle detection
//! runs as an iterative coloring walk instead of recursing over an object
//! graph.

use std::collections::BTreeMap;
use thiserror::Error;
use trellis_model::Coordinate;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("cyclic dependency: {0}")]
    Cycle(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),
}

/// A module node: its coordinate plus edges to the modules it depends on
/// and the modules depending on it.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub coordinate: Coordinate,
    dependencies: Vec<usize>,
    dependents: Vec<usize>,
}

/// Directed acyclic graph of modules under build
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    index: BTreeMap<Coordinate, usize>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning its index. Adding the same coordinate twice
    /// returns the existing index.
    pub fn add_module(&mut self, coordinate: Coordinate) -> usize {
        if let Some(&existing) = self.index.get(&coordinate) {
            return existing;
        }
        let id = self.nodes.len();
        self.index.insert(coordinate.clone(), id);
        self.nodes.push(ModuleNode {
            coordinate,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        });
        id
    }

    /// Add a "from depends on to" edge
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.nodes[from].dependencies.contains(&to) {
            self.nodes[from].dependencies.push(to);
            self.nodes[to].dependents.push(from);
        }
    }

    pub fn index_of(&self, coordinate: &Coordinate) -> Option<usize> {
        self.index.get(coordinate).copied()
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.index.contains_key(coordinate)
    }

    pub fn node(&self, id: usize) -> &ModuleNode {
        &self.nodes[id]
    }

    pub fn coordinate(&self, id: usize) -> &Coordinate {
        &self.nodes[id].coordinate
    }

    /// Indices of the modules `id` depends on
    pub fn dependencies_of(&self, id: usize) -> &[usize] {
        &self.nodes[id].dependencies
    }

    /// Indices of the modules depending on `id`
    pub fn dependents_of(&self, id: usize) -> &[usize] {
        &self.nodes[id].dependents
    }

    /// All module indices, in insertion order
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        0..self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Transitive dependents of `id`, excluding `id` itself
    pub fn transitive_dependents(&self, id: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        let mut result = Vec::new();
        while let Some(current) = stack.pop() {
            for &dependent in &self.nodes[current].dependents {
                if !seen[dependent] {
                    seen[dependent] = true;
                    result.push(dependent);
                    stack.push(dependent);
                }
            }
        }
        result
    }

    /// Topological order, dependencies before dependents (Kahn's algorithm)
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.dependencies.len())
            .collect();
        let mut queue: Vec<usize> = self
            .indices()
            .filter(|&id| in_degree[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop() {
            order.push(id);
            for &dependent in &self.nodes[id].dependents {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::Cycle(self.find_cycle()));
        }
        Ok(order)
    }

    /// Reject the graph if it contains a cycle
    pub fn ensure_acyclic(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// Locate one cycle for error reporting, via iterative white/gray/black
    /// coloring.
    fn find_cycle(&self) -> String {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors = vec![Color::White; self.nodes.len()];

        for start in self.indices() {
            if colors[start] != Color::White {
                continue;
            }
            // Stack of (node, next edge offset); path mirrors the gray chain.
            let mut stack = vec![(start, 0usize)];
            let mut path = vec![start];
            colors[start] = Color::Gray;

            while !stack.is_empty() {
                let top = stack.len() - 1;
                let (node, offset) = stack[top];
                if offset < self.nodes[node].dependencies.len() {
                    stack[top].1 += 1;
                    let next = self.nodes[node].dependencies[offset];
                    match colors[next] {
                        Color::Gray => {
                            let from = path.iter().position(|&n| n == next).unwrap_or(0);
                            let mut names: Vec<String> = path[from..]
                                .iter()
                                .map(|&n| self.nodes[n].coordinate.to_string())
                                .collect();
                            names.push(self.nodes[next].coordinate.to_string());
                            return names.join(" -> ");
                        }
                        Color::White => {
                            colors[next] = Color::Gray;
                            stack.push((next, 0));
                            path.push(next);
                        }
                        Color::Black => {}
                    }
                } else {
                    colors[node] = Color::Black;
                    stack.pop();
                    path.pop();
                }
            }
        }

        "unknown cycle".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate(name: &str) -> Coordinate {
        Coordinate::new("io.trellis", name)
    }

    fn graph_of(edges: &[(&str, &str)], nodes: &[&str]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for name in nodes {
            graph.add_module(coordinate(name));
        }
        for (from, to) in edges {
            let from = graph.add_module(coordinate(from));
            let to = graph.add_module(coordinate(to));
            graph.add_edge(from, to);
        }
        graph
    }

    #[test]
    fn adding_same_coordinate_twice_is_idempotent() {
        let mut graph = ModuleGraph::new();
        let first = graph.add_module(coordinate("core"));
        let second = graph.add_module(coordinate("core"));
        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = graph_of(&[("cli", "core"), ("core", "util")], &["util", "core", "cli"]);
        let order = graph.topological_order().unwrap();
        let position = |name: &str| {
            order
                .iter()
                .position(|&id| graph.coordinate(id).name == name)
                .unwrap()
        };
        assert!(position("util") < position("core"));
        assert!(position("core") < position("cli"));
    }

    #[test]
    fn three_module_cycle_is_detected() {
        let graph = graph_of(&[("a", "b"), ("b", "c"), ("c", "a")], &["a", "b", "c"]);
        let err = graph.ensure_acyclic().unwrap_err();
        match err {
            GraphError::Cycle(path) => {
                assert!(path.contains("io.trellis:a"));
                assert!(path.contains("io.trellis:b"));
                assert!(path.contains("io.trellis:c"));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn self_cycle_is_detected() {
        let graph = graph_of(&[("a", "a")], &["a"]);
        assert!(graph.ensure_acyclic().is_err());
    }

    #[test]
    fn transitive_dependents_exclude_self() {
        let graph = graph_of(&[("cli", "core"), ("web", "cli")], &["core", "cli", "web"]);
        let core = graph.index_of(&coordinate("core")).unwrap();
        let mut names: Vec<&str> = graph
            .transitive_dependents(core)
            .into_iter()
            .map(|id| graph.coordinate(id).name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["cli", "web"]);
    }

    #[test]
    fn diamond_is_acyclic() {
        let graph = graph_of(
            &[("top", "left"), ("top", "right"), ("left", "base"), ("right", "base")],
            &["base", "left", "right", "top"],
        );
        assert!(graph.ensure_acyclic().is_ok());
    }
}

//! Cookbook dependency graph built from a lock document's edges.
//!
//! Nodes are cookbook names; an edge `a -> b` means `a` depends on `b`.
//! Names that appear on an edge but are not locked still get a node so the
//! shape of the graph is preserved, but they never show up in a closure.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

use super::{CookbookRecord, CookbookRegistry};

/// Color states for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Directed graph of cookbook dependencies.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, String>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from every locked cookbook and every recorded edge.
    #[must_use]
    pub fn from_registry(registry: &CookbookRegistry) -> Self {
        let mut graph = Self::new();
        for record in registry.cookbooks() {
            graph.ensure_node(&record.name);
        }
        for edge in registry.edges() {
            for target in &edge.dependencies {
                graph.add_dependency(&edge.cookbook, &target.name, &target.constraint);
            }
        }
        graph
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Record that `from` depends on `to` under `constraint`.
    pub fn add_dependency(&mut self, from: &str, to: &str, constraint: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, constraint.to_string());
        }
    }

    /// Direct dependency names of `name`, in insertion order.
    #[must_use]
    pub fn direct_dependencies(&self, name: &str) -> Vec<&str> {
        let Some(&index) = self.node_map.get(name) else {
            return Vec::new();
        };
        // petgraph yields neighbors most-recent-first
        let mut deps: Vec<&str> =
            self.graph.neighbors(index).map(|idx| self.graph[idx].as_str()).collect();
        deps.reverse();
        deps
    }

    /// Depth-first closure over the edges starting at `name`.
    ///
    /// Uses an explicit stack and a visited set keyed by name, so cycles
    /// terminate and diamonds yield each cookbook once. The start cookbook
    /// appears in the result only when something it depends on depends on it.
    #[must_use]
    pub fn transitive_dependencies(
        &self,
        name: &str,
        registry: &CookbookRegistry,
    ) -> Vec<CookbookRecord> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<&str> = self.direct_dependencies(name).into_iter().rev().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            match registry.get(current) {
                Some(record) => result.push(record.clone()),
                None => {
                    tracing::warn!(
                        target: "lockfile",
                        "Dependency '{}' is referenced by the lock document but not locked; skipping",
                        current
                    );
                    continue;
                }
            }
            for dep in self.direct_dependencies(current).into_iter().rev() {
                if !visited.contains(dep) {
                    stack.push(dep);
                }
            }
        }

        result
    }

    /// First dependency cycle found, as a closed path (`a -> b -> a`).
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();

        for start in self.graph.node_indices() {
            if colors[&start] != Color::White {
                continue;
            }
            // (node, remaining neighbors) frames
            let mut path: Vec<NodeIndex> = vec![start];
            let mut frames: Vec<Vec<NodeIndex>> = vec![self.graph.neighbors(start).collect()];
            colors.insert(start, Color::Gray);

            while let Some(pending) = frames.last_mut() {
                match pending.pop() {
                    Some(next) => match colors[&next] {
                        Color::Gray => {
                            let from = path.iter().position(|n| *n == next).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                path[from..].iter().map(|n| self.graph[*n].clone()).collect();
                            cycle.push(self.graph[next].clone());
                            return Some(cycle);
                        }
                        Color::White => {
                            colors.insert(next, Color::Gray);
                            path.push(next);
                            frames.push(self.graph.neighbors(next).collect());
                        }
                        Color::Black => {}
                    },
                    None => {
                        frames.pop();
                        if let Some(done) = path.pop() {
                            colors.insert(done, Color::Black);
                        }
                    }
                }
            }
        }
        None
    }

    /// Number of cookbooks in the graph, locked or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Render the dependency hierarchy below `root` as an ASCII tree.
    ///
    /// Re-entering a cookbook already on the printed branch is marked
    /// `(circular reference)` instead of being expanded again.
    #[must_use]
    pub fn to_tree_string(&self, root: &str) -> String {
        let mut result = format!("{root}\n");
        let mut branch = vec![root.to_string()];
        self.write_children(root, "", &mut branch, &mut result);
        result
    }

    fn write_children(&self, name: &str, prefix: &str, branch: &mut Vec<String>, out: &mut String) {
        let deps = self.direct_dependencies(name);
        for (i, dep) in deps.iter().enumerate() {
            let is_last = i + 1 == deps.len();
            let connector = if is_last { "└── " } else { "├── " };
            let child_prefix = if is_last { format!("{prefix}    ") } else { format!("{prefix}│   ") };
            out.push_str(&format!("{prefix}{connector}{dep}\n"));

            if branch.iter().any(|b| b == dep) {
                out.push_str(&format!("{child_prefix}└── (circular reference)\n"));
                continue;
            }
            branch.push((*dep).to_string());
            self.write_children(dep, &child_prefix, branch, out);
            branch.pop();
        }
    }
}

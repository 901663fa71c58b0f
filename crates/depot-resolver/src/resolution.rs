//! The result of a successful resolution.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use depot_core::{Candidate, Dependency, PackageName, ResolutionKey};

use crate::graph::ActivatedGraph;

/// A node in the resolved graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedNode {
    /// The project whose dependencies were resolved.
    Project,
    Package {
        key: ResolutionKey,
        candidate: Candidate,
    },
}

impl ResolvedNode {
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            ResolvedNode::Project => None,
            ResolvedNode::Package { candidate, .. } => Some(candidate),
        }
    }
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedNode::Project => f.write_str("project"),
            ResolvedNode::Package { key, candidate } if !key.platform.is_any() && candidate.platform.is_any() => {
                write!(f, "{candidate} [{}]", key.platform)
            }
            ResolvedNode::Package { candidate, .. } => write!(f, "{candidate}"),
        }
    }
}

/// One committed candidate per name and platform, with the requirements
/// that led to each.
#[derive(Debug, Clone)]
pub struct Resolution {
    graph: DiGraph<ResolvedNode, Dependency>,
    index: BTreeMap<ResolutionKey, NodeIndex>,
    root: NodeIndex,
    iterations: u64,
}

impl Resolution {
    pub(crate) fn from_graph(activated: &ActivatedGraph, iterations: u64) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(ResolvedNode::Project);
        let mut index = BTreeMap::new();

        for vertex in activated.vertices() {
            if let Some(candidate) = vertex.payload() {
                let node = graph.add_node(ResolvedNode::Package {
                    key: vertex.key().clone(),
                    candidate: candidate.clone(),
                });
                index.insert(vertex.key().clone(), node);
            }
        }

        for vertex in activated.vertices() {
            let Some(&node) = index.get(vertex.key()) else {
                continue;
            };
            for requirement in vertex.explicit_requirements() {
                graph.add_edge(root, node, requirement.clone());
            }
            for (child, requirement) in activated.dependencies_of(vertex.key()) {
                if let Some(&target) = index.get(child.key()) {
                    graph.add_edge(node, target, requirement.clone());
                }
            }
        }

        Self {
            graph,
            index,
            root,
            iterations,
        }
    }

    /// Search iterations the resolution took.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, key: &ResolutionKey) -> Option<&Candidate> {
        self.index.get(key).and_then(|&idx| self.graph[idx].candidate())
    }

    /// First platform variant of `name`, in key order.
    pub fn get_named(&self, name: &str) -> Option<&Candidate> {
        self.index
            .iter()
            .find(|(key, _)| key.name.as_str() == name)
            .and_then(|(_, &idx)| self.graph[idx].candidate())
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.index.keys().any(|key| &key.name == name)
    }

    /// Keys and candidates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResolutionKey, &Candidate)> {
        self.index
            .iter()
            .filter_map(|(key, &idx)| self.graph[idx].candidate().map(|c| (key, c)))
    }

    /// Committed candidates, dependencies before their dependents.
    ///
    /// Ties are broken by key, so the order is stable across runs.
    pub fn candidates(&self) -> Vec<(&ResolutionKey, &Candidate)> {
        let mut pending: BTreeMap<&ResolutionKey, usize> = BTreeMap::new();
        for (key, &idx) in &self.index {
            let children: HashSet<NodeIndex> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| e.target())
                .collect();
            pending.insert(key, children.len());
        }

        let mut ready: BTreeSet<&ResolutionKey> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&key, _)| key)
            .collect();
        let mut ordered = Vec::with_capacity(self.index.len());

        while let Some(key) = ready.pop_first() {
            pending.remove(key);
            let idx = self.index[key];
            if let Some(candidate) = self.graph[idx].candidate() {
                ordered.push((key, candidate));
            }
            let parents: HashSet<NodeIndex> = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .map(|e| e.source())
                .filter(|&p| p != self.root)
                .collect();
            for parent in parents {
                if let ResolvedNode::Package { key: parent_key, .. } = &self.graph[parent] {
                    if let Some(count) = pending.get_mut(parent_key) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(parent_key);
                        }
                    }
                }
            }
        }

        // Only reachable with a cycle, which resolution rejects.
        for key in pending.keys() {
            if let Some(candidate) = self.get(key) {
                ordered.push((key, candidate));
            }
        }
        ordered
    }

    /// Requirements the project itself declared, with what they resolved to.
    pub fn root_requirements(&self) -> Vec<(&Dependency, &Candidate)> {
        self.edges_from(self.root)
    }

    /// Direct dependencies of `key`.
    pub fn dependencies_of(&self, key: &ResolutionKey) -> Vec<(&Dependency, &Candidate)> {
        match self.index.get(key) {
            Some(&idx) => self.edges_from(idx),
            None => Vec::new(),
        }
    }

    /// Who depends on `key`; `None` stands for the project.
    pub fn dependents_of(&self, key: &ResolutionKey) -> Vec<(Option<&Candidate>, &Dependency)> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut dependents: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (self.graph[e.source()].candidate(), e.weight()))
            .collect();
        dependents.sort_by(|a, b| a.0.map(|c| &c.name).cmp(&b.0.map(|c| &c.name)));
        dependents
    }

    fn edges_from(&self, idx: NodeIndex) -> Vec<(&Dependency, &Candidate)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|e| self.graph[e.target()].candidate().map(|c| (e.weight(), c)))
            .collect();
        edges.sort_by(|a, b| a.1.name.cmp(&b.1.name).then_with(|| a.0.key().cmp(&b.0.key())));
        edges
    }

    fn children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        children.sort_by(|a, b| self.node_key(*a).cmp(&self.node_key(*b)));
        children
    }

    fn node_key(&self, idx: NodeIndex) -> Option<&ResolutionKey> {
        match &self.graph[idx] {
            ResolvedNode::Project => None,
            ResolvedNode::Package { key, .. } => Some(key),
        }
    }

    /// Render the graph as a tree, the way `depot tree` prints it.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = format!("{}\n", self.graph[self.root]);
        let mut visited = HashSet::new();
        visited.insert(self.root);

        let children = self.children(self.root);
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.print_subtree(&mut output, child, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let children = self.children(idx);
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.print_subtree(
                output,
                child,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Path from the project down to the first variant of `name`.
    pub fn find_path(&self, name: &str) -> Option<Vec<&Candidate>> {
        let target = self
            .index
            .iter()
            .find(|(key, _)| key.name.as_str() == name)
            .map(|(_, &idx)| idx)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(self.root, target, &mut path, &mut visited) {
            Some(path.iter().filter_map(|&idx| self.graph[idx].candidate()).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for child in self.children(current) {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }
}

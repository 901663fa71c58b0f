//! The activated graph: packages chosen so far and the requirements
//! between them.
//!
//! Vertices and edges live in index arenas. Every mutation is appended to
//! an action log, so a snapshot is just a position in that log ([`Tag`])
//! and backtracking replays the log in reverse instead of copying the
//! graph per choice point.

use std::collections::{BTreeMap, HashSet};

use depot_core::{Candidate, Dependency, PackageName, ResolutionKey};

/// Index of a vertex in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

/// Index of an edge in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(usize);

/// Position in the action log; rewinding to it restores the graph exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag(usize);

/// One package/platform slot in the graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    key: ResolutionKey,
    payload: Option<Candidate>,
    explicit_requirements: Vec<Dependency>,
    root: bool,
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
}

impl Vertex {
    pub fn key(&self) -> &ResolutionKey {
        &self.key
    }

    pub fn name(&self) -> &PackageName {
        &self.key.name
    }

    /// The committed candidate, or `None` while unfixed.
    pub fn payload(&self) -> Option<&Candidate> {
        self.payload.as_ref()
    }

    /// Requirements placed on this vertex by the project itself.
    pub fn explicit_requirements(&self) -> &[Dependency] {
        &self.explicit_requirements
    }

    pub fn is_root(&self) -> bool {
        self.root
    }
}

/// "origin requires this constraint of destination".
#[derive(Debug, Clone)]
pub struct Edge {
    origin: VertexId,
    destination: VertexId,
    requirement: Dependency,
    live: bool,
}

impl Edge {
    pub fn requirement(&self) -> &Dependency {
        &self.requirement
    }
}

#[derive(Debug, Clone)]
enum Action {
    AddVertex,
    SetPayload {
        vertex: VertexId,
        previous: Option<Candidate>,
    },
    AddExplicit {
        vertex: VertexId,
        was_root: bool,
    },
    AddEdge,
    DetachEdge {
        edge: EdgeId,
    },
}

/// Mutable-but-reversible graph of activated packages.
#[derive(Debug, Clone, Default)]
pub struct ActivatedGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    index: BTreeMap<ResolutionKey, VertexId>,
    log: Vec<Action>,
}

impl ActivatedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a requirement that no package declared.
    ///
    /// Only explicit requirements make the vertex a root; lockfile-carried
    /// ones constrain it without promoting it.
    pub fn add_root(&mut self, requirement: Dependency) -> VertexId {
        let id = self.vertex_for(requirement.key());
        let vertex = &mut self.vertices[id.0];
        self.log.push(Action::AddExplicit {
            vertex: id,
            was_root: vertex.root,
        });
        vertex.root |= requirement.explicit;
        vertex.explicit_requirements.push(requirement);
        id
    }

    /// Add `requirement` as an edge from `parent` to the vertex it names.
    ///
    /// Fails with the cycle (starting and ending at `parent`) when the new
    /// edge would close a loop.
    pub fn add_child(
        &mut self,
        parent: &ResolutionKey,
        requirement: Dependency,
    ) -> Result<VertexId, Vec<ResolutionKey>> {
        let origin = self.vertex_for(parent.clone());
        let destination = self.vertex_for(requirement.key());
        if let Some(path) = self.path_between(destination, origin) {
            let mut cycle = vec![parent.clone()];
            cycle.extend(path.into_iter().map(|id| self.vertices[id.0].key.clone()));
            return Err(cycle);
        }

        let edge = EdgeId(self.edges.len());
        self.edges.push(Edge {
            origin,
            destination,
            requirement,
            live: true,
        });
        self.vertices[origin.0].outgoing.push(edge);
        self.vertices[destination.0].incoming.push(edge);
        self.log.push(Action::AddEdge);
        Ok(destination)
    }

    /// Commit `candidate` to the vertex for `key`.
    pub fn set_payload(&mut self, key: &ResolutionKey, candidate: Candidate) {
        let id = self.vertex_for(key.clone());
        let previous = self.vertices[id.0].payload.replace(candidate);
        self.log.push(Action::SetPayload {
            vertex: id,
            previous,
        });
    }

    /// Drop the edges carrying `requirement` into `key`.
    ///
    /// Used when a requirement is allowed to go unsatisfied.
    pub fn detach_requirement(&mut self, key: &ResolutionKey, requirement: &Dependency) {
        let Some(&id) = self.index.get(key) else {
            return;
        };
        let incoming = self.vertices[id.0].incoming.clone();
        for edge in incoming {
            let e = &mut self.edges[edge.0];
            if e.live && &e.requirement == requirement {
                e.live = false;
                self.log.push(Action::DetachEdge { edge });
            }
        }
    }

    /// Snapshot of the current state.
    pub fn tag(&self) -> Tag {
        Tag(self.log.len())
    }

    /// Undo every mutation made after `tag` was taken.
    pub fn rewind_to(&mut self, tag: Tag) {
        while self.log.len() > tag.0 {
            let Some(action) = self.log.pop() else {
                break;
            };
            self.undo(action);
        }
    }

    fn undo(&mut self, action: Action) {
        match action {
            Action::AddVertex => {
                if let Some(vertex) = self.vertices.pop() {
                    debug_assert!(vertex.incoming.is_empty() && vertex.outgoing.is_empty());
                    self.index.remove(&vertex.key);
                }
            }
            Action::SetPayload { vertex, previous } => {
                self.vertices[vertex.0].payload = previous;
            }
            Action::AddExplicit { vertex, was_root } => {
                let v = &mut self.vertices[vertex.0];
                v.explicit_requirements.pop();
                v.root = was_root;
            }
            Action::AddEdge => {
                if let Some(edge) = self.edges.pop() {
                    // Later edges were undone first, so this one is last in both lists.
                    self.vertices[edge.origin.0].outgoing.pop();
                    self.vertices[edge.destination.0].incoming.pop();
                }
            }
            Action::DetachEdge { edge } => {
                self.edges[edge.0].live = true;
            }
        }
    }

    fn vertex_for(&mut self, key: ResolutionKey) -> VertexId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = VertexId(self.vertices.len());
        self.vertices.push(Vertex {
            key: key.clone(),
            payload: None,
            explicit_requirements: Vec::new(),
            root: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        self.index.insert(key, id);
        self.log.push(Action::AddVertex);
        id
    }

    /// Vertices reachable from `from` along live edges, as a path to `to`.
    fn path_between(&self, from: VertexId, to: VertexId) -> Option<Vec<VertexId>> {
        let mut stack = vec![(from, vec![from])];
        let mut visited = HashSet::new();
        while let Some((current, path)) = stack.pop() {
            if current == to {
                return Some(path);
            }
            if !visited.insert(current) {
                continue;
            }
            for edge in self.vertices[current.0].outgoing.iter().rev() {
                let e = &self.edges[edge.0];
                if e.live && !visited.contains(&e.destination) {
                    let mut next = path.clone();
                    next.push(e.destination);
                    stack.push((e.destination, next));
                }
            }
        }
        None
    }

    pub fn vertex(&self, key: &ResolutionKey) -> Option<&Vertex> {
        self.index.get(key).map(|id| &self.vertices[id.0])
    }

    pub fn payload(&self, key: &ResolutionKey) -> Option<&Candidate> {
        self.vertex(key).and_then(Vertex::payload)
    }

    /// All vertices in key order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.index.values().map(|id| &self.vertices[id.0])
    }

    /// Every platform variant of `name`.
    pub fn vertices_named<'a>(&'a self, name: &'a PackageName) -> impl Iterator<Item = &'a Vertex> {
        self.vertices().filter(move |v| v.name() == name)
    }

    /// Every requirement placed on `key`: explicit ones first, then edges
    /// in the order they were added.
    pub fn requirements(&self, key: &ResolutionKey) -> Vec<&Dependency> {
        let Some(vertex) = self.vertex(key) else {
            return Vec::new();
        };
        vertex
            .explicit_requirements
            .iter()
            .chain(
                vertex
                    .incoming
                    .iter()
                    .map(|e| &self.edges[e.0])
                    .filter(|e| e.live)
                    .map(|e| &e.requirement),
            )
            .collect()
    }

    /// Live outgoing edges of `key` with their destination vertices.
    pub fn dependencies_of(&self, key: &ResolutionKey) -> Vec<(&Vertex, &Dependency)> {
        let Some(vertex) = self.vertex(key) else {
            return Vec::new();
        };
        vertex
            .outgoing
            .iter()
            .map(|e| &self.edges[e.0])
            .filter(|e| e.live)
            .map(|e| (&self.vertices[e.destination.0], &e.requirement))
            .collect()
    }

    /// Number of vertices, fixed or not.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

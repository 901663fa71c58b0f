//! Choice points of the search and the conflicts learned from them.

use std::collections::{BTreeSet, HashMap};

use depot_core::{Candidate, Dependency, ResolutionKey, Version};

use crate::conflict::{Conflict, RejectReason, Rejection};
use crate::graph::{ActivatedGraph, Tag};

/// One choice point: a requirement and the candidates left to try for it.
#[derive(Debug, Clone)]
pub(crate) struct ResolutionState {
    pub requirement: Dependency,
    pub key: ResolutionKey,
    /// Pending requirements at the moment this choice point was created.
    pub requirements: Vec<Dependency>,
    possibilities: Vec<Candidate>,
    next: usize,
    pub depth: usize,
    /// Graph snapshot taken before anything was activated here.
    pub tag: Tag,
    /// Depths of earlier choice points implicated in failures below this one.
    pub blamed: BTreeSet<usize>,
    pub rejected: Vec<Rejection>,
}

impl ResolutionState {
    pub fn new(
        requirement: Dependency,
        requirements: Vec<Dependency>,
        possibilities: Vec<Candidate>,
        depth: usize,
        tag: Tag,
    ) -> Self {
        Self {
            key: requirement.key(),
            requirement,
            requirements,
            possibilities,
            next: 0,
            depth,
            tag,
            blamed: BTreeSet::new(),
            rejected: Vec::new(),
        }
    }

    /// Advance to the next untried candidate.
    pub fn next_possibility(&mut self) -> Option<Candidate> {
        let candidate = self.possibilities.get(self.next).cloned()?;
        self.next += 1;
        Some(candidate)
    }

    /// The candidate most recently handed out.
    pub fn current(&self) -> Option<&Candidate> {
        self.next.checked_sub(1).and_then(|i| self.possibilities.get(i))
    }

    pub fn remaining(&self) -> usize {
        self.possibilities.len() - self.next
    }

    /// Whether any candidate failed the requirement itself, as opposed to
    /// failing further down.
    pub fn has_direct_rejections(&self) -> bool {
        self.rejected
            .iter()
            .any(|r| matches!(r.reason, RejectReason::Unsatisfied { .. }))
    }
}

/// Stack of open choice points, indexed by the vertex each one decides.
#[derive(Debug, Default)]
pub(crate) struct StateStack {
    states: Vec<ResolutionState>,
    positions: HashMap<ResolutionKey, usize>,
}

impl StateStack {
    pub fn push(&mut self, state: ResolutionState) {
        self.positions.insert(state.key.clone(), self.states.len());
        self.states.push(state);
    }

    /// Drop every choice point above `len`.
    pub fn truncate(&mut self, len: usize) {
        while self.states.len() > len {
            if let Some(state) = self.states.pop() {
                self.positions.remove(&state.key);
            }
        }
    }

    pub fn top(&self) -> Option<&ResolutionState> {
        self.states.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ResolutionState> {
        self.states.last_mut()
    }

    pub fn get(&self, depth: usize) -> Option<&ResolutionState> {
        self.states.get(depth)
    }

    pub fn get_mut(&mut self, depth: usize) -> Option<&mut ResolutionState> {
        self.states.get_mut(depth)
    }

    /// Depth of the choice point that decided `key`.
    pub fn position(&self, key: &ResolutionKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
}

type Literal = (ResolutionKey, Version);

/// The vertex a failure was about, and the requirement that failed, if one
/// did.
#[derive(Debug, Clone)]
pub(crate) struct Culprit {
    pub key: ResolutionKey,
    pub requirement: Option<Dependency>,
}

/// A set of (vertex, version) assignments that cannot all hold in any
/// solution.
#[derive(Debug, Clone)]
pub(crate) struct Nogood {
    literals: Vec<Literal>,
    pub culprit: Culprit,
    /// Conflict recorded when the combination was first found to fail.
    pub conflict: Option<Conflict>,
}

impl Nogood {
    pub fn keys(&self) -> Vec<ResolutionKey> {
        self.literals.iter().map(|(key, _)| key.clone()).collect()
    }
}

/// Combinations of choices already shown to lead nowhere.
///
/// Once every assignment of an entry is active again the search backtracks
/// immediately instead of re-exploring the subtree. Sound as long as the
/// provider answers `satisfies` from the dependency, the candidate and
/// same-name vertices only.
#[derive(Debug, Default)]
pub(crate) struct LearnedConflicts {
    nogoods: Vec<Nogood>,
    watches: HashMap<Literal, Vec<usize>>,
}

impl LearnedConflicts {
    pub fn learn(&mut self, mut literals: Vec<Literal>, culprit: Culprit, conflict: Option<Conflict>) {
        if literals.is_empty() {
            return;
        }
        literals.sort();
        literals.dedup();
        if self.nogoods.iter().any(|n| n.literals == literals) {
            return;
        }
        let id = self.nogoods.len();
        for literal in &literals {
            self.watches.entry(literal.clone()).or_default().push(id);
        }
        self.nogoods.push(Nogood {
            literals,
            culprit,
            conflict,
        });
    }

    /// A learned combination that has just become fully active through
    /// `key` taking `version`.
    pub fn violated(&self, key: &ResolutionKey, version: &Version, graph: &ActivatedGraph) -> Option<&Nogood> {
        let ids = self.watches.get(&(key.clone(), version.clone()))?;
        ids.iter().map(|&id| &self.nogoods[id]).find(|nogood| {
            nogood
                .literals
                .iter()
                .all(|(k, v)| graph.payload(k).is_some_and(|c| &c.version == v))
        })
    }

    pub fn len(&self) -> usize {
        self.nogoods.len()
    }
}

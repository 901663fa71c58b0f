//! The seam between the search engine and the package universe.

use depot_core::{Candidate, Dependency};

use crate::conflict::ConflictSet;
use crate::error::ProviderError;
use crate::graph::ActivatedGraph;

/// Source of candidates and metadata for the resolver.
///
/// Implementations must be deterministic: the same question asked twice
/// within one resolution has to produce the same answer, including order.
/// The engine caches `candidates_for` per name, platform and constraint.
pub trait Provider {
    /// Candidates that may fill `dependency`, best first.
    ///
    /// `Err(ProviderError::UnknownPackage)` means the name does not exist at
    /// all. An empty list means the name exists but nothing fits.
    fn candidates_for(&self, dependency: &Dependency) -> Result<Vec<Candidate>, ProviderError>;

    /// Dependencies `candidate` declares.
    fn dependencies_of(&self, candidate: &Candidate) -> Result<Vec<Dependency>, ProviderError>;

    /// Whether `candidate` fulfils `dependency` given what is already
    /// activated.
    ///
    /// The answer may only depend on the dependency, the candidate, and
    /// vertices sharing the candidate's name.
    fn satisfies(
        &self,
        dependency: &Dependency,
        _graph: &ActivatedGraph,
        candidate: &Candidate,
    ) -> bool {
        candidate.name == dependency.name
            && candidate.platform.is_compatible(&dependency.platform())
            && dependency.constraint.matches(&candidate.version)
    }

    /// Reorder the pending requirements; the first one is resolved next.
    ///
    /// Must be a stable permutation of the input.
    fn sort_for_search(
        &self,
        mut dependencies: Vec<Dependency>,
        graph: &ActivatedGraph,
        conflicts: &ConflictSet,
    ) -> Vec<Dependency> {
        dependencies.sort_by_key(|dep| {
            let key = dep.key();
            (graph.payload(&key).is_none(), !conflicts.contains(&key))
        });
        dependencies
    }

    /// Whether `dependency` may be dropped when nothing can satisfy it.
    fn allow_missing(&self, _dependency: &Dependency) -> bool {
        false
    }

    /// Label used when the dependency appears in an error.
    fn display_name(&self, dependency: &Dependency) -> String {
        dependency.to_string()
    }
}

impl<P: Provider + ?Sized> Provider for &P {
    fn candidates_for(&self, dependency: &Dependency) -> Result<Vec<Candidate>, ProviderError> {
        (**self).candidates_for(dependency)
    }

    fn dependencies_of(&self, candidate: &Candidate) -> Result<Vec<Dependency>, ProviderError> {
        (**self).dependencies_of(candidate)
    }

    fn satisfies(
        &self,
        dependency: &Dependency,
        graph: &ActivatedGraph,
        candidate: &Candidate,
    ) -> bool {
        (**self).satisfies(dependency, graph, candidate)
    }

    fn sort_for_search(
        &self,
        dependencies: Vec<Dependency>,
        graph: &ActivatedGraph,
        conflicts: &ConflictSet,
    ) -> Vec<Dependency> {
        (**self).sort_for_search(dependencies, graph, conflicts)
    }

    fn allow_missing(&self, dependency: &Dependency) -> bool {
        (**self).allow_missing(dependency)
    }

    fn display_name(&self, dependency: &Dependency) -> String {
        (**self).display_name(dependency)
    }
}

//! Errors produced by providers and by the resolution engine.

use std::time::Duration;

use depot_core::{PackageName, ResolutionKey};
use depot_util::errors::DepotError;
use miette::Diagnostic;
use thiserror::Error;

use crate::conflict::ConflictSet;

/// Failure reported by a [`Provider`](crate::provider::Provider).
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ProviderError {
    /// The provider has never heard of this name.
    #[error("package `{name}` is not known to any source")]
    UnknownPackage { name: PackageName },

    /// The metadata backend failed outright.
    #[error("metadata backend failed: {message}")]
    Backend { message: String },
}

/// Why a resolution did not produce a graph.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error(
        "Could not find `{dependency}` in any source (required by {})",
        .required_by.join(", required by ")
    )]
    #[diagnostic(
        code(depot::resolve::unknown_dependency),
        help("Check the name for typos, or list it under `allow-missing` in depot.toml")
    )]
    UnknownDependency {
        dependency: String,
        required_by: Vec<String>,
    },

    #[error("Dependency resolution failed: incompatible requirements\n\n{0}")]
    #[diagnostic(
        code(depot::resolve::version_conflict),
        help("Relax one of the constraints above, or unlock the packages involved")
    )]
    VersionConflict(Box<ConflictSet>),

    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    #[diagnostic(code(depot::resolve::cyclic_requirement))]
    CyclicRequirement { cycle: Vec<ResolutionKey> },

    #[error(
        "Package source failed (required by {}): {source}",
        .required_by.join(", required by ")
    )]
    #[diagnostic(code(depot::resolve::provider))]
    Provider {
        #[source]
        source: ProviderError,
        required_by: Vec<String>,
    },

    #[error("Resolution gave up after {limit} iterations")]
    #[diagnostic(
        code(depot::resolve::iteration_limit),
        help("Raise `max-iterations` in depot.toml or pin more versions")
    )]
    IterationLimit { limit: u64 },

    #[error("Resolution did not finish within {budget:?}")]
    #[diagnostic(code(depot::resolve::timed_out))]
    TimedOut { budget: Duration },

    #[error("Resolution task stopped unexpectedly: {message}")]
    #[diagnostic(code(depot::resolve::interrupted))]
    Interrupted { message: String },
}

impl ResolveError {
    /// The conflicts behind a failed resolution, if that is what happened.
    pub fn conflicts(&self) -> Option<&ConflictSet> {
        match self {
            ResolveError::VersionConflict(conflicts) => Some(conflicts),
            _ => None,
        }
    }
}

fn format_cycle(cycle: &[ResolutionKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl From<ResolveError> for DepotError {
    fn from(err: ResolveError) -> Self {
        DepotError::Generic {
            message: err.to_string(),
        }
    }
}

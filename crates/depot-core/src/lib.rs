//! Core data types for depot.
//!
//! This crate defines the vocabulary the resolver and its collaborators
//! share: package names and platforms, versions and constraints,
//! dependencies, candidates, locked state, and resolver configuration.
//!
//! This crate is intentionally free of async code and I/O beyond reading
//! the configuration file.

pub mod config;
pub mod dependency;
pub mod lockfile;
pub mod package;
pub mod version;

pub use dependency::{Dependency, PackageName, Platform, RequestSource, ResolutionKey};
pub use lockfile::{LockedCandidates, Unlock};
pub use package::Candidate;
pub use version::{Op, Version, VersionConstraint, VersionError};

//! Dependency resolution engine.
//!
//! Given root dependencies and a [`Provider`] that knows which candidates
//! exist, [`Resolver`] finds one candidate per package and platform that
//! satisfies every requirement in the closure, or explains why none exists.
//!
//! - [`graph`]: the reversible graph of activated packages
//! - [`resolver`]: the backtracking search loop
//! - [`conflict`]: conflict records and their rendering
//! - [`policy`]: lock-aware candidate ordering
//! - [`index`]: an in-memory [`Provider`]
//! - [`cache`]: parallel metadata prefetch into an index
//! - [`budget`]: wall-clock limits around a resolution

pub mod budget;
pub mod cache;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod index;
pub mod policy;
pub mod provider;
pub mod resolution;
pub mod resolver;
mod state;

pub use budget::resolve_within;
pub use cache::{warm_index, warm_index_with_config, MetadataSource};
pub use conflict::{Conflict, ConflictSet, RejectReason, Rejection};
pub use error::{ProviderError, ResolveError};
pub use graph::ActivatedGraph;
pub use index::PackageIndex;
pub use policy::{NewestFirst, SelectionContext, SelectionPolicy, VersionPromoter};
pub use provider::Provider;
pub use resolution::{Resolution, ResolvedNode};
pub use resolver::{ResolveOptions, Resolver};

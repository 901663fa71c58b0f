//! Shared utilities for depot.
//!
//! Holds the cross-cutting error type used by the configuration layer and
//! the `miette`-based result alias the outer layers report through.

pub mod errors;

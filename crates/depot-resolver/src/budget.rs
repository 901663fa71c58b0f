//! Wall-clock budgets for a whole resolution.

use std::time::Duration;

use depot_core::Dependency;

use crate::error::ResolveError;
use crate::provider::Provider;
use crate::resolution::Resolution;
use crate::resolver::{ResolveOptions, Resolver};

/// Run a resolution on the blocking pool and give up after `budget`.
///
/// The search has no cancellation point, so on timeout the worker keeps
/// running until it finishes on its own; its result is discarded.
pub async fn resolve_within<P>(
    provider: P,
    roots: Vec<Dependency>,
    options: ResolveOptions,
    budget: Duration,
) -> Result<Resolution, ResolveError>
where
    P: Provider + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        Resolver::new(provider).with_options(options).resolve(&roots)
    });

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ResolveError::Interrupted {
            message: e.to_string(),
        }),
        Err(_) => {
            tracing::warn!("Resolution exceeded its budget of {budget:?}");
            Err(ResolveError::TimedOut { budget })
        }
    }
}

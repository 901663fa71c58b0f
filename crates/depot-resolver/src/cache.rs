//! Warming a [`PackageIndex`] from a metadata source before resolution.
//!
//! The search loop never performs I/O, so everything it may ask about is
//! fetched up front: the closure of names reachable from the roots is walked
//! level by level, with each level fetched in parallel.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use depot_core::config::ResolverConfig;
use depot_core::{Candidate, Dependency, PackageName};

use crate::error::ProviderError;
use crate::index::PackageIndex;

/// Blocking source of package metadata (registry client, on-disk cache, ...).
pub trait MetadataSource: Send + Sync + 'static {
    /// Every published candidate of `name`, or `None` if the name is unknown.
    fn fetch(&self, name: &PackageName) -> Result<Option<Vec<Candidate>>, ProviderError>;
}

/// Tracks which names have been scheduled during one warm-up.
#[derive(Debug, Default)]
struct VisitedSet {
    visited: BTreeSet<PackageName>,
}

impl VisitedSet {
    /// Mark `name` as visited. Returns `false` if it already was.
    fn visit(&mut self, name: &PackageName) -> bool {
        self.visited.insert(name.clone())
    }
}

/// Fetch metadata for every name reachable from `roots` into a fresh index.
///
/// At most `concurrency` fetches run at once. Unknown names are left out of
/// the index, so the resolver reports them as unknown dependencies.
pub async fn warm_index(
    source: Arc<dyn MetadataSource>,
    roots: &[Dependency],
    concurrency: usize,
) -> Result<PackageIndex, ProviderError> {
    fill(PackageIndex::new(), source, roots, concurrency).await
}

/// [`warm_index`] driven by `config`: `prefetch-concurrency` bounds the
/// fetches, and the index carries the `[policy]` and `allow-missing`
/// settings.
pub async fn warm_index_with_config(
    source: Arc<dyn MetadataSource>,
    roots: &[Dependency],
    config: &ResolverConfig,
) -> Result<PackageIndex, ProviderError> {
    let index = PackageIndex::from_config(config);
    fill(index, source, roots, config.resolver.prefetch_concurrency).await
}

async fn fill(
    mut index: PackageIndex,
    source: Arc<dyn MetadataSource>,
    roots: &[Dependency],
    concurrency: usize,
) -> Result<PackageIndex, ProviderError> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut visited = VisitedSet::default();

    let mut level: Vec<PackageName> = roots
        .iter()
        .map(|d| d.name.clone())
        .filter(|name| visited.visit(name))
        .collect();
    let mut depth = 0usize;

    while !level.is_empty() {
        tracing::debug!("Fetching metadata for {} packages at depth {depth}", level.len());

        let mut join_set = JoinSet::new();
        for name in level.drain(..) {
            let source = source.clone();
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire().await;
                tokio::task::spawn_blocking(move || {
                    let result = source.fetch(&name);
                    (name, result)
                })
                .await
            });
        }

        let mut fetched: Vec<(PackageName, Vec<Candidate>)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (name, result) = joined
                .and_then(|inner| inner)
                .map_err(|e| ProviderError::Backend {
                    message: format!("metadata task failed: {e}"),
                })?;
            match result? {
                Some(candidates) => fetched.push((name, candidates)),
                None => tracing::debug!("{name} is not published by any source"),
            }
        }
        // completion order is arbitrary
        fetched.sort_by(|a, b| a.0.cmp(&b.0));

        let mut next = Vec::new();
        for (_, candidates) in fetched {
            for candidate in candidates {
                for dependency in &candidate.dependencies {
                    if visited.visit(&dependency.name) {
                        next.push(dependency.name.clone());
                    }
                }
                index.add(candidate);
            }
        }
        level = next;
        depth += 1;
    }

    tracing::debug!("Warmed index with {} packages", index.len());
    Ok(index)
}

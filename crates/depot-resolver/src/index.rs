//! In-memory package universe that implements [`Provider`].

use std::collections::{BTreeMap, BTreeSet};

use depot_core::config::ResolverConfig;
use depot_core::{Candidate, Dependency, LockedCandidates, PackageName, Unlock};

use crate::conflict::ConflictSet;
use crate::error::ProviderError;
use crate::graph::ActivatedGraph;
use crate::policy::{SelectionContext, SelectionPolicy, VersionPromoter};
use crate::provider::Provider;

/// Every known candidate, plus the lock and ordering policy to apply.
///
/// Locked names that are not unlocked are only ever offered their locked
/// candidate, which keeps re-resolution to a minimal diff.
#[derive(Debug, Clone)]
pub struct PackageIndex<S = VersionPromoter> {
    packages: BTreeMap<PackageName, Vec<Candidate>>,
    policy: S,
    locked: LockedCandidates,
    unlock: Unlock,
    allow_missing: BTreeSet<PackageName>,
    consistent_platforms: bool,
}

impl Default for PackageIndex<VersionPromoter> {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageIndex<VersionPromoter> {
    pub fn new() -> Self {
        Self {
            packages: BTreeMap::new(),
            policy: VersionPromoter::default(),
            locked: LockedCandidates::new(),
            unlock: Unlock::None,
            allow_missing: BTreeSet::new(),
            consistent_platforms: true,
        }
    }

    /// Apply the `[policy]` and `allow-missing` settings of `config`.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new()
            .with_policy(VersionPromoter::from_config(&config.policy))
            .with_allow_missing(config.resolver.allow_missing.iter().map(String::as_str))
    }
}

impl<S: SelectionPolicy> PackageIndex<S> {
    pub fn with_policy<T: SelectionPolicy>(self, policy: T) -> PackageIndex<T> {
        PackageIndex {
            packages: self.packages,
            policy,
            locked: self.locked,
            unlock: self.unlock,
            allow_missing: self.allow_missing,
            consistent_platforms: self.consistent_platforms,
        }
    }

    pub fn with_lock(mut self, locked: LockedCandidates, unlock: Unlock) -> Self {
        self.locked = locked;
        self.unlock = unlock;
        self
    }

    /// Let requirements on these names go unsatisfied instead of failing.
    pub fn with_allow_missing<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PackageName>,
    {
        self.allow_missing.extend(names.into_iter().map(Into::into));
        self
    }

    /// Require every platform variant of a name to share one version
    /// (on by default).
    pub fn consistent_platforms(mut self, consistent: bool) -> Self {
        self.consistent_platforms = consistent;
        self
    }

    /// Register `candidate`, replacing an earlier entry with the same
    /// version and platform.
    pub fn add(&mut self, candidate: Candidate) {
        let versions = self.packages.entry(candidate.name.clone()).or_default();
        versions.retain(|c| !(c.version == candidate.version && c.platform == candidate.platform));
        versions.push(candidate);
    }

    /// Builder form of [`PackageIndex::add`].
    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.add(candidate);
        self
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.packages.contains_key(name)
    }

    /// All candidates of `name`, in registration order.
    pub fn versions(&self, name: &PackageName) -> &[Candidate] {
        self.packages.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// Number of known names.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn matching(&self, dependency: &Dependency) -> Result<Vec<&Candidate>, ProviderError> {
        let versions = self
            .packages
            .get(&dependency.name)
            .ok_or_else(|| ProviderError::UnknownPackage {
                name: dependency.name.clone(),
            })?;
        let platform = dependency.platform();
        let locked = self.pinned(dependency);
        Ok(versions
            .iter()
            .filter(|c| c.platform.is_compatible(&platform))
            .filter(|c| self.accepts(dependency, c))
            .filter(|c| locked.map_or(true, |l| l.version == c.version))
            .collect())
    }

    /// Constraint check that also lets through pre-releases the policy
    /// opted in to, and a pre-release recorded in the lock.
    fn accepts(&self, dependency: &Dependency, candidate: &Candidate) -> bool {
        let version = &candidate.version;
        if dependency.constraint.matches(version) {
            return true;
        }
        version.is_prerelease()
            && dependency.constraint.admits(version)
            && (self.policy.allows_prerelease(&dependency.name)
                || self
                    .locked
                    .get(&dependency.key())
                    .is_some_and(|l| &l.version == version))
    }

    /// The locked candidate `dependency` is held to, if it may not move.
    fn pinned(&self, dependency: &Dependency) -> Option<&Candidate> {
        if self.unlock.allows(&dependency.name) {
            return None;
        }
        self.locked.get(&dependency.key())
    }
}

impl<S: SelectionPolicy> Provider for PackageIndex<S> {
    fn candidates_for(&self, dependency: &Dependency) -> Result<Vec<Candidate>, ProviderError> {
        let mut matching: Vec<Candidate> = self.matching(dependency)?.into_iter().cloned().collect();
        // deterministic input for the policy's stable sort
        matching.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.platform.cmp(&b.platform)));
        let context = SelectionContext {
            dependency,
            locked: self.locked.get(&dependency.key()),
            unlocking: self.unlock.allows(&dependency.name),
        };
        Ok(self.policy.order(&context, matching))
    }

    fn dependencies_of(&self, candidate: &Candidate) -> Result<Vec<Dependency>, ProviderError> {
        Ok(candidate.dependencies.clone())
    }

    fn satisfies(
        &self,
        dependency: &Dependency,
        graph: &ActivatedGraph,
        candidate: &Candidate,
    ) -> bool {
        if candidate.name != dependency.name
            || !candidate.platform.is_compatible(&dependency.platform())
            || !self.accepts(dependency, candidate)
        {
            return false;
        }
        if !self.consistent_platforms {
            return true;
        }
        let key = dependency.key();
        graph
            .vertices_named(&dependency.name)
            .filter(|v| v.key() != &key)
            .filter_map(|v| v.payload())
            .all(|other| other.version == candidate.version)
    }

    fn sort_for_search(
        &self,
        mut dependencies: Vec<Dependency>,
        graph: &ActivatedGraph,
        conflicts: &ConflictSet,
    ) -> Vec<Dependency> {
        dependencies.sort_by_cached_key(|dep| {
            let key = dep.key();
            let vertex = graph.vertex(&key);
            let activated = vertex.and_then(|v| v.payload()).is_some();
            let root = vertex.is_some_and(|v| v.is_root());
            let conflicted = conflicts.contains(&key);
            let count = if activated {
                0
            } else {
                self.matching(dep).map(|m| m.len()).unwrap_or(0)
            };
            (!activated, !root, !conflicted, count)
        });
        dependencies
    }

    fn allow_missing(&self, dependency: &Dependency) -> bool {
        self.allow_missing.contains(&dependency.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Platform, Version, VersionConstraint};

    fn candidate(name: &str, version: &str) -> Candidate {
        Candidate::new(name, Version::parse(version).unwrap())
    }

    fn index() -> PackageIndex {
        PackageIndex::new()
            .with_candidate(candidate("rack", "1.0"))
            .with_candidate(candidate("rack", "2.0"))
            .with_candidate(candidate("rack", "1.5"))
    }

    fn versions(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| c.version.to_string()).collect()
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = index()
            .candidates_for(&Dependency::new("ghost", VersionConstraint::any()))
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::UnknownPackage {
                name: PackageName::new("ghost")
            }
        );
    }

    #[test]
    fn known_name_with_no_match_is_empty() {
        let found = index()
            .candidates_for(&Dependency::parse("rack", ">= 5").unwrap())
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn filters_and_orders() {
        let found = index()
            .candidates_for(&Dependency::parse("rack", "< 2").unwrap())
            .unwrap();
        assert_eq!(versions(&found), vec!["1.5", "1.0"]);
    }

    #[test]
    fn lock_pins_until_unlocked() {
        let locked: LockedCandidates = [candidate("rack", "1.0")].into_iter().collect();
        let dep = Dependency::new("rack", VersionConstraint::any());

        let pinned = index().with_lock(locked.clone(), Unlock::None);
        assert_eq!(versions(&pinned.candidates_for(&dep).unwrap()), vec!["1.0"]);

        let unlocked = index().with_lock(locked, Unlock::names(["rack"]));
        assert_eq!(
            versions(&unlocked.candidates_for(&dep).unwrap()),
            vec!["2.0", "1.5", "1.0"]
        );
    }

    #[test]
    fn re_adding_replaces() {
        let mut idx = index();
        idx.add(candidate("rack", "1.0").depends_on(Dependency::new("json", VersionConstraint::any())));
        assert_eq!(idx.versions(&PackageName::new("rack")).len(), 3);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn platform_variants_must_agree() {
        let idx = PackageIndex::new();
        let mut graph = ActivatedGraph::new();
        graph.set_payload(
            &depot_core::ResolutionKey::new("ffi", Platform::new("java")),
            candidate("ffi", "1.0"),
        );
        let dep = Dependency::new("ffi", VersionConstraint::any()).for_platform(Platform::any());
        assert!(idx.satisfies(&dep, &graph, &candidate("ffi", "1.0")));
        assert!(!idx.satisfies(&dep, &graph, &candidate("ffi", "2.0")));

        let relaxed = PackageIndex::new().consistent_platforms(false);
        assert!(relaxed.satisfies(&dep, &graph, &candidate("ffi", "2.0")));
    }

    #[test]
    fn search_order_prefers_activated_then_fewest_candidates() {
        let idx = index().with_candidate(candidate("json", "1.0"));
        let graph = ActivatedGraph::new();
        let deps = vec![
            Dependency::new("rack", VersionConstraint::any()),
            Dependency::new("json", VersionConstraint::any()),
        ];
        let sorted = idx.sort_for_search(deps, &graph, &ConflictSet::new());
        assert_eq!(sorted[0].name, PackageName::new("json"));
    }

    #[test]
    fn from_config_allows_missing() {
        let config = ResolverConfig::parse_toml("[resolver]\nallow-missing = [\"ghost\"]\n").unwrap();
        let idx = PackageIndex::from_config(&config);
        assert!(idx.allow_missing(&Dependency::new("ghost", VersionConstraint::any())));
        assert!(!idx.allow_missing(&Dependency::new("rack", VersionConstraint::any())));
    }
}

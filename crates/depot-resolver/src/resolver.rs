//! The backtracking search loop.
//!
//! The loop alternates between selecting the next pending requirement and
//! activating candidates for the requirement on top of the state stack.
//! Every step returns a [`Step`]; conflicts are handled by the driving loop,
//! which jumps back to the most recent choice point implicated in the
//! failure rather than simply the previous one.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use depot_core::config::SearchConfig;
use depot_core::{Candidate, Dependency, RequestSource, ResolutionKey, VersionConstraint};

use crate::conflict::{
    Conflict, ConflictSet, RejectReason, Rejection, RequirementLink, RequirementTree,
};
use crate::error::{ProviderError, ResolveError};
use crate::graph::ActivatedGraph;
use crate::provider::Provider;
use crate::resolution::Resolution;
use crate::state::{Culprit, LearnedConflicts, ResolutionState, StateStack};

/// Knobs for a single resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Iterations between progress log lines; 0 disables them.
    pub progress_rate: u64,
    pub max_iterations: Option<u64>,
    /// Skip combinations of choices already known to fail.
    pub learn_conflicts: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for ResolveOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            progress_rate: config.progress_rate,
            max_iterations: config.max_iterations,
            learn_conflicts: config.learn_conflicts,
        }
    }
}

/// Resolves root dependencies against a [`Provider`].
///
/// Each call to [`Resolver::resolve`] starts from scratch; nothing carries
/// over between runs.
#[derive(Debug, Clone)]
pub struct Resolver<P> {
    provider: P,
    options: ResolveOptions,
}

impl<P: Provider> Resolver<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Find one candidate per name and platform satisfying every
    /// requirement reachable from `roots`.
    pub fn resolve(&self, roots: &[Dependency]) -> Result<Resolution, ResolveError> {
        let started = Instant::now();
        tracing::info!("Resolving {} root dependencies", roots.len());

        let mut search = Search::new(&self.provider, &self.options, roots);
        let result = search.run();

        match &result {
            Ok(resolution) => tracing::info!(
                "Resolved {} packages in {} iterations ({:.2?})",
                resolution.len(),
                search.iterations,
                started.elapsed()
            ),
            Err(e) => tracing::debug!(
                "Resolution failed after {} iterations ({:.2?}): {e}",
                search.iterations,
                started.elapsed()
            ),
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Selecting,
    Activating,
}

enum Cause {
    /// `requirement` does not accept the candidate already fixed for it.
    Existing {
        requirement: Dependency,
        existing: Candidate,
    },
    /// Nothing can fill `requirement`.
    NoCandidates { requirement: Dependency },
    /// The topmost choice point has run out of candidates.
    Exhausted,
    /// A combination of choices already known to fail is active again.
    Learned {
        keys: Vec<ResolutionKey>,
        culprit: Culprit,
        conflict: Option<Conflict>,
    },
}

enum Step {
    Continue,
    Conflict(Cause),
    Done,
}

struct Search<'a, P> {
    provider: &'a P,
    options: &'a ResolveOptions,
    graph: ActivatedGraph,
    stack: StateStack,
    queue: Vec<Dependency>,
    conflicts: ConflictSet,
    last_conflict: Option<Conflict>,
    learned: LearnedConflicts,
    candidates: HashMap<(ResolutionKey, VersionConstraint), Vec<Candidate>>,
    phase: Phase,
    iterations: u64,
}

impl<'a, P: Provider> Search<'a, P> {
    fn new(provider: &'a P, options: &'a ResolveOptions, roots: &[Dependency]) -> Self {
        let mut graph = ActivatedGraph::new();
        let mut queue = Vec::new();
        for root in roots {
            for dependency in root.expand_platforms() {
                let mut dependency = if dependency.source.is_root() {
                    dependency
                } else {
                    dependency.with_source(RequestSource::Root)
                };
                if dependency.source == RequestSource::Root {
                    dependency.explicit = true;
                }
                graph.add_root(dependency.clone());
                if !queue.contains(&dependency) {
                    queue.push(dependency);
                }
            }
        }

        Self {
            provider,
            options,
            graph,
            stack: StateStack::default(),
            queue,
            conflicts: ConflictSet::new(),
            last_conflict: None,
            learned: LearnedConflicts::default(),
            candidates: HashMap::new(),
            phase: Phase::Selecting,
            iterations: 0,
        }
    }

    fn run(&mut self) -> Result<Resolution, ResolveError> {
        loop {
            self.iterations += 1;
            if let Some(limit) = self.options.max_iterations {
                if self.iterations > limit {
                    return Err(ResolveError::IterationLimit { limit });
                }
            }
            if self.options.progress_rate > 0 && self.iterations % self.options.progress_rate == 0 {
                tracing::info!(
                    "Still resolving: {} iterations, {} choice points, {} requirements pending, {} conflicts learned",
                    self.iterations,
                    self.stack.len(),
                    self.queue.len(),
                    self.learned.len()
                );
            }

            let step = match self.phase {
                Phase::Selecting => self.select()?,
                Phase::Activating => self.activate()?,
            };
            match step {
                Step::Continue => {}
                Step::Conflict(cause) => self.unwind(cause)?,
                Step::Done => return Ok(Resolution::from_graph(&self.graph, self.iterations)),
            }
        }
    }

    fn select(&mut self) -> Result<Step, ResolveError> {
        if self.queue.is_empty() {
            return Ok(Step::Done);
        }
        let queue = std::mem::take(&mut self.queue);
        self.queue = self.provider.sort_for_search(queue, &self.graph, &self.conflicts);
        if self.queue.is_empty() {
            return Ok(Step::Done);
        }
        let requirement = self.queue.remove(0);
        let key = requirement.key();

        if let Some(existing) = self.graph.payload(&key) {
            if self.provider.satisfies(&requirement, &self.graph, existing) {
                tracing::trace!("{requirement} is already satisfied by {existing}");
                return Ok(Step::Continue);
            }
            tracing::debug!("{requirement} is not satisfied by the selected {existing}");
            let existing = existing.clone();
            return Ok(Step::Conflict(Cause::Existing {
                requirement,
                existing,
            }));
        }

        let possibilities = match self.search_for(&requirement) {
            Ok(found) => found,
            Err(ProviderError::UnknownPackage { .. }) if self.provider.allow_missing(&requirement) => {
                Vec::new()
            }
            Err(err) => return Err(self.provider_error(err, &requirement)),
        };

        if possibilities.is_empty() {
            if self.provider.allow_missing(&requirement) {
                tracing::warn!(
                    "No candidates for {}, continuing without it",
                    self.provider.display_name(&requirement)
                );
                self.graph.detach_requirement(&key, &requirement);
                return Ok(Step::Continue);
            }
            tracing::debug!("No candidates match {requirement}");
            return Ok(Step::Conflict(Cause::NoCandidates { requirement }));
        }

        let depth = self.stack.len();
        tracing::debug!(
            "[{depth}] Choosing {key} from {} candidates for {requirement}",
            possibilities.len()
        );
        let state = ResolutionState::new(
            requirement,
            self.queue.clone(),
            possibilities,
            depth,
            self.graph.tag(),
        );
        self.stack.push(state);
        self.phase = Phase::Activating;
        Ok(Step::Continue)
    }

    fn activate(&mut self) -> Result<Step, ResolveError> {
        let Some(state) = self.stack.top_mut() else {
            self.phase = Phase::Selecting;
            return Ok(Step::Continue);
        };
        let Some(candidate) = state.next_possibility() else {
            return Ok(Step::Conflict(Cause::Exhausted));
        };
        let depth = state.depth;
        let key = state.key.clone();
        let requirement = state.requirement.clone();

        let mut requirements: Vec<Dependency> =
            self.graph.requirements(&key).into_iter().cloned().collect();
        if !requirements.contains(&requirement) {
            requirements.push(requirement.clone());
        }
        let unmet: Vec<Dependency> = requirements
            .into_iter()
            .filter(|r| !self.provider.satisfies(r, &self.graph, &candidate))
            .collect();

        if let Some(first) = unmet.first().cloned() {
            tracing::debug!("[{depth}] {candidate} does not satisfy {first}");
            let mut blame: BTreeSet<usize> = unmet.iter().flat_map(|r| self.chain(r)).collect();
            blame.extend(self.siblings(&key));
            blame.remove(&depth);
            if let Some(state) = self.stack.top_mut() {
                state.blamed.extend(blame);
                state.rejected.push(Rejection {
                    candidate,
                    reason: RejectReason::Unsatisfied { requirement: first },
                });
            }
            return Ok(Step::Continue);
        }

        self.graph.set_payload(&key, candidate.clone());
        self.conflicts.remove(&key);

        let dependencies = self.provider.dependencies_of(&candidate).map_err(|source| {
            let mut required_by = vec![candidate.to_string()];
            required_by.extend(self.required_by(&requirement));
            ResolveError::Provider {
                source,
                required_by,
            }
        })?;

        let mut added = 0usize;
        for dependency in dependencies {
            if !dependency.applies_to(&key.platform) {
                continue;
            }
            let dependency = dependency
                .with_source(RequestSource::Package(candidate.name.clone()))
                .for_platform(key.platform.clone());
            self.graph
                .add_child(&key, dependency.clone())
                .map_err(|cycle| ResolveError::CyclicRequirement { cycle })?;
            if !self.queue.contains(&dependency) {
                self.queue.push(dependency);
                added += 1;
            }
        }

        if self.options.learn_conflicts {
            if let Some(nogood) = self.learned.violated(&key, &candidate.version, &self.graph) {
                tracing::debug!("[{depth}] {candidate} completes a combination that already failed");
                return Ok(Step::Conflict(Cause::Learned {
                    keys: nogood.keys(),
                    culprit: nogood.culprit.clone(),
                    conflict: nogood.conflict.clone(),
                }));
            }
        }

        tracing::debug!("[{depth}] Activated {candidate} for {key}, {added} new requirements");
        self.phase = Phase::Selecting;
        Ok(Step::Continue)
    }

    /// Jump back to the latest choice point that could avoid `cause`.
    fn unwind(&mut self, cause: Cause) -> Result<(), ResolveError> {
        let learned = matches!(cause, Cause::Learned { .. });
        let (culprit, mut blame, conflict) = match cause {
            Cause::Existing {
                requirement,
                existing,
            } => {
                let key = requirement.key();
                let position = self.stack.position(&key);
                let rejected = position
                    .and_then(|p| self.stack.get(p))
                    .map(|s| s.rejected.clone())
                    .unwrap_or_default();
                let conflict = self.record_conflict(&key, &requirement, Some(existing), rejected);
                let mut blame: BTreeSet<usize> = self.chain(&requirement).into_iter().collect();
                blame.extend(position);
                blame.extend(self.siblings(&key));
                let culprit = Culprit {
                    key,
                    requirement: Some(requirement),
                };
                (culprit, blame, Some(conflict))
            }
            Cause::NoCandidates { requirement } => {
                let key = requirement.key();
                let conflict = self.record_conflict(&key, &requirement, None, Vec::new());
                let blame: BTreeSet<usize> = self.chain(&requirement).into_iter().collect();
                let culprit = Culprit {
                    key,
                    requirement: Some(requirement),
                };
                (culprit, blame, Some(conflict))
            }
            Cause::Exhausted => {
                let Some(state) = self.stack.top() else {
                    return Err(self.failure());
                };
                let depth = state.depth;
                let key = state.key.clone();
                let requirement = state.requirement.clone();
                let mut blame = state.blamed.clone();
                let direct = state.has_direct_rejections();
                let rejected = state.rejected.clone();

                let conflict = direct.then(|| self.record_conflict(&key, &requirement, None, rejected));
                blame.extend(self.chain(&requirement));
                blame.extend(self.siblings(&key));
                blame.remove(&depth);
                let culprit = Culprit {
                    key,
                    requirement: None,
                };
                (culprit, blame, conflict)
            }
            Cause::Learned {
                keys,
                culprit,
                conflict,
            } => {
                if let Some(conflict) = &conflict {
                    self.conflicts.insert(conflict.clone());
                    self.last_conflict = Some(conflict.clone());
                }
                let blame: BTreeSet<usize> =
                    keys.iter().filter_map(|k| self.stack.position(k)).collect();
                (culprit, blame, None)
            }
        };

        if self.options.learn_conflicts && !learned {
            let literals = blame
                .iter()
                .filter_map(|&i| self.stack.get(i))
                .filter_map(|s| s.current().map(|c| (s.key.clone(), c.version.clone())))
                .collect();
            self.learned.learn(literals, culprit.clone(), conflict);
        }

        let Some(&target) = blame.iter().next_back() else {
            tracing::debug!("No earlier choice can avoid the conflict on {}", culprit.key);
            return Err(self.failure());
        };
        blame.remove(&target);

        self.stack.truncate(target + 1);
        let Some(state) = self.stack.get_mut(target) else {
            return Err(self.failure());
        };
        state.blamed.extend(blame);
        if let Some(current) = state.current().cloned() {
            let reason = match &culprit.requirement {
                Some(requirement) if state.key == culprit.key => RejectReason::Unsatisfied {
                    requirement: requirement.clone(),
                },
                _ => RejectReason::Incompatible {
                    with: culprit.key.clone(),
                },
            };
            state.rejected.push(Rejection {
                candidate: current,
                reason,
            });
        }
        tracing::debug!(
            "[{target}] Unwinding to {} ({} candidates left) after conflict on {}",
            state.key,
            state.remaining(),
            culprit.key
        );
        let tag = state.tag;
        self.queue = state.requirements.clone();
        self.graph.rewind_to(tag);
        self.phase = Phase::Activating;
        Ok(())
    }

    fn failure(&mut self) -> ResolveError {
        if self.conflicts.is_empty() {
            if let Some(conflict) = self.last_conflict.take() {
                self.conflicts.insert(conflict);
            }
        }
        ResolveError::VersionConflict(Box::new(std::mem::take(&mut self.conflicts)))
    }

    fn search_for(&mut self, requirement: &Dependency) -> Result<Vec<Candidate>, ProviderError> {
        let cache_key = (requirement.key(), requirement.constraint.clone());
        if let Some(found) = self.candidates.get(&cache_key) {
            return Ok(found.clone());
        }
        let found = self.provider.candidates_for(requirement)?;
        self.candidates.insert(cache_key, found.clone());
        Ok(found)
    }

    fn provider_error(&self, err: ProviderError, requirement: &Dependency) -> ResolveError {
        let required_by = self.required_by(requirement);
        match err {
            ProviderError::UnknownPackage { .. } => ResolveError::UnknownDependency {
                dependency: self.provider.display_name(requirement),
                required_by,
            },
            source => ResolveError::Provider {
                source,
                required_by,
            },
        }
    }

    /// Depths of the choice points whose candidates put `requirement` on
    /// the queue, nearest first.
    fn chain(&self, requirement: &Dependency) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut current = requirement;
        while let Some(parent) = current.source.package() {
            let key = ResolutionKey::new(parent.clone(), current.platform());
            let Some(position) = self.stack.position(&key) else {
                break;
            };
            if positions.contains(&position) {
                break;
            }
            positions.push(position);
            let Some(state) = self.stack.get(position) else {
                break;
            };
            current = &state.requirement;
        }
        positions
    }

    /// Choice points for other platform variants of `key`'s package.
    fn siblings(&self, key: &ResolutionKey) -> Vec<usize> {
        self.graph
            .vertices_named(&key.name)
            .filter(|v| v.key() != key && v.payload().is_some())
            .filter_map(|v| self.stack.position(v.key()))
            .collect()
    }

    /// Human-readable "required by" chain for `requirement`, ending at the
    /// project or the lockfile.
    fn required_by(&self, requirement: &Dependency) -> Vec<String> {
        let mut labels = Vec::new();
        let mut origin = requirement.source.to_string();
        for position in self.chain(requirement) {
            let Some(state) = self.stack.get(position) else {
                break;
            };
            if let Some(candidate) = state.current() {
                labels.push(candidate.to_string());
            }
            origin = state.requirement.source.to_string();
        }
        labels.push(origin);
        labels
    }

    fn requirement_tree(&self, requirement: &Dependency) -> RequirementTree {
        let mut links = vec![self.link(requirement)];
        for position in self.chain(requirement) {
            if let Some(state) = self.stack.get(position) {
                links.push(self.link(&state.requirement));
            }
        }
        links.reverse();
        RequirementTree { links }
    }

    fn link(&self, dependency: &Dependency) -> RequirementLink {
        RequirementLink {
            dependency: dependency.clone(),
            label: self.provider.display_name(dependency),
            resolved: self.graph.payload(&dependency.key()).map(|c| c.version.clone()),
        }
    }

    fn record_conflict(
        &mut self,
        key: &ResolutionKey,
        requirement: &Dependency,
        existing: Option<Candidate>,
        rejected: Vec<Rejection>,
    ) -> Conflict {
        let mut requirements: Vec<&Dependency> = self.graph.requirements(key);
        if !requirements.contains(&requirement) {
            requirements.push(requirement);
        }
        let requirement_trees = requirements
            .into_iter()
            .map(|r| self.requirement_tree(r))
            .collect();
        let conflict = Conflict {
            key: key.clone(),
            requirement: requirement.clone(),
            existing,
            requirement_trees,
            rejected,
        };
        self.conflicts.insert(conflict.clone());
        self.last_conflict = Some(conflict.clone());
        conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackageIndex;
    use depot_core::Version;

    fn candidate(name: &str, version: &str) -> Candidate {
        Candidate::new(name, Version::parse(version).unwrap())
    }

    fn dep(name: &str, constraint: &str) -> Dependency {
        Dependency::parse(name, constraint).unwrap()
    }

    #[test]
    fn empty_roots_resolve_to_nothing() {
        let index = PackageIndex::new();
        let resolution = Resolver::new(&index).resolve(&[]).unwrap();
        assert!(resolution.is_empty());
    }

    #[test]
    fn backjumps_over_unrelated_choice() {
        // a 2.0 needs c < 1, which does not exist; b is irrelevant to that.
        let index = PackageIndex::new()
            .with_candidate(candidate("a", "2.0").depends_on(dep("c", "< 1")))
            .with_candidate(candidate("a", "1.0").depends_on(dep("c", ">= 1")))
            .with_candidate(candidate("b", "2.0"))
            .with_candidate(candidate("b", "1.0"))
            .with_candidate(candidate("c", "1.0"));
        let resolution = Resolver::new(&index)
            .resolve(&[dep("a", ">= 0"), dep("b", ">= 0")])
            .unwrap();
        assert_eq!(resolution.get_named("a").unwrap().version.to_string(), "1.0");
        assert_eq!(resolution.get_named("b").unwrap().version.to_string(), "2.0");
    }

    #[test]
    fn iteration_limit_is_enforced() {
        let index = PackageIndex::new().with_candidate(candidate("a", "1.0"));
        let options = ResolveOptions {
            max_iterations: Some(1),
            ..ResolveOptions::default()
        };
        let err = Resolver::new(&index)
            .with_options(options)
            .resolve(&[dep("a", ">= 0")])
            .unwrap_err();
        assert!(matches!(err, ResolveError::IterationLimit { limit: 1 }));
    }

    #[test]
    fn required_by_for_root_is_the_project() {
        let index = PackageIndex::new();
        let err = Resolver::new(&index).resolve(&[dep("ghost", ">= 0")]).unwrap_err();
        match err {
            ResolveError::UnknownDependency {
                dependency,
                required_by,
            } => {
                assert_eq!(dependency, "ghost (>= 0)");
                assert_eq!(required_by, vec!["the project".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lockfile_roots_are_attributed_to_the_lockfile() {
        let index = PackageIndex::new().with_candidate(candidate("rack", "1.0"));
        let carried = dep("rack", "= 1.0").with_source(RequestSource::Locked);
        let resolution = Resolver::new(&index).resolve(&[carried]).unwrap();
        assert_eq!(resolution.len(), 1);

        let ghost = dep("ghost", ">= 0").with_source(RequestSource::Locked);
        match Resolver::new(&index).resolve(&[ghost]).unwrap_err() {
            ResolveError::UnknownDependency { required_by, .. } => {
                assert_eq!(required_by, vec!["the lockfile".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn options_follow_config() {
        let config = SearchConfig {
            progress_rate: 10,
            max_iterations: Some(500),
            learn_conflicts: false,
            ..SearchConfig::default()
        };
        let options = ResolveOptions::from(&config);
        assert_eq!(options.progress_rate, 10);
        assert_eq!(options.max_iterations, Some(500));
        assert!(!options.learn_conflicts);
        assert!(ResolveOptions::default().learn_conflicts);
    }
}

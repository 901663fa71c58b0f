//! Candidate ordering: which version the search tries first.
//!
//! A policy only reorders. Filtering (constraints, platforms, locks) is the
//! provider's job, so a policy can never make a solvable graph unsolvable;
//! it only changes which solution is found first.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use depot_core::config::{PolicyConfig, UpdateLevel};
use depot_core::{Candidate, Dependency, PackageName, Version};

/// What a policy knows about the requirement being filled.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub dependency: &'a Dependency,
    /// Candidate recorded in the lock for this name and platform.
    pub locked: Option<&'a Candidate>,
    /// Whether the caller asked for this name to be re-resolved.
    pub unlocking: bool,
}

/// Orders candidates best-first.
pub trait SelectionPolicy {
    /// Return `candidates` reordered; the result must be a permutation of
    /// the input.
    fn order(&self, context: &SelectionContext<'_>, candidates: Vec<Candidate>) -> Vec<Candidate>;

    /// Whether pre-releases of `name` may be offered even when no
    /// requirement names a pre-release.
    fn allows_prerelease(&self, _name: &PackageName) -> bool {
        false
    }
}

/// Newest release first, pre-releases last.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestFirst;

impl SelectionPolicy for NewestFirst {
    fn order(&self, _context: &SelectionContext<'_>, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            a.version
                .is_prerelease()
                .cmp(&b.version.is_prerelease())
                .then_with(|| b.version.cmp(&a.version))
                .then_with(|| platform_order(a, b))
        });
        candidates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Locked,
    InLevel,
    OutOfLevel,
    Older,
}

/// Lock-aware ordering modelled on `bundle update --minor --strict --conservative`.
///
/// Without a lock every policy degenerates to newest-first.
#[derive(Debug, Clone, Default)]
pub struct VersionPromoter {
    level: UpdateLevel,
    strict: bool,
    conservative: bool,
    prerelease: BTreeSet<PackageName>,
}

impl VersionPromoter {
    pub fn new(level: UpdateLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            level: config.level,
            strict: config.strict,
            conservative: config.conservative,
            prerelease: config.prerelease.iter().map(PackageName::new).collect(),
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn conservative(mut self, conservative: bool) -> Self {
        self.conservative = conservative;
        self
    }

    /// Stop ranking pre-releases of `name` behind releases.
    pub fn allow_prerelease(mut self, name: impl Into<PackageName>) -> Self {
        self.prerelease.insert(name.into());
        self
    }

    pub fn level(&self) -> UpdateLevel {
        self.level
    }

    fn within_level(&self, version: &Version, locked: &Version) -> bool {
        match self.level {
            UpdateLevel::Major => true,
            UpdateLevel::Minor => version.segment(0) == locked.segment(0),
            UpdateLevel::Patch => {
                version.segment(0) == locked.segment(0) && version.segment(1) == locked.segment(1)
            }
        }
    }

    fn tier(&self, candidate: &Candidate, locked: &Version, unlocking: bool) -> Tier {
        let version = &candidate.version;
        if !unlocking && version == locked {
            Tier::Locked
        } else if version < locked {
            Tier::Older
        } else if self.within_level(version, locked) {
            Tier::InLevel
        } else {
            Tier::OutOfLevel
        }
    }

    fn demote_prereleases(&self, context: &SelectionContext<'_>) -> bool {
        let dependency = context.dependency;
        !self.prerelease.contains(&dependency.name)
            && !dependency.constraint.allows_prereleases()
            && !context.locked.is_some_and(|l| l.version.is_prerelease())
    }
}

impl SelectionPolicy for VersionPromoter {
    fn allows_prerelease(&self, name: &PackageName) -> bool {
        self.prerelease.contains(name)
    }

    fn order(&self, context: &SelectionContext<'_>, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        let demote = self.demote_prereleases(context);
        let prerelease_rank = |c: &Candidate| demote && c.version.is_prerelease();
        let locked = context
            .locked
            .filter(|l| l.name == context.dependency.name)
            .map(|l| &l.version);

        let Some(locked) = locked else {
            candidates.sort_by(|a, b| {
                prerelease_rank(a)
                    .cmp(&prerelease_rank(b))
                    .then_with(|| b.version.cmp(&a.version))
                    .then_with(|| platform_order(a, b))
            });
            return candidates;
        };

        candidates.sort_by(|a, b| {
            let (ta, tb) = (
                self.tier(a, locked, context.unlocking),
                self.tier(b, locked, context.unlocking),
            );
            let within = match ta {
                // closest to the lock first
                Tier::InLevel if self.conservative => a.version.cmp(&b.version),
                Tier::OutOfLevel if self.strict => a.version.cmp(&b.version),
                _ => b.version.cmp(&a.version),
            };
            prerelease_rank(a)
                .cmp(&prerelease_rank(b))
                .then(ta.cmp(&tb))
                .then(within)
                .then_with(|| platform_order(a, b))
        });
        candidates
    }
}

/// Platform-specific builds before generic ones, then by platform name.
fn platform_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.platform
        .is_any()
        .cmp(&b.platform.is_any())
        .then_with(|| a.platform.cmp(&b.platform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Platform, VersionConstraint};

    fn candidates(versions: &[&str]) -> Vec<Candidate> {
        versions
            .iter()
            .map(|v| Candidate::new("rack", Version::parse(v).unwrap()))
            .collect()
    }

    fn versions(ordered: &[Candidate]) -> Vec<String> {
        ordered.iter().map(|c| c.version.to_string()).collect()
    }

    fn dep() -> Dependency {
        Dependency::new("rack", VersionConstraint::any())
    }

    #[test]
    fn newest_first_without_lock() {
        let dependency = dep();
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: None,
            unlocking: false,
        };
        let ordered = VersionPromoter::default().order(&ctx, candidates(&["1.0", "2.0", "1.5"]));
        assert_eq!(versions(&ordered), vec!["2.0", "1.5", "1.0"]);
    }

    #[test]
    fn prereleases_go_last() {
        let dependency = dep();
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: None,
            unlocking: false,
        };
        let ordered = NewestFirst.order(&ctx, candidates(&["1.0", "2.0.beta1", "1.5"]));
        assert_eq!(versions(&ordered), vec!["1.5", "1.0", "2.0.beta1"]);

        let opted_in = VersionPromoter::default().allow_prerelease("rack");
        let ordered = opted_in.order(&ctx, candidates(&["1.0", "2.0.beta1", "1.5"]));
        assert_eq!(versions(&ordered), vec!["2.0.beta1", "1.5", "1.0"]);
    }

    #[test]
    fn locked_version_first_when_not_unlocking() {
        let dependency = dep();
        let locked = Candidate::new("rack", Version::parse("1.2").unwrap());
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: Some(&locked),
            unlocking: false,
        };
        let ordered = VersionPromoter::default().order(&ctx, candidates(&["1.0", "1.2", "1.3", "2.0"]));
        assert_eq!(versions(&ordered), vec!["1.2", "2.0", "1.3", "1.0"]);
    }

    #[test]
    fn minor_level_prefers_same_major() {
        let dependency = dep();
        let locked = Candidate::new("rack", Version::parse("1.2").unwrap());
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: Some(&locked),
            unlocking: true,
        };
        let promoter = VersionPromoter::new(UpdateLevel::Minor);
        let ordered = promoter.order(&ctx, candidates(&["1.0", "1.2", "1.3", "1.4", "2.0", "3.0"]));
        assert_eq!(versions(&ordered), vec!["1.4", "1.3", "1.2", "3.0", "2.0", "1.0"]);
    }

    #[test]
    fn conservative_strict_patch() {
        let dependency = dep();
        let locked = Candidate::new("rack", Version::parse("1.2.1").unwrap());
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: Some(&locked),
            unlocking: true,
        };
        let promoter = VersionPromoter::new(UpdateLevel::Patch)
            .strict(true)
            .conservative(true);
        let ordered = promoter.order(
            &ctx,
            candidates(&["1.1.0", "1.2.0", "1.2.1", "1.2.3", "1.2.2", "1.3.0", "2.0.0"]),
        );
        assert_eq!(
            versions(&ordered),
            vec!["1.2.1", "1.2.2", "1.2.3", "1.3.0", "2.0.0", "1.2.0", "1.1.0"]
        );
    }

    #[test]
    fn specific_platform_before_generic() {
        let dependency = dep();
        let ctx = SelectionContext {
            dependency: &dependency,
            locked: None,
            unlocking: false,
        };
        let input = vec![
            Candidate::new("rack", Version::parse("1.0").unwrap()),
            Candidate::new("rack", Version::parse("1.0").unwrap()).with_platform(Platform::new("java")),
        ];
        let ordered = VersionPromoter::default().order(&ctx, input);
        assert_eq!(ordered[0].platform, Platform::new("java"));
    }

    #[test]
    fn prerelease_opt_in_is_per_name() {
        let promoter = VersionPromoter::default().allow_prerelease("rack");
        assert!(promoter.allows_prerelease(&PackageName::new("rack")));
        assert!(!promoter.allows_prerelease(&PackageName::new("json")));
        assert!(!NewestFirst.allows_prerelease(&PackageName::new("rack")));
    }

    #[test]
    fn from_config_reads_flags() {
        let config = PolicyConfig {
            level: UpdateLevel::Patch,
            strict: true,
            conservative: false,
            prerelease: vec!["rails".into()],
        };
        let promoter = VersionPromoter::from_config(&config);
        assert_eq!(promoter.level(), UpdateLevel::Patch);
        assert!(promoter.strict);
        assert!(promoter.prerelease.contains(&PackageName::new("rails")));
    }
}

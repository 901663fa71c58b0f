use std::collections::{BTreeMap, BTreeSet};

use crate::dependency::{PackageName, Platform, ResolutionKey};
use crate::package::Candidate;

/// Candidates chosen by a previous resolution, keyed by name and platform.
///
/// Consulted only by the selection layer; the search loop never enforces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedCandidates {
    package: BTreeMap<ResolutionKey, Candidate>,
}

impl LockedCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate` as locked for `platform`.
    pub fn insert(&mut self, platform: Platform, candidate: Candidate) {
        self.package.insert(candidate.key_for(&platform), candidate);
    }

    /// Locked candidate for `key`, falling back to the platform-independent lock.
    pub fn get(&self, key: &ResolutionKey) -> Option<&Candidate> {
        self.package.get(key).or_else(|| {
            self.package
                .get(&ResolutionKey::new(key.name.clone(), Platform::any()))
        })
    }

    pub fn contains_name(&self, name: &PackageName) -> bool {
        self.package.keys().any(|k| &k.name == name)
    }

    pub fn len(&self) -> usize {
        self.package.len()
    }

    pub fn is_empty(&self) -> bool {
        self.package.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResolutionKey, &Candidate)> {
        self.package.iter()
    }
}

impl FromIterator<Candidate> for LockedCandidates {
    fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
        let mut locked = LockedCandidates::new();
        for candidate in iter {
            let platform = candidate.platform.clone();
            locked.insert(platform, candidate);
        }
        locked
    }
}

/// Which locked names a resolution may move away from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Unlock {
    /// Every locked name must stay where it is.
    #[default]
    None,
    /// Re-resolve everything; the lock is only a preference.
    All,
    /// Only these names may change.
    Names(BTreeSet<PackageName>),
}

impl Unlock {
    pub fn names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PackageName>,
    {
        Unlock::Names(names.into_iter().map(Into::into).collect())
    }

    /// Whether `name` may resolve to something other than its locked candidate.
    pub fn allows(&self, name: &PackageName) -> bool {
        match self {
            Unlock::None => false,
            Unlock::All => true,
            Unlock::Names(names) => names.contains(name),
        }
    }
}

//! Conflict records and their human-readable rendering.

use std::collections::BTreeMap;
use std::fmt;

use depot_core::{Candidate, Dependency, PackageName, ResolutionKey, Version};

/// Why a candidate was set aside at a choice point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The candidate does not meet this requirement.
    Unsatisfied { requirement: Dependency },
    /// Activating it led to an unresolvable conflict on another package.
    Incompatible { with: ResolutionKey },
}

/// A candidate that was tried and rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub candidate: Candidate,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectReason::Unsatisfied { requirement } => {
                write!(f, "{}: does not satisfy {requirement}", self.candidate)
            }
            RejectReason::Incompatible { with } => {
                write!(f, "{}: conflicts with the versions available for {with}", self.candidate)
            }
        }
    }
}

/// One step in a requirement chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementLink {
    pub dependency: Dependency,
    /// How the dependency is shown to the user.
    pub label: String,
    /// Version the dependency had resolved to when the conflict was recorded.
    pub resolved: Option<Version>,
}

/// Chain of requirements from the project down to the conflicting package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementTree {
    pub links: Vec<RequirementLink>,
}

impl RequirementTree {
    /// Who declared the first link.
    pub fn origin(&self) -> String {
        self.links
            .first()
            .map(|link| link.dependency.source.to_string())
            .unwrap_or_else(|| "the project".to_string())
    }

    /// The requirement at the end of the chain.
    pub fn leaf(&self) -> Option<&Dependency> {
        self.links.last().map(|link| &link.dependency)
    }
}

/// Everything known about a name that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub key: ResolutionKey,
    /// The requirement whose processing failed.
    pub requirement: Dependency,
    /// Candidate already fixed for the name, if the failure was a mismatch
    /// with it.
    pub existing: Option<Candidate>,
    /// One chain per requirement on the name.
    pub requirement_trees: Vec<RequirementTree>,
    pub rejected: Vec<Rejection>,
}

impl Conflict {
    pub fn name(&self) -> &PackageName {
        &self.key.name
    }

    /// The distinct requirements involved, in tree order.
    pub fn requirements(&self) -> Vec<&Dependency> {
        let mut seen = Vec::new();
        for leaf in self.requirement_trees.iter().filter_map(RequirementTree::leaf) {
            if !seen.contains(&leaf) {
                seen.push(leaf);
            }
        }
        seen
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Could not find compatible versions for package \"{}\":", self.key)?;

        let mut by_origin: BTreeMap<String, Vec<&RequirementTree>> = BTreeMap::new();
        for tree in &self.requirement_trees {
            by_origin.entry(tree.origin()).or_default().push(tree);
        }

        for (origin, trees) in by_origin {
            writeln!(f, "  In {origin}:")?;
            for (i, tree) in trees.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                let last = tree.links.len().saturating_sub(1);
                for (depth, link) in tree.links.iter().enumerate() {
                    let indent = "  ".repeat(depth + 2);
                    if depth == last {
                        writeln!(f, "{indent}{}", link.label)?;
                    } else if let Some(version) = &link.resolved {
                        writeln!(
                            f,
                            "{indent}{} was resolved to {version}, which depends on",
                            link.label
                        )?;
                    } else {
                        writeln!(f, "{indent}{}, which depends on", link.label)?;
                    }
                }
            }
            writeln!(f)?;
        }

        if let Some(existing) = &self.existing {
            writeln!(f, "  {existing} was already selected")?;
        }
        if self.existing.is_none() && self.rejected.is_empty() {
            writeln!(f, "  No available version matches {}", self.requirement)?;
        }
        for rejection in &self.rejected {
            writeln!(f, "  Tried {rejection}")?;
        }
        Ok(())
    }
}

/// Conflicts keyed by the vertex they occurred on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSet {
    conflicts: BTreeMap<ResolutionKey, Conflict>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `conflict`, replacing any earlier one for the same key.
    pub fn insert(&mut self, conflict: Conflict) {
        self.conflicts.insert(conflict.key.clone(), conflict);
    }

    pub fn remove(&mut self, key: &ResolutionKey) -> Option<Conflict> {
        self.conflicts.remove(key)
    }

    pub fn get(&self, key: &ResolutionKey) -> Option<&Conflict> {
        self.conflicts.get(key)
    }

    pub fn contains(&self, key: &ResolutionKey) -> bool {
        self.conflicts.contains_key(key)
    }

    /// Whether any platform variant of `name` is in conflict.
    pub fn contains_name(&self, name: &PackageName) -> bool {
        self.conflicts.keys().any(|key| &key.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl fmt::Display for ConflictSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.conflicts.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{conflict}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Platform, RequestSource};

    fn link(dep: Dependency, resolved: Option<&str>) -> RequirementLink {
        RequirementLink {
            label: dep.to_string(),
            dependency: dep,
            resolved: resolved.map(|v| Version::parse(v).unwrap()),
        }
    }

    fn sample() -> Conflict {
        let from_a = Dependency::parse("b", "~> 1.0.0")
            .unwrap()
            .with_source(RequestSource::Package(PackageName::new("a")));
        let from_c = Dependency::parse("b", ">= 1.5")
            .unwrap()
            .with_source(RequestSource::Package(PackageName::new("c")));
        Conflict {
            key: ResolutionKey::new("b", Platform::any()),
            requirement: from_c.clone(),
            existing: None,
            requirement_trees: vec![
                RequirementTree {
                    links: vec![
                        link(Dependency::root("a", Default::default()), Some("1.0")),
                        link(from_a, None),
                    ],
                },
                RequirementTree {
                    links: vec![
                        link(Dependency::root("c", Default::default()), Some("1.0")),
                        link(from_c.clone(), None),
                    ],
                },
            ],
            rejected: vec![Rejection {
                candidate: Candidate::new("b", Version::parse("1.0").unwrap()),
                reason: RejectReason::Unsatisfied {
                    requirement: from_c,
                },
            }],
        }
    }

    #[test]
    fn renders_requirement_chains() {
        let text = sample().to_string();
        let expected = "\
Could not find compatible versions for package \"b\":
  In the project:
    a (>= 0) was resolved to 1.0, which depends on
      b (~> 1.0.0)

    c (>= 0) was resolved to 1.0, which depends on
      b (>= 1.5)

  Tried b (1.0): does not satisfy b (>= 1.5)
";
        assert_eq!(text, expected);
    }

    #[test]
    fn lists_distinct_requirements() {
        let conflict = sample();
        let requirements: Vec<String> = conflict
            .requirements()
            .iter()
            .map(|d| d.constraint.to_string())
            .collect();
        assert_eq!(requirements, vec!["~> 1.0.0", ">= 1.5"]);
    }

    #[test]
    fn set_replaces_by_key() {
        let mut set = ConflictSet::new();
        set.insert(sample());
        set.insert(sample());
        assert_eq!(set.len(), 1);
        assert!(set.contains_name(&PackageName::new("b")));
        assert!(set.remove(&ResolutionKey::new("b", Platform::any())).is_some());
        assert!(set.is_empty());
    }
}

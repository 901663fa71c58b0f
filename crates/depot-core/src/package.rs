use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dependency::{Dependency, PackageName, Platform, RequestSource, ResolutionKey};
use crate::version::Version;

/// One concrete, installable version of a package.
///
/// Candidates are handed out by a provider and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    #[serde(default)]
    pub platform: Platform,
    /// Label of the registry or path the candidate came from.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl Candidate {
    pub fn new(name: impl Into<PackageName>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            platform: Platform::any(),
            source: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a declared dependency; its origin is set to this candidate.
    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        let dependency = dependency.with_source(RequestSource::Package(self.name.clone()));
        self.dependencies.push(dependency);
        self
    }

    /// The vertex this candidate occupies when resolved for `target`.
    pub fn key_for(&self, target: &Platform) -> ResolutionKey {
        ResolutionKey::new(self.name.clone(), target.clone())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)?;
        if !self.platform.is_any() {
            write!(f, " [{}]", self.platform)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionConstraint;

    #[test]
    fn depends_on_sets_origin() {
        let candidate = Candidate::new("rails", Version::parse("7.1.0").unwrap())
            .depends_on(Dependency::new("rack", VersionConstraint::parse("~> 3.0").unwrap()));
        assert_eq!(
            candidate.dependencies[0].source,
            RequestSource::Package(PackageName::new("rails"))
        );
    }

    #[test]
    fn display() {
        let plain = Candidate::new("rack", Version::parse("3.0.8").unwrap());
        assert_eq!(plain.to_string(), "rack (3.0.8)");
        let native = plain.with_platform(Platform::new("x86_64-linux"));
        assert_eq!(native.to_string(), "rack (3.0.8) [x86_64-linux]");
    }
}

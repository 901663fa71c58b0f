use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::{VersionConstraint, VersionError};

/// Case-sensitive package identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PackageName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PackageName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Target platform a package is resolved for.
///
/// `any` is the platform-independent variant and is compatible with every
/// concrete platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    pub const ANY: &'static str = "any";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    /// Whether a candidate built for `self` can be used on `target`.
    pub fn is_compatible(&self, target: &Platform) -> bool {
        self.is_any() || self == target
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a dependency was declared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    /// Declared directly by the project.
    Root,
    /// Carried over from a previous lockfile.
    Locked,
    /// Declared by a package in the closure.
    Package(PackageName),
}

impl RequestSource {
    pub fn is_root(&self) -> bool {
        matches!(self, RequestSource::Root | RequestSource::Locked)
    }

    pub fn package(&self) -> Option<&PackageName> {
        match self {
            RequestSource::Package(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestSource::Root => f.write_str("the project"),
            RequestSource::Locked => f.write_str("the lockfile"),
            RequestSource::Package(name) => write!(f, "{name}"),
        }
    }
}

/// Identity of a vertex in a resolution: one package on one platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionKey {
    pub name: PackageName,
    pub platform: Platform,
}

impl ResolutionKey {
    pub fn new(name: impl Into<PackageName>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            platform,
        }
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.platform.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.platform)
        }
    }
}

/// A requirement on a package: name, version constraint, platforms, origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: PackageName,
    #[serde(default)]
    pub constraint: VersionConstraint,
    /// Platforms this dependency applies to; empty means every platform.
    #[serde(default)]
    pub platforms: BTreeSet<Platform>,
    pub source: RequestSource,
    /// Named explicitly by the project rather than pulled in transitively
    /// or carried over from the lockfile.
    #[serde(default)]
    pub explicit: bool,
}

impl Dependency {
    /// A non-explicit dependency on every platform; set the origin with
    /// [`Dependency::with_source`].
    pub fn new(name: impl Into<PackageName>, constraint: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            constraint,
            platforms: BTreeSet::new(),
            source: RequestSource::Root,
            explicit: false,
        }
    }

    /// Parse `constraint` and build a dependency on `name`.
    pub fn parse(name: impl Into<PackageName>, constraint: &str) -> Result<Self, VersionError> {
        Ok(Self::new(name, VersionConstraint::parse(constraint)?))
    }

    /// A dependency declared directly by the project.
    pub fn root(name: impl Into<PackageName>, constraint: VersionConstraint) -> Self {
        Self {
            explicit: true,
            ..Self::new(name, constraint)
        }
    }

    pub fn with_source(mut self, source: RequestSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_platforms<I>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = Platform>,
    {
        self.platforms = platforms.into_iter().collect();
        self
    }

    /// Whether this dependency is in force when resolving for `platform`.
    pub fn applies_to(&self, platform: &Platform) -> bool {
        self.platforms.is_empty()
            || platform.is_any()
            || self.platforms.iter().any(|p| p.is_any() || p == platform)
    }

    /// Narrow to a single platform.
    pub fn for_platform(&self, platform: Platform) -> Self {
        let mut narrowed = self.clone();
        narrowed.platforms = BTreeSet::from([platform]);
        narrowed
    }

    /// One single-platform dependency per requested platform.
    pub fn expand_platforms(&self) -> Vec<Dependency> {
        if self.platforms.is_empty() {
            return vec![self.for_platform(Platform::any())];
        }
        self.platforms
            .iter()
            .map(|p| self.for_platform(p.clone()))
            .collect()
    }

    /// The platform this dependency was narrowed to (`any` otherwise).
    pub fn platform(&self) -> Platform {
        if self.platforms.len() == 1 {
            self.platforms.iter().next().cloned().unwrap_or_default()
        } else {
            Platform::any()
        }
    }

    pub fn key(&self) -> ResolutionKey {
        ResolutionKey::new(self.name.clone(), self.platform())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.constraint)?;
        let platform = self.platform();
        if self.platforms.len() == 1 && !platform.is_any() {
            write!(f, " [{platform}]")?;
        }
        Ok(())
    }
}

//! Version parsing, comparison, and constraint matching.
//!
//! Versions are dotted sequences of segments:
//! - Segments are split on `.`, and at every digit/letter boundary
//!   (`1.0rc1` is `1.0.rc.1`); a `-` starts a pre-release tail
//! - Numeric segments compare as numbers, missing segments as `0`
//! - Textual segments sort before numeric ones, so `1.0.rc1 < 1.0`
//! - Any textual segment makes the version a pre-release

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when a version or constraint string is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid character `{ch}` in version `{input}`")]
    InvalidCharacter { input: String, ch: char },

    #[error("version `{input}` has an empty segment")]
    EmptySegment { input: String },

    #[error("unknown operator in constraint `{input}`")]
    UnknownOperator { input: String },

    #[error("segment `{segment}` of version `{input}` is too large")]
    SegmentOverflow { input: String, segment: String },
}

impl From<VersionError> for depot_util::errors::DepotError {
    fn from(err: VersionError) -> Self {
        depot_util::errors::DepotError::Version {
            message: err.to_string(),
        }
    }
}

/// A parsed, comparable package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Segment {
    Numeric(u64),
    Text(String),
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let segments = parse_segments(trimmed)?;
        Ok(Self {
            original: trimmed.to_string(),
            segments,
        })
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Text(_)))
    }

    /// Numeric value of segment `index`, treating missing segments as `0`.
    ///
    /// Returns `None` when the segment exists but is textual.
    pub fn segment(&self, index: usize) -> Option<u64> {
        match self.segments.get(index) {
            None => Some(0),
            Some(Segment::Numeric(n)) => Some(*n),
            Some(Segment::Text(_)) => None,
        }
    }

    /// The numeric prefix, dropping any pre-release tail.
    pub fn release(&self) -> Version {
        let segments: Vec<Segment> = self
            .segments
            .iter()
            .take_while(|s| matches!(s, Segment::Numeric(_)))
            .cloned()
            .collect();
        Version::from_segments(segments)
    }

    /// Upper bound used by the pessimistic operator.
    ///
    /// `1.4.2` bumps to `1.5`, `1.4` to `2`, `1` to `2`. `None` when the
    /// segment to increment is already `u64::MAX`, i.e. there is no bound.
    pub fn bump(&self) -> Option<Version> {
        let mut numbers: Vec<u64> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Numeric(n) => Some(*n),
                Segment::Text(_) => None,
            })
            .collect();
        if numbers.len() > 1 {
            numbers.pop();
        }
        match numbers.last_mut() {
            Some(last) => *last = last.checked_add(1)?,
            None => numbers.push(1),
        }
        Some(Version::from_segments(
            numbers.into_iter().map(Segment::Numeric).collect(),
        ))
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let original = segments
            .iter()
            .map(|s| match s {
                Segment::Numeric(n) => n.to_string(),
                Segment::Text(t) => t.clone(),
            })
            .collect::<Vec<_>>()
            .join(".");
        Self { original, segments }
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn canonical(&self) -> &[Segment] {
        let mut end = self.segments.len();
        while end > 0 && self.segments[end - 1] == Segment::Numeric(0) {
            end -= 1;
        }
        &self.segments[..end]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.segments.len().max(other.segments.len());
        for i in 0..max_len {
            let ord = compare_segments(self.segments.get(i), other.segments.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.original
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

fn compare_segments(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    const ZERO: Segment = Segment::Numeric(0);
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(a), None) => compare_two_segments(a, &ZERO),
        (None, Some(b)) => compare_two_segments(&ZERO, b),
        (Some(a), Some(b)) => compare_two_segments(a, b),
    }
}

fn compare_two_segments(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Numeric(_), Segment::Text(_)) => Ordering::Greater,
        (Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
    }
}

fn parse_segments(input: &str) -> Result<Vec<Segment>, VersionError> {
    // `1.0-beta.2` is read as `1.0.pre.beta.2`
    let normalized = input.replacen('-', ".pre.", 1);
    let mut segments = Vec::new();

    for part in normalized.split('.') {
        if part.is_empty() {
            return Err(VersionError::EmptySegment {
                input: input.to_string(),
            });
        }
        let mut current = String::new();
        let mut current_is_digit = None;
        for ch in part.chars() {
            if !ch.is_ascii_alphanumeric() {
                return Err(VersionError::InvalidCharacter {
                    input: input.to_string(),
                    ch,
                });
            }
            let is_digit = ch.is_ascii_digit();
            if current_is_digit.is_some_and(|d| d != is_digit) {
                segments.push(classify(input, &current)?);
                current.clear();
            }
            current_is_digit = Some(is_digit);
            current.push(ch);
        }
        segments.push(classify(input, &current)?);
    }

    Ok(segments)
}

fn classify(input: &str, token: &str) -> Result<Segment, VersionError> {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(Segment::Text(token.to_string()));
    }
    token
        .parse::<u64>()
        .map(Segment::Numeric)
        .map_err(|_| VersionError::SegmentOverflow {
            input: input.to_string(),
            segment: token.to_string(),
        })
}

/// Comparison operator in a version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    /// Pessimistic: `~> 1.4` is `>= 1.4, < 2`.
    Tilde,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::GtEq => ">=",
            Op::LtEq => "<=",
            Op::Tilde => "~>",
        }
    }

    fn test(self, version: &Version, bound: &Version) -> bool {
        match self {
            Op::Eq => version == bound,
            Op::NotEq => version != bound,
            Op::Gt => version > bound,
            Op::Lt => version < bound,
            Op::GtEq => version >= bound,
            Op::LtEq => version <= bound,
            Op::Tilde => {
                version >= bound && bound.bump().map_or(true, |upper| version.release() < upper)
            }
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A conjunction of comparator/version pairs, e.g. `>= 1.0, < 2`.
///
/// An empty constraint accepts every release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
    comparators: Vec<(Op, Version)>,
}

impl VersionConstraint {
    /// The constraint every release satisfies.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn exact(version: Version) -> Self {
        Self {
            comparators: vec![(Op::Eq, version)],
        }
    }

    /// Parse a comma-separated list of comparators.
    ///
    /// A comparator without an operator means `=`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let mut comparators = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (op, rest) = split_operator(part)?;
            comparators.push((op, Version::parse(rest)?));
        }
        // `>= 0` is spelled-out "any"
        if let [(Op::GtEq, v)] = comparators.as_slice() {
            if v.canonical().is_empty() {
                comparators.clear();
            }
        }
        Ok(Self { comparators })
    }

    pub fn comparators(&self) -> &[(Op, Version)] {
        &self.comparators
    }

    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    /// True when the constraint pins a single version.
    pub fn is_exact(&self) -> bool {
        self.comparators.iter().any(|(op, _)| *op == Op::Eq)
    }

    /// Whether `version` satisfies every comparator.
    ///
    /// Pre-releases only match when some comparator names a pre-release.
    pub fn matches(&self, version: &Version) -> bool {
        if version.is_prerelease() && !self.allows_prereleases() {
            return false;
        }
        self.admits(version)
    }

    /// Whether `version` satisfies every comparator, pre-release or not.
    ///
    /// For callers that have opted a package in to pre-releases.
    pub fn admits(&self, version: &Version) -> bool {
        self.comparators
            .iter()
            .all(|(op, bound)| op.test(version, bound))
    }

    pub fn allows_prereleases(&self) -> bool {
        self.comparators.iter().any(|(_, v)| v.is_prerelease())
    }
}

fn split_operator(part: &str) -> Result<(Op, &str), VersionError> {
    const OPERATORS: [(&str, Op); 7] = [
        ("~>", Op::Tilde),
        (">=", Op::GtEq),
        ("<=", Op::LtEq),
        ("!=", Op::NotEq),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ];
    for (symbol, op) in OPERATORS {
        if let Some(rest) = part.strip_prefix(symbol) {
            let rest = rest.trim();
            if !rest.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                return Err(VersionError::UnknownOperator {
                    input: part.to_string(),
                });
            }
            return Ok((op, rest));
        }
    }
    if part.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        Ok((Op::Eq, part))
    } else {
        Err(VersionError::UnknownOperator {
            input: part.to_string(),
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparators.is_empty() {
            return f.write_str(">= 0");
        }
        for (i, (op, version)) in self.comparators.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{op} {version}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VersionConstraint::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionConstraint::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
        assert!(v("1.9") < v("1.10"));
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0"));
    }

    #[test]
    fn equal_versions_hash_alike() {
        use std::collections::HashSet;
        let set: HashSet<Version> = [v("1.0"), v("1.0.0"), v("1")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn prerelease_before_release() {
        assert!(v("1.0.rc1") < v("1.0"));
        assert!(v("1.0-beta") < v("1.0"));
        assert!(v("1.0.a") < v("1.0.b"));
        assert!(v("1.0.rc1").is_prerelease());
        assert!(!v("1.0.1").is_prerelease());
    }

    #[test]
    fn digit_letter_boundaries_split() {
        assert_eq!(v("2.0rc1"), v("2.0.rc.1"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("1..0"),
            Err(VersionError::EmptySegment { .. })
        ));
        assert!(matches!(
            Version::parse("1.0+build"),
            Err(VersionError::InvalidCharacter { ch: '+', .. })
        ));
    }

    #[test]
    fn release_and_bump() {
        assert_eq!(v("1.4.2.rc1").release(), v("1.4.2"));
        assert_eq!(v("1.4.2").bump(), Some(v("1.5")));
        assert_eq!(v("1.4").bump(), Some(v("2")));
        assert_eq!(v("1").bump(), Some(v("2")));
        assert_eq!(v("18446744073709551615").bump(), None);
        assert_eq!(v("18446744073709551615.3").bump(), None);
    }

    #[test]
    fn segment_access() {
        let version = v("3.2");
        assert_eq!(version.segment(0), Some(3));
        assert_eq!(version.segment(1), Some(2));
        assert_eq!(version.segment(2), Some(0));
        assert_eq!(v("1.rc").segment(1), None);
    }

    #[test]
    fn pessimistic_constraint() {
        let tilde = c("~> 1.0");
        assert!(tilde.matches(&v("1.0")));
        assert!(tilde.matches(&v("1.9")));
        assert!(!tilde.matches(&v("2.0")));

        let narrow = c("~> 1.0.0");
        assert!(narrow.matches(&v("1.0.7")));
        assert!(!narrow.matches(&v("1.1")));
    }

    #[test]
    fn conjunction() {
        let range = c(">= 1.0, < 2");
        assert!(range.matches(&v("1.5")));
        assert!(!range.matches(&v("2.0")));
        assert!(!range.matches(&v("0.9")));
    }

    #[test]
    fn bare_version_is_exact() {
        let exact = c("1.2");
        assert!(exact.is_exact());
        assert!(exact.matches(&v("1.2.0")));
        assert!(!exact.matches(&v("1.2.1")));
    }

    #[test]
    fn prereleases_need_opt_in() {
        assert!(!c(">= 1.0").matches(&v("2.0.beta")));
        assert!(c(">= 2.0.a").matches(&v("2.0.beta")));
    }

    #[test]
    fn any_constraint() {
        assert!(c("").is_any());
        assert!(c(">= 0").is_any());
        assert_eq!(c("").to_string(), ">= 0");
        assert!(c("").matches(&v("0.0.1")));
    }

    #[test]
    fn unknown_operator() {
        assert!(matches!(
            VersionConstraint::parse("=> 1.0"),
            Err(VersionError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn display() {
        assert_eq!(c("~>1.0,!=1.3").to_string(), "~> 1.0, != 1.3");
        assert_eq!(v("1.8.0").to_string(), "1.8.0");
    }
}

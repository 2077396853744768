//! Protocol versioning utilities
//!
//! Ordering and equality use the `major.minor.patch` precedence triple only;
//! pre-release and build metadata are carried for display but never decide
//! which of two versions is newer.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A protocol version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(Version);

/// Size of the step between two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

impl ProtocolVersion {
    /// Create a release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse from a version string, accepting a leading `v`
    pub fn parse(version_str: &str) -> Result<Self, semver::Error> {
        let version_str = version_str.trim();
        let version_str = version_str.strip_prefix('v').unwrap_or(version_str);
        Ok(Self(Version::parse(version_str)?))
    }

    /// The underlying semver value
    pub fn semver(&self) -> &Version {
        &self.0
    }

    /// Precedence triple used for ordering
    pub fn precedence(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }

    /// Storage slot name (e.g., "1.2.3"), stable under metadata changes
    pub fn slot(&self) -> String {
        format!("{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }

    /// Classify the step from `previous` to `self`, if `self` is newer
    pub fn bump_from(&self, previous: &ProtocolVersion) -> Option<BumpKind> {
        if self <= previous {
            return None;
        }
        if self.0.major > previous.0.major {
            Some(BumpKind::Major)
        } else if self.0.minor > previous.0.minor {
            Some(BumpKind::Minor)
        } else {
            Some(BumpKind::Patch)
        }
    }

    /// Next version for the given bump
    pub fn bump(&self, kind: BumpKind) -> Self {
        match kind {
            BumpKind::Major => self.bump_major(),
            BumpKind::Minor => self.bump_minor(),
            BumpKind::Patch => self.bump_patch(),
        }
    }

    /// Bump major version
    pub fn bump_major(&self) -> Self {
        Self::new(self.0.major + 1, 0, 0)
    }

    /// Bump minor version
    pub fn bump_minor(&self) -> Self {
        Self::new(self.0.major, self.0.minor + 1, 0)
    }

    /// Bump patch version
    pub fn bump_patch(&self) -> Self {
        Self::new(self.0.major, self.0.minor, self.0.patch + 1)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl FromStr for ProtocolVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Version> for ProtocolVersion {
    fn from(version: Version) -> Self {
        Self(version)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BumpKind::Major => "major",
            BumpKind::Minor => "minor",
            BumpKind::Patch => "patch",
        };
        f.write_str(s)
    }
}

impl FromStr for BumpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpKind::Major),
            "minor" => Ok(BumpKind::Minor),
            "patch" => Ok(BumpKind::Patch),
            other => Err(format!("unknown bump kind '{}'", other)),
        }
    }
}

impl PartialEq for ProtocolVersion {
    fn eq(&self, other: &Self) -> bool {
        self.precedence() == other.precedence()
    }
}

impl Eq for ProtocolVersion {}

impl std::hash::Hash for ProtocolVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.precedence().hash(state);
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

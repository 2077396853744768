//! Registry addressing
//!
//! A [`DomainPath`] is a slash-separated hierarchy such as `environmental/soil`.
//! Segments are created lazily; there is no predefined taxonomy. A
//! [`RegistryPath`] names the final slot of one protocol inside a domain, and a
//! [`ProtocolRef`] pins an exact `name@version` for lineage.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{RegistryError, Result};
use crate::version::ProtocolVersion;

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Returns true if `name` is usable as a protocol identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Hierarchical domain location
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainPath {
    segments: Vec<String>,
}

impl DomainPath {
    /// Parse `a/b/c`; leading and trailing slashes are ignored
    pub fn parse(s: &str) -> Result<Self> {
        let segments: Vec<String> = s
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        if segments.iter().any(|seg| !is_segment(seg)) {
            return Err(RegistryError::InvalidFormat(format!(
                "invalid domain path '{}': segments must be non-empty [a-z0-9_-]",
                s
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segment-wise prefix match: `environmental` contains `environmental/soil`
    pub fn starts_with(&self, prefix: &DomainPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for DomainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for DomainPath {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DomainPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DomainPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DomainPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// `domain/name`: the final slot of one protocol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryPath {
    pub domain: DomainPath,
    pub name: String,
}

impl RegistryPath {
    pub fn new(domain: DomainPath, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(RegistryError::InvalidFormat(format!(
                "invalid protocol name '{}'",
                name
            )));
        }
        Ok(Self { domain, name })
    }

    /// Parse `domain/.../name`; the last segment is the protocol name
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches('/');
        let (domain, name) = trimmed.rsplit_once('/').ok_or_else(|| {
            RegistryError::InvalidFormat(format!("registry path '{}' has no domain", s))
        })?;
        Self::new(DomainPath::parse(domain)?, name)
    }

    /// Sibling protocol in the same domain
    pub fn sibling(&self, name: &str) -> Result<Self> {
        Self::new(self.domain.clone(), name)
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.name)
    }
}

impl FromStr for RegistryPath {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RegistryPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegistryPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RegistryPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Exact `name@version` reference used by `extends`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolRef {
    pub name: String,
    pub version: ProtocolVersion,
}

impl ProtocolRef {
    pub fn new(name: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (name, version) = s.split_once('@').ok_or_else(|| {
            RegistryError::InvalidFormat(format!("reference '{}' is not name@version", s))
        })?;
        if !is_identifier(name) {
            return Err(RegistryError::InvalidFormat(format!(
                "invalid protocol name '{}' in reference",
                name
            )));
        }
        Ok(Self::new(name, ProtocolVersion::parse(version)?))
    }
}

impl fmt::Display for ProtocolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for ProtocolRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ProtocolRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtocolRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProtocolRef::parse(&s).map_err(serde::de::Error::custom)
    }
}

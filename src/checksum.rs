//! Checksum utilities for payload integrity

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of a serialized payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, for short identifiers
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        Self::of_str(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = "name = \"soil_moisture_percent\"\nbits = 7\n";
        assert_eq!(Checksum::of_str(content), Checksum::of_str(content));
    }

    #[test]
    fn test_checksum_different_content() {
        assert_ne!(Checksum::of_str("bits = 7"), Checksum::of_str("bits = 8"));
    }

    #[test]
    fn test_checksum_verification() {
        let content = "bits = 7";
        let checksum = Checksum::of_str(content);
        assert!(checksum.verify(content));
        assert!(!checksum.verify("bits = 6"));
        assert_eq!(checksum.short(12).len(), 12);
    }
}

//! Registry storage
//!
//! A store has three namespaces per protocol path:
//!
//! - **final**: the current authoritative definition, one per path
//! - **archive**: every superseded definition, keyed by its own version
//! - **staging**: submitted definitions awaiting review, keyed by version
//!
//! Review records live beside them, keyed by submission id, so decisions
//! outlive the process that recorded them.
//!
//! Backends implement the primitive reads and writes. [`RegistryStore::promote`]
//! composes them into the archive, promote, clear sequence, each step of
//! which is a no-op when re-run after a partial failure.

use std::cmp::Ordering;
use std::fs::File;

use tracing::debug;

use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::path::{DomainPath, RegistryPath};
use crate::review::ReviewRecord;
use crate::staging::{StagingEntry, SubmissionId};
use crate::version::ProtocolVersion;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::{MemoryStore, StoreOp};

/// Result of promoting one staged definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub path: RegistryPath,
    pub version: ProtocolVersion,
    /// Version moved from final to archive by this promotion
    pub archived: Option<ProtocolVersion>,
    /// The final slot already held this payload (resumed after a partial run)
    pub resumed: bool,
}

/// Exclusive sections shared by every handle on one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Check-then-stage in `push`
    Staging,
    /// Approve or reject of one review
    Review,
    /// One merge batch
    Merge,
}

impl LockScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockScope::Staging => "staging",
            LockScope::Review => "review",
            LockScope::Merge => "merge",
        }
    }
}

/// Held for the duration of an exclusive section; released on drop
#[derive(Debug, Default)]
pub struct StoreLock {
    _file: Option<File>,
}

impl StoreLock {
    pub(crate) fn file(file: File) -> Self {
        Self { _file: Some(file) }
    }
}

/// Hierarchical, path-addressed protocol storage
pub trait RegistryStore: Send + Sync {
    /// Paths that have a final artifact, optionally under a domain prefix
    fn list(&self, prefix: Option<&DomainPath>) -> Result<Vec<RegistryPath>>;

    fn read_final(&self, path: &RegistryPath) -> Result<Option<ProtocolDefinition>>;

    fn read_archived(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<ProtocolDefinition>>;

    /// Archived versions of a path, ascending
    fn archived_versions(&self, path: &RegistryPath) -> Result<Vec<ProtocolVersion>>;

    /// Replace the final artifact at the definition's path
    fn write_final(&self, definition: &ProtocolDefinition) -> Result<()>;

    /// Store a superseded definition under its own version
    fn write_archive(&self, definition: &ProtocolDefinition) -> Result<()>;

    /// Stage an entry. Fails `Conflict` if the key is already staged.
    fn write_staged(&self, entry: &StagingEntry) -> Result<()>;

    fn read_staged(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<StagingEntry>>;

    /// Remove a staged entry; removing an absent entry succeeds
    fn remove_staged(&self, path: &RegistryPath, version: &ProtocolVersion) -> Result<()>;

    fn list_staged(&self) -> Result<Vec<StagingEntry>>;

    /// Create or replace the record for a submission
    fn write_review(&self, record: &ReviewRecord) -> Result<()>;

    fn read_review(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>>;

    fn list_reviews(&self) -> Result<Vec<ReviewRecord>>;

    /// Enter `scope` exclusively across every handle on this store. The
    /// default suits backends owned by a single process, whose callers
    /// already serialize in memory.
    fn lock(&self, _scope: LockScope) -> Result<StoreLock> {
        Ok(StoreLock::default())
    }

    /// Read the final artifact, or a specific final-or-archived version
    fn read(
        &self,
        path: &RegistryPath,
        version: Option<&ProtocolVersion>,
    ) -> Result<ProtocolDefinition> {
        let found = match version {
            None => self.read_final(path)?,
            Some(wanted) => match self.read_final(path)? {
                Some(current) if current.version == *wanted => Some(current),
                _ => self.read_archived(path, wanted)?,
            },
        };
        found.ok_or_else(|| RegistryError::not_found(path, version))
    }

    fn exists(&self, path: &RegistryPath, version: Option<&ProtocolVersion>) -> Result<bool> {
        let current = self.read_final(path)?;
        match version {
            None => Ok(current.is_some()),
            Some(wanted) => {
                if current.is_some_and(|c| c.version == *wanted) {
                    return Ok(true);
                }
                Ok(self.archived_versions(path)?.contains(wanted))
            }
        }
    }

    /// Move a staged definition to final, archiving the previous occupant first
    fn promote(&self, path: &RegistryPath, version: &ProtocolVersion) -> Result<Promotion> {
        let Some(entry) = self.read_staged(path, version)? else {
            // Staged copy already cleared: only a completed promotion explains that
            return match self.read_final(path)? {
                Some(current) if current.version == *version => Ok(Promotion {
                    path: path.clone(),
                    version: version.clone(),
                    archived: None,
                    resumed: true,
                }),
                _ => Err(RegistryError::not_found(path, Some(version))),
            };
        };
        let incoming = &entry.definition;
        let incoming_sum = incoming.checksum()?;

        let mut archived = None;
        if let Some(current) = self.read_final(path)? {
            match current.version.cmp(version) {
                Ordering::Greater => {
                    return Err(RegistryError::Conflict(format!(
                        "{} is final at {}; cannot promote older {}",
                        path, current.version, version
                    )));
                }
                Ordering::Equal => {
                    if !incoming_sum.verify(&current.to_toml()?) {
                        return Err(RegistryError::Conflict(format!(
                            "{} is already final at {} with different content",
                            path, version
                        )));
                    }
                    debug!(%path, %version, "final already holds staged payload");
                    self.remove_staged(path, version)?;
                    return Ok(Promotion {
                        path: path.clone(),
                        version: version.clone(),
                        archived: None,
                        resumed: true,
                    });
                }
                Ordering::Less => {
                    archive_once(self, &current)?;
                    archived = Some(current.version);
                }
            }
        }

        self.write_final(incoming)?;
        self.remove_staged(path, version)?;
        Ok(Promotion {
            path: path.clone(),
            version: version.clone(),
            archived,
            resumed: false,
        })
    }
}

/// Archive `definition` unless an identical record already exists
fn archive_once<S: RegistryStore + ?Sized>(store: &S, definition: &ProtocolDefinition) -> Result<()> {
    let path = definition.registry_path()?;
    match store.read_archived(&path, &definition.version)? {
        Some(existing) => {
            if !definition.checksum()?.verify(&existing.to_toml()?) {
                return Err(RegistryError::ImmutabilityViolation {
                    path: path.to_string(),
                    version: definition.version.to_string(),
                });
            }
            debug!(%path, version = %definition.version, "already archived");
            Ok(())
        }
        None => store.write_archive(definition),
    }
}

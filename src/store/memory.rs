//! In-memory store
//!
//! Holds all three namespaces and the review records in maps behind a lock. Individual operations
//! can be armed to fail once, which is how partial merges are exercised.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::path::{DomainPath, RegistryPath};
use crate::review::ReviewRecord;
use crate::staging::{StagingEntry, StagingKey, SubmissionId};
use crate::version::ProtocolVersion;

use super::RegistryStore;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    List,
    ReadFinal,
    ReadArchived,
    WriteFinal,
    WriteArchive,
    WriteStaged,
    ReadStaged,
    ListStaged,
    RemoveStaged,
    WriteReview,
    ReadReview,
    ListReviews,
}

/// Committed state: final and archive namespaces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedState {
    pub finals: BTreeMap<RegistryPath, ProtocolDefinition>,
    pub archives: BTreeMap<(RegistryPath, ProtocolVersion), ProtocolDefinition>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: CommittedState,
    staged: BTreeMap<StagingKey, StagingEntry>,
    reviews: BTreeMap<SubmissionId, ReviewRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    armed: Mutex<BTreeSet<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with an I/O error
    pub fn fail_once(&self, op: StoreOp) {
        self.armed.lock().insert(op);
    }

    /// Copy of the final and archive namespaces
    pub fn snapshot(&self) -> CommittedState {
        self.inner.read().committed.clone()
    }

    /// Number of staged entries held
    pub fn staged_len(&self) -> usize {
        self.inner.read().staged.len()
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        if self.armed.lock().remove(&op) {
            debug!(?op, "injected store failure");
            return Err(RegistryError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure in {:?}", op),
            )));
        }
        Ok(())
    }
}

impl RegistryStore for MemoryStore {
    fn list(&self, prefix: Option<&DomainPath>) -> Result<Vec<RegistryPath>> {
        self.check(StoreOp::List)?;
        let inner = self.inner.read();
        Ok(inner
            .committed
            .finals
            .keys()
            .filter(|p| prefix.map_or(true, |d| p.domain.starts_with(d)))
            .cloned()
            .collect())
    }

    fn read_final(&self, path: &RegistryPath) -> Result<Option<ProtocolDefinition>> {
        self.check(StoreOp::ReadFinal)?;
        Ok(self.inner.read().committed.finals.get(path).cloned())
    }

    fn read_archived(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<ProtocolDefinition>> {
        self.check(StoreOp::ReadArchived)?;
        let key = (path.clone(), version.clone());
        Ok(self.inner.read().committed.archives.get(&key).cloned())
    }

    fn archived_versions(&self, path: &RegistryPath) -> Result<Vec<ProtocolVersion>> {
        self.check(StoreOp::ReadArchived)?;
        let inner = self.inner.read();
        Ok(inner
            .committed
            .archives
            .keys()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn write_final(&self, definition: &ProtocolDefinition) -> Result<()> {
        self.check(StoreOp::WriteFinal)?;
        let path = definition.registry_path()?;
        self.inner
            .write()
            .committed
            .finals
            .insert(path, definition.clone());
        Ok(())
    }

    fn write_archive(&self, definition: &ProtocolDefinition) -> Result<()> {
        self.check(StoreOp::WriteArchive)?;
        let key = (definition.registry_path()?, definition.version.clone());
        self.inner
            .write()
            .committed
            .archives
            .insert(key, definition.clone());
        Ok(())
    }

    fn write_staged(&self, entry: &StagingEntry) -> Result<()> {
        self.check(StoreOp::WriteStaged)?;
        let key = entry.key()?;
        let mut inner = self.inner.write();
        if inner.staged.contains_key(&key) {
            return Err(RegistryError::Conflict(format!("{} is already staged", key)));
        }
        inner.staged.insert(key, entry.clone());
        Ok(())
    }

    fn read_staged(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<StagingEntry>> {
        self.check(StoreOp::ReadStaged)?;
        let key = StagingKey::new(path.clone(), version.clone());
        Ok(self.inner.read().staged.get(&key).cloned())
    }

    fn remove_staged(&self, path: &RegistryPath, version: &ProtocolVersion) -> Result<()> {
        self.check(StoreOp::RemoveStaged)?;
        let key = StagingKey::new(path.clone(), version.clone());
        self.inner.write().staged.remove(&key);
        Ok(())
    }

    fn list_staged(&self) -> Result<Vec<StagingEntry>> {
        self.check(StoreOp::ListStaged)?;
        Ok(self.inner.read().staged.values().cloned().collect())
    }

    fn write_review(&self, record: &ReviewRecord) -> Result<()> {
        self.check(StoreOp::WriteReview)?;
        self.inner
            .write()
            .reviews
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn read_review(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>> {
        self.check(StoreOp::ReadReview)?;
        Ok(self.inner.read().reviews.get(id).cloned())
    }

    fn list_reviews(&self) -> Result<Vec<ReviewRecord>> {
        self.check(StoreOp::ListReviews)?;
        Ok(self.inner.read().reviews.values().cloned().collect())
    }
}

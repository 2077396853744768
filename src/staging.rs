//! Staging area for submitted, unreviewed definitions
//!
//! Entries are keyed by `(path, version)` and mirrored into the store's
//! staging namespace so that they survive restarts. An entry is consumed
//! exactly once: by promotion, by rejection, or by expiry.
//!
//! The store copy is authoritative. A [`StagingGuard`] holds the store's
//! staging lock and reloads from the store before any check, so processes
//! sharing a store see each other's submissions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::path::RegistryPath;
use crate::store::{LockScope, RegistryStore, StoreLock};
use crate::version::ProtocolVersion;

/// `(path, version)` of a staged submission
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StagingKey {
    pub path: RegistryPath,
    pub version: ProtocolVersion,
}

impl StagingKey {
    pub fn new(path: RegistryPath, version: ProtocolVersion) -> Self {
        Self { path, version }
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// Identifier handed back by `push` to track a submission through review
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    const PREFIX: &'static str = "sub-";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RegistryError::InvalidFormat(format!(
                "'{}' is not a submission id",
                s
            )));
        }
        Ok(Self(format!("{}{}", Self::PREFIX, hex.to_ascii_lowercase())))
    }
}

/// A submitted definition awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingEntry {
    pub submitted_at: DateTime<Utc>,
    pub definition: ProtocolDefinition,
}

impl StagingEntry {
    pub fn new(definition: ProtocolDefinition) -> Self {
        Self {
            submitted_at: Utc::now(),
            definition,
        }
    }

    pub fn key(&self) -> Result<StagingKey> {
        Ok(StagingKey::new(
            self.definition.registry_path()?,
            self.definition.version.clone(),
        ))
    }

    /// Stable id derived from key, payload and submission time
    pub fn submission_id(&self) -> Result<SubmissionId> {
        let seed = format!(
            "{}\n{}\n{}",
            self.key()?,
            self.definition.checksum()?,
            self.submitted_at.to_rfc3339()
        );
        let digest = Checksum::of_str(&seed);
        Ok(SubmissionId(format!("{}{}", SubmissionId::PREFIX, digest.short(12))))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.submitted_at
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// How a review ended for a staged entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    Rejected,
}

/// Holds staged entries until their review resolves
pub struct StagingArea<S> {
    store: Arc<S>,
    entries: Mutex<BTreeMap<StagingKey, StagingEntry>>,
}

impl<S: RegistryStore> StagingArea<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Rebuild the area from the store's staging namespace
    pub fn load(store: Arc<S>) -> Result<Self> {
        let entries = load_entries(store.as_ref())?;
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Replace the in-memory view with the store's staging namespace
    pub fn reload(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        *entries = load_entries(self.store.as_ref())?;
        Ok(())
    }

    /// Exclusive access for a check-then-submit sequence
    pub fn begin(&self) -> Result<StagingGuard<'_, S>> {
        let mut entries = self.entries.lock();
        let lock = self.store.lock(LockScope::Staging)?;
        *entries = load_entries(self.store.as_ref())?;
        Ok(StagingGuard {
            store: &self.store,
            entries,
            _lock: lock,
        })
    }

    pub fn submit(&self, entry: StagingEntry) -> Result<StagingKey> {
        self.begin()?.submit(entry)
    }

    pub fn get(&self, key: &StagingKey) -> Option<StagingEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &StagingKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Unresolved versions staged for `path`, ascending
    pub fn pending_for(&self, path: &RegistryPath) -> Vec<ProtocolVersion> {
        pending_in(&self.entries.lock(), path)
    }

    pub fn entries(&self) -> Vec<StagingEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume an entry. The store copy is removed first; on I/O failure the
    /// entry stays staged so the resolution can be retried.
    pub fn resolve(&self, key: &StagingKey, resolution: Resolution) -> Result<Option<StagingEntry>> {
        let mut entries = self.entries.lock();
        self.store.remove_staged(&key.path, &key.version)?;
        let removed = entries.remove(key);
        if removed.is_some() {
            info!(submission = %key, ?resolution, "staging entry resolved");
        }
        Ok(removed)
    }
}

fn load_entries<S: RegistryStore + ?Sized>(store: &S) -> Result<BTreeMap<StagingKey, StagingEntry>> {
    let mut entries = BTreeMap::new();
    for entry in store.list_staged()? {
        entries.insert(entry.key()?, entry);
    }
    debug!(count = entries.len(), "loaded staged entries");
    Ok(entries)
}

fn pending_in(
    entries: &BTreeMap<StagingKey, StagingEntry>,
    path: &RegistryPath,
) -> Vec<ProtocolVersion> {
    entries
        .keys()
        .filter(|k| &k.path == path)
        .map(|k| k.version.clone())
        .collect()
}

/// Locked view of the staging area
pub struct StagingGuard<'a, S> {
    store: &'a S,
    entries: MutexGuard<'a, BTreeMap<StagingKey, StagingEntry>>,
    _lock: StoreLock,
}

impl<S: RegistryStore> StagingGuard<'_, S> {
    pub fn has_pending(&self, path: &RegistryPath) -> bool {
        self.entries.keys().any(|k| &k.path == path)
    }

    pub fn pending_for(&self, path: &RegistryPath) -> Vec<ProtocolVersion> {
        pending_in(&self.entries, path)
    }

    /// Stage an entry. Fails `Conflict` if the same key is in flight, or if
    /// the path already has an equal or higher version staged.
    pub fn submit(&mut self, entry: StagingEntry) -> Result<StagingKey> {
        let key = entry.key()?;
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Conflict(format!(
                "{} is already staged and awaiting review",
                key
            )));
        }
        if let Some(highest) = self.pending_for(&key.path).into_iter().max() {
            if highest >= key.version {
                return Err(RegistryError::Conflict(format!(
                    "{} already has {} staged; submit a higher version",
                    key.path, highest
                )));
            }
        }
        self.store.write_staged(&entry)?;
        info!(submission = %key, "staged");
        self.entries.insert(key.clone(), entry);
        Ok(key)
    }
}

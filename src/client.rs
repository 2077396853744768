//! Registry client
//!
//! The only entry points for callers: `list` and `pull` read committed
//! state, `push` validates a definition and stages it for review. Nothing
//! here writes to the final or archive namespaces.

use std::sync::Arc;

use tracing::{debug, info};

use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::path::{DomainPath, RegistryPath};
use crate::resolver::VersionResolver;
use crate::review::ReviewWorkflow;
use crate::staging::{Resolution, StagingArea, StagingEntry, SubmissionId};
use crate::store::RegistryStore;
use crate::version::ProtocolVersion;

pub struct RegistryClient<S> {
    store: Arc<S>,
    staging: Arc<StagingArea<S>>,
    reviews: Arc<ReviewWorkflow<S>>,
    resolver: VersionResolver,
}

impl<S: RegistryStore> RegistryClient<S> {
    pub fn new(
        store: Arc<S>,
        staging: Arc<StagingArea<S>>,
        reviews: Arc<ReviewWorkflow<S>>,
        resolver: VersionResolver,
    ) -> Self {
        Self {
            store,
            staging,
            reviews,
            resolver,
        }
    }

    /// Final artifact paths, lexicographically ordered
    pub fn list(&self, domain_filter: Option<&DomainPath>) -> Result<Vec<RegistryPath>> {
        let mut paths = self.store.list(domain_filter)?;
        paths.sort_by_key(|p| p.to_string());
        Ok(paths)
    }

    /// Read the final definition, or a specific archived version
    pub fn pull(
        &self,
        name: &str,
        domain: &DomainPath,
        version: Option<&ProtocolVersion>,
    ) -> Result<ProtocolDefinition> {
        let path = RegistryPath::new(domain.clone(), name)?;
        debug!(%path, version = ?version.map(|v| v.to_string()), "pull");
        self.store.read(&path, version)
    }

    /// Every committed version of a protocol, ascending
    pub fn history(&self, name: &str, domain: &DomainPath) -> Result<Vec<ProtocolVersion>> {
        let path = RegistryPath::new(domain.clone(), name)?;
        let current = self
            .store
            .read_final(&path)?
            .ok_or_else(|| RegistryError::not_found(&path, None))?;
        let mut versions = self.store.archived_versions(&path)?;
        versions.push(current.version);
        versions.sort();
        Ok(versions)
    }

    /// Validate and stage a definition, opening its review.
    ///
    /// Either the definition is staged with an opened review, or nothing in
    /// the store changes.
    pub fn push(
        &self,
        definition: ProtocolDefinition,
        domain: DomainPath,
        version: ProtocolVersion,
        change_note: &str,
    ) -> Result<SubmissionId> {
        let note = change_note.trim();
        let mut candidate = definition.stamped(
            domain,
            version,
            (!note.is_empty()).then(|| note.to_string()),
        );
        self.resolver.check_well_formed(&candidate)?;
        let path = candidate.registry_path()?;

        let mut guard = self.staging.begin()?;
        let current = self.store.read_final(&path)?;
        let is_first = current.is_none() && !guard.has_pending(&path);
        if is_first && candidate.change_note.is_none() {
            candidate.change_note = Some(self.resolver.initial_change_note().to_string());
        }
        self.resolver
            .validate(&candidate, current.as_ref(), is_first, self.store.as_ref())?;

        let entry = StagingEntry::new(candidate);
        let key = guard.submit(entry.clone())?;
        drop(guard);

        match self.reviews.open(&entry, current.as_ref()) {
            Ok(id) => {
                info!(submission = %id, %key, "push accepted for review");
                Ok(id)
            }
            Err(e) => {
                self.staging.resolve(&key, Resolution::Rejected)?;
                Err(e)
            }
        }
    }
}

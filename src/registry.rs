//! Protocol Registry
//!
//! Wires one store handle to the client, staging area, review workflow and
//! merge processor. There is no process-wide state: every component reaches
//! storage through the handle it was given here.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::client::RegistryClient;
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::merge::{MergeProcessor, MergeReport};
use crate::resolver::VersionResolver;
use crate::review::{Prechecker, ReviewWorkflow};
use crate::staging::{StagingArea, SubmissionId};
use crate::store::{FsStore, RegistryStore};

/// The assembled registry
pub struct ProtocolRegistry<S> {
    store: Arc<S>,
    staging: Arc<StagingArea<S>>,
    reviews: Arc<ReviewWorkflow<S>>,
    client: RegistryClient<S>,
    merger: MergeProcessor<S>,
    config: RegistryConfig,
}

impl ProtocolRegistry<FsStore> {
    /// Open a filesystem-backed registry
    pub fn open_dir(path: impl AsRef<Path>, config: RegistryConfig) -> Result<Self> {
        Self::open(FsStore::open(path)?, config)
    }
}

impl<S: RegistryStore> ProtocolRegistry<S> {
    /// Assemble a registry over `store`. Staged entries and review decisions
    /// already in the store are picked up.
    pub fn open(store: S, config: RegistryConfig) -> Result<Self> {
        let store = Arc::new(store);
        let staging = Arc::new(StagingArea::load(store.clone())?);
        let prechecker = Prechecker::new(&config.validation)?;
        let reviews = Arc::new(ReviewWorkflow::new(
            store.clone(),
            staging.clone(),
            prechecker,
        ));
        reviews.rehydrate()?;
        if !staging.is_empty() {
            info!(count = staging.len(), "staged submissions awaiting merge or review");
        }

        let client = RegistryClient::new(
            store.clone(),
            staging.clone(),
            reviews.clone(),
            VersionResolver::new(&config.validation),
        );
        let merger = MergeProcessor::new(store.clone(), staging.clone(), reviews.clone());

        Ok(Self {
            store,
            staging,
            reviews,
            client,
            merger,
            config,
        })
    }

    pub fn client(&self) -> &RegistryClient<S> {
        &self.client
    }

    pub fn reviews(&self) -> &ReviewWorkflow<S> {
        &self.reviews
    }

    pub fn staging(&self) -> &StagingArea<S> {
        &self.staging
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn approve(&self, id: &SubmissionId, approver: &str) -> Result<()> {
        self.reviews.approve(id, approver)
    }

    pub fn reject(&self, id: &SubmissionId, reason: &str) -> Result<()> {
        self.reviews.reject(id, reason)
    }

    /// Merge trigger: promote every approved submission
    pub fn on_merged(&self) -> Result<MergeReport> {
        self.merger.run_batch()
    }

    /// Reject opened submissions past the configured staging age
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionId>> {
        match self.config.staging.max_age()? {
            Some(max_age) => self.reviews.expire(max_age, now),
            None => Ok(Vec::new()),
        }
    }
}

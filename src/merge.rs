//! Promotion of approved submissions
//!
//! A batch takes every approved submission that is still staged and applies
//! them path by path in ascending version order. Each entry goes through
//! archive, promote, clear; each step is a no-op when repeated, so a batch
//! that stopped halfway can simply be run again.
//!
//! Entries are independent: a failure is recorded in the [`MergeReport`] and
//! the batch moves on. Within one path, a failed or deferred entry holds back
//! every higher version behind it so promotions never skip a version.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{RegistryError, Result};
use crate::path::RegistryPath;
use crate::review::{ReviewRecord, ReviewState, ReviewWorkflow};
use crate::staging::{Resolution, StagingArea, StagingKey, SubmissionId};
use crate::store::{LockScope, Promotion, RegistryStore};
use crate::version::ProtocolVersion;

/// What happened to one approved submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeStatus {
    Promoted {
        archived: Option<ProtocolVersion>,
        resumed: bool,
    },
    /// Left approved and staged until a lower version is decided
    Deferred { waiting_on: ProtocolVersion },
    /// Out of order; the staged entry was discarded
    Conflict { message: String },
    /// Store failure; left approved and staged for the next batch
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub id: SubmissionId,
    pub key: StagingKey,
    pub status: MergeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub outcomes: Vec<MergeOutcome>,
}

impl MergeReport {
    pub fn promoted(&self) -> Vec<&MergeOutcome> {
        self.filter(|s| matches!(s, MergeStatus::Promoted { .. }))
    }

    pub fn deferred(&self) -> Vec<&MergeOutcome> {
        self.filter(|s| matches!(s, MergeStatus::Deferred { .. }))
    }

    pub fn conflicts(&self) -> Vec<&MergeOutcome> {
        self.filter(|s| matches!(s, MergeStatus::Conflict { .. }))
    }

    pub fn failed(&self) -> Vec<&MergeOutcome> {
        self.filter(|s| matches!(s, MergeStatus::Failed { .. }))
    }

    /// True when nothing is left for a later batch
    pub fn is_settled(&self) -> bool {
        self.deferred().is_empty() && self.failed().is_empty()
    }

    fn filter(&self, pred: impl Fn(&MergeStatus) -> bool) -> Vec<&MergeOutcome> {
        self.outcomes.iter().filter(|o| pred(&o.status)).collect()
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStatus::Promoted { archived: Some(v), .. } => write!(f, "promoted (archived {})", v),
            MergeStatus::Promoted { archived: None, .. } => write!(f, "promoted"),
            MergeStatus::Deferred { waiting_on } => write!(f, "deferred (waiting on {})", waiting_on),
            MergeStatus::Conflict { message } => write!(f, "conflict: {}", message),
            MergeStatus::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Sole writer of final and archive namespaces
pub struct MergeProcessor<S> {
    store: Arc<S>,
    staging: Arc<StagingArea<S>>,
    reviews: Arc<ReviewWorkflow<S>>,
    batch: Mutex<()>,
}

impl<S: RegistryStore> MergeProcessor<S> {
    pub fn new(
        store: Arc<S>,
        staging: Arc<StagingArea<S>>,
        reviews: Arc<ReviewWorkflow<S>>,
    ) -> Self {
        Self {
            store,
            staging,
            reviews,
            batch: Mutex::new(()),
        }
    }

    /// Promote every approved, still-staged submission.
    ///
    /// One batch at a time across every handle on the store. Staged entries
    /// and review decisions are reloaded first so approvals recorded through
    /// another handle are picked up.
    pub fn run_batch(&self) -> Result<MergeReport> {
        let _batch = self.batch.lock();
        let _store_batch = self.store.lock(LockScope::Merge)?;
        self.staging.reload()?;
        self.reviews.rehydrate()?;

        let mut approved = self.reviews.approved_pending();
        approved.sort_by(|a, b| a.key.cmp(&b.key));

        let mut held: BTreeMap<RegistryPath, ProtocolVersion> = BTreeMap::new();
        let mut report = MergeReport::default();

        for record in approved {
            let status = match held.get(&record.key.path) {
                Some(blocker) => MergeStatus::Deferred {
                    waiting_on: blocker.clone(),
                },
                None => self.process(&record),
            };
            match &status {
                MergeStatus::Deferred { waiting_on } => {
                    warn!(submission = %record.key, %waiting_on, "promotion deferred");
                    held.entry(record.key.path.clone())
                        .or_insert_with(|| waiting_on.clone());
                }
                MergeStatus::Failed { message } => {
                    warn!(submission = %record.key, %message, "promotion failed");
                    held.insert(record.key.path.clone(), record.key.version.clone());
                }
                MergeStatus::Conflict { message } => {
                    warn!(submission = %record.key, %message, "promotion rejected");
                }
                MergeStatus::Promoted { archived, resumed } => {
                    info!(
                        submission = %record.key,
                        archived = ?archived,
                        resumed,
                        "promoted"
                    );
                }
            }
            report.outcomes.push(MergeOutcome {
                id: record.id,
                key: record.key,
                status,
            });
        }
        Ok(report)
    }

    fn process(&self, record: &ReviewRecord) -> MergeStatus {
        if let Some(lower) = self.undecided_below(&record.key) {
            return MergeStatus::Deferred { waiting_on: lower };
        }
        match self.promote(&record.key) {
            Ok(promotion) => MergeStatus::Promoted {
                archived: promotion.archived,
                resumed: promotion.resumed,
            },
            Err(RegistryError::Conflict(message)) => {
                match self.staging.resolve(&record.key, Resolution::Rejected) {
                    Ok(_) => MergeStatus::Conflict { message },
                    Err(e) => MergeStatus::Failed {
                        message: format!("{}; discarding staged entry failed: {}", message, e),
                    },
                }
            }
            Err(e) => MergeStatus::Failed {
                message: e.to_string(),
            },
        }
    }

    /// Lowest staged version below `key` on the same path that is not approved
    fn undecided_below(&self, key: &StagingKey) -> Option<ProtocolVersion> {
        self.staging
            .pending_for(&key.path)
            .into_iter()
            .filter(|v| *v < key.version)
            .find(|v| {
                let lower = StagingKey::new(key.path.clone(), v.clone());
                self.reviews.state_of(&lower) != Some(ReviewState::Approved)
            })
    }

    fn promote(&self, key: &StagingKey) -> Result<Promotion> {
        let promotion = self.store.promote(&key.path, &key.version)?;
        self.staging.resolve(key, Resolution::Accepted)?;
        Ok(promotion)
    }
}

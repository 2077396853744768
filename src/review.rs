//! Review workflow
//!
//! Every staged submission gets a [`ReviewRecord`] that starts `Opened` and
//! ends `Approved` or `Rejected`. Terminal records never change again.
//!
//! Opening a review attaches the reviewer checklist. Items that can be
//! judged mechanically (naming, documentation, bit allocation for fixed-width
//! types, version and change note) are filled in by [`Prechecker`]; the rest
//! wait for a human. A submission with a failed mechanical item cannot be
//! approved.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{debug, info, warn};

use crate::config::ValidationConfig;
use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::resolver::{ReasonCode, ValidationError};
use crate::staging::{Resolution, StagingArea, StagingEntry, StagingKey, SubmissionId};
use crate::store::{LockScope, RegistryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Opened,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewState::Opened)
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewState::Opened => "opened",
            ReviewState::Approved => "approved",
            ReviewState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Reviewer checklist items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistItem {
    NamingConvention,
    ExampleRealism,
    DocumentationCompleteness,
    BitAllocation,
    EdgeCaseHandling,
    Atomicity,
    VersionAndChangeNote,
}

impl ChecklistItem {
    pub const ALL: [ChecklistItem; 7] = [
        ChecklistItem::NamingConvention,
        ChecklistItem::ExampleRealism,
        ChecklistItem::DocumentationCompleteness,
        ChecklistItem::BitAllocation,
        ChecklistItem::EdgeCaseHandling,
        ChecklistItem::Atomicity,
        ChecklistItem::VersionAndChangeNote,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ChecklistItem::NamingConvention => "Name follows the naming convention",
            ChecklistItem::ExampleRealism => "Example values are realistic",
            ChecklistItem::DocumentationCompleteness => "Description documents every input",
            ChecklistItem::BitAllocation => "Bit allocation fits the value range",
            ChecklistItem::EdgeCaseHandling => "Edge cases are handled",
            ChecklistItem::Atomicity => "Protocol captures one concept",
            ChecklistItem::VersionAndChangeNote => "Version and change note are correct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed(String),
    NeedsReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub item: ChecklistItem,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub entries: Vec<ChecklistEntry>,
}

impl Checklist {
    pub fn status(&self, item: ChecklistItem) -> Option<&CheckStatus> {
        self.entries.iter().find(|e| e.item == item).map(|e| &e.status)
    }

    pub fn failures(&self) -> Vec<&ChecklistEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, CheckStatus::Failed(_)))
            .collect()
    }

    /// Items left for the human reviewer
    pub fn open_items(&self) -> Vec<ChecklistItem> {
        self.entries
            .iter()
            .filter(|e| e.status == CheckStatus::NeedsReview)
            .map(|e| e.item)
            .collect()
    }
}

/// Mechanical part of the reviewer checklist
#[derive(Debug, Clone)]
pub struct Prechecker {
    naming: Regex,
}

impl Prechecker {
    pub fn new(config: &ValidationConfig) -> Result<Self> {
        let naming = Regex::new(&config.naming_pattern).map_err(|e| {
            RegistryError::InvalidFormat(format!(
                "naming pattern '{}': {}",
                config.naming_pattern, e
            ))
        })?;
        Ok(Self { naming })
    }

    pub fn run(
        &self,
        candidate: &ProtocolDefinition,
        current_final: Option<&ProtocolDefinition>,
    ) -> Checklist {
        let entries = ChecklistItem::ALL
            .iter()
            .map(|&item| ChecklistEntry {
                item,
                status: self.check(item, candidate, current_final),
            })
            .collect();
        Checklist { entries }
    }

    fn check(
        &self,
        item: ChecklistItem,
        candidate: &ProtocolDefinition,
        current_final: Option<&ProtocolDefinition>,
    ) -> CheckStatus {
        match item {
            ChecklistItem::NamingConvention => self.check_naming(candidate),
            ChecklistItem::DocumentationCompleteness => check_documentation(candidate),
            ChecklistItem::BitAllocation => match candidate.encoding_type.fixed_bits() {
                Some(fixed) if fixed == candidate.bits => CheckStatus::Passed,
                Some(fixed) => CheckStatus::Failed(format!(
                    "{} uses exactly {} bit(s)",
                    candidate.encoding_type, fixed
                )),
                None => CheckStatus::NeedsReview,
            },
            ChecklistItem::VersionAndChangeNote => check_version(candidate, current_final),
            ChecklistItem::ExampleRealism
            | ChecklistItem::EdgeCaseHandling
            | ChecklistItem::Atomicity => CheckStatus::NeedsReview,
        }
    }

    fn check_naming(&self, candidate: &ProtocolDefinition) -> CheckStatus {
        if !self.naming.is_match(&candidate.name) {
            return CheckStatus::Failed(format!(
                "name '{}' does not match {}",
                candidate.name,
                self.naming.as_str()
            ));
        }
        match candidate.inputs.iter().find(|i| !self.naming.is_match(i)) {
            Some(input) => CheckStatus::Failed(format!(
                "input '{}' does not match {}",
                input,
                self.naming.as_str()
            )),
            None => CheckStatus::Passed,
        }
    }
}

fn check_documentation(candidate: &ProtocolDefinition) -> CheckStatus {
    let placeholders = candidate.placeholders();
    if let Some(input) = candidate.inputs.iter().find(|i| !placeholders.contains(i)) {
        return CheckStatus::Failed(format!("input '{}' is not described", input));
    }
    let mut prose = candidate.description.clone();
    for p in &placeholders {
        prose = prose.replace(&format!("{{{}}}", p), "");
    }
    if !prose.chars().any(|c| c.is_alphabetic()) {
        return CheckStatus::Failed("description is only placeholders".to_string());
    }
    CheckStatus::Passed
}

fn check_version(
    candidate: &ProtocolDefinition,
    current_final: Option<&ProtocolDefinition>,
) -> CheckStatus {
    let Some(current) = current_final else {
        return CheckStatus::Passed;
    };
    if candidate.version.bump_from(&current.version).is_none() {
        return CheckStatus::Failed(format!(
            "{} does not follow final {}",
            candidate.version, current.version
        ));
    }
    if candidate
        .change_note
        .as_deref()
        .map_or(true, |n| n.trim().is_empty())
    {
        return CheckStatus::Failed("change note is empty".to_string());
    }
    match &candidate.extends {
        Some(parent) if parent.name == candidate.name && parent.version != current.version => {
            CheckStatus::Failed(format!(
                "extends {} but final is {}",
                parent, current.version
            ))
        }
        _ => CheckStatus::Passed,
    }
}

/// Review state of one submission
///
/// Scalars come before the key and checklist tables so the record
/// serializes to TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: SubmissionId,
    pub submitted_at: DateTime<Utc>,
    pub state: ReviewState,
    /// Unified diff of the staged payload against the current final
    pub diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub key: StagingKey,
    pub checklist: Checklist,
}

fn render_diff(
    candidate: &ProtocolDefinition,
    current_final: Option<&ProtocolDefinition>,
) -> Result<String> {
    let new_text = candidate.to_toml()?;
    let old_text = match current_final {
        Some(current) => current.to_toml()?,
        None => String::new(),
    };
    let old_header = current_final
        .map(|c| format!("final {}", c.version))
        .unwrap_or_else(|| "(none)".to_string());
    let new_header = format!("staged {}", candidate.version);
    Ok(TextDiff::from_lines(&old_text, &new_text)
        .unified_diff()
        .header(&old_header, &new_header)
        .to_string())
}

/// Tracks reviews for staged submissions
///
/// Records are written to the store before the in-memory copy changes, so a
/// decision taken through one handle is seen by every other handle on the
/// same store after [`ReviewWorkflow::rehydrate`].
pub struct ReviewWorkflow<S> {
    store: Arc<S>,
    staging: Arc<StagingArea<S>>,
    prechecker: Prechecker,
    records: RwLock<BTreeMap<SubmissionId, ReviewRecord>>,
}

impl<S: RegistryStore> ReviewWorkflow<S> {
    pub fn new(store: Arc<S>, staging: Arc<StagingArea<S>>, prechecker: Prechecker) -> Self {
        Self {
            store,
            staging,
            prechecker,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Catch up with the store.
    ///
    /// Loads every stored record, finishes rejections whose staged entry is
    /// still present, and opens a review for staged entries that have none.
    /// A record already terminal in memory is kept as is.
    pub fn rehydrate(&self) -> Result<()> {
        let stored = self.store.list_reviews()?;
        {
            let mut records = self.records.write();
            for record in stored {
                match records.get(&record.id) {
                    Some(known) if known.state.is_terminal() => {}
                    _ => {
                        records.insert(record.id.clone(), record);
                    }
                }
            }
        }

        let mut opened = 0;
        for entry in self.staging.entries() {
            let id = entry.submission_id()?;
            match self.get(&id).map(|r| r.state) {
                Some(ReviewState::Rejected) => {
                    self.staging.resolve(&entry.key()?, Resolution::Rejected)?;
                }
                Some(_) => {}
                None => {
                    let current = self.store.read_final(&entry.key()?.path)?;
                    self.open(&entry, current.as_ref())?;
                    opened += 1;
                }
            }
        }
        if opened > 0 {
            info!(count = opened, "opened reviews for staged submissions");
        }
        debug!(count = self.records.read().len(), "review records loaded");
        Ok(())
    }

    /// Open a review for a freshly staged entry. Opening an entry that
    /// already has a review returns the existing id.
    pub fn open(
        &self,
        entry: &StagingEntry,
        current_final: Option<&ProtocolDefinition>,
    ) -> Result<SubmissionId> {
        let id = entry.submission_id()?;
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Ok(id);
        }
        if let Some(stored) = self.store.read_review(&id)? {
            records.insert(id.clone(), stored);
            return Ok(id);
        }

        let record = ReviewRecord {
            id: id.clone(),
            submitted_at: entry.submitted_at,
            state: ReviewState::Opened,
            diff: render_diff(&entry.definition, current_final)?,
            decided_by: None,
            decided_at: None,
            reason: None,
            key: entry.key()?,
            checklist: self.prechecker.run(&entry.definition, current_final),
        };
        self.store.write_review(&record)?;
        let failed = record.checklist.failures().len();
        info!(submission = %id, key = %record.key, failed_checks = failed, "review opened");
        records.insert(id.clone(), record);
        Ok(id)
    }

    pub fn get(&self, id: &SubmissionId) -> Option<ReviewRecord> {
        self.records.read().get(id).cloned()
    }

    /// All records, ordered by submission time
    pub fn records(&self) -> Vec<ReviewRecord> {
        let mut all: Vec<_> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn opened(&self) -> Vec<ReviewRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.state == ReviewState::Opened)
            .collect()
    }

    /// State of the live submission for `key`, if one is staged
    pub fn state_of(&self, key: &StagingKey) -> Option<ReviewState> {
        let entry = self.staging.get(key)?;
        let id = entry.submission_id().ok()?;
        self.records.read().get(&id).map(|r| r.state)
    }

    /// Record an approval. Refused while a mechanical check failed.
    pub fn approve(&self, id: &SubmissionId, approver: &str) -> Result<()> {
        let mut records = self.records.write();
        let _decision = self.store.lock(LockScope::Review)?;
        let mut record = self.latest(&mut records, id)?;

        let failures = record.checklist.failures();
        if !failures.is_empty() {
            let detail = failures
                .iter()
                .map(|f| match &f.status {
                    CheckStatus::Failed(why) => format!("{}: {}", f.item.label(), why),
                    _ => f.item.label().to_string(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ValidationError::new(ReasonCode::PrecheckFailed, detail).into());
        }

        record.state = ReviewState::Approved;
        record.decided_by = Some(approver.to_string());
        record.decided_at = Some(Utc::now());
        self.store.write_review(&record)?;
        info!(submission = %id, key = %record.key, approver, "review approved");
        records.insert(id.clone(), record);
        Ok(())
    }

    /// Record a rejection and discard the staged entry.
    ///
    /// The rejection is persisted first. If discarding the entry then fails,
    /// the next [`ReviewWorkflow::rehydrate`] finishes the job.
    pub fn reject(&self, id: &SubmissionId, reason: &str) -> Result<()> {
        let mut records = self.records.write();
        let _decision = self.store.lock(LockScope::Review)?;
        let mut record = self.latest(&mut records, id)?;

        record.state = ReviewState::Rejected;
        record.decided_at = Some(Utc::now());
        record.reason = Some(reason.to_string());
        self.store.write_review(&record)?;
        info!(submission = %id, key = %record.key, reason, "review rejected");
        let key = record.key.clone();
        records.insert(id.clone(), record);
        self.staging.resolve(&key, Resolution::Rejected)?;
        Ok(())
    }

    /// Stored copy of an open record; the store wins over memory
    fn latest(
        &self,
        records: &mut BTreeMap<SubmissionId, ReviewRecord>,
        id: &SubmissionId,
    ) -> Result<ReviewRecord> {
        let record = match self.store.read_review(id)? {
            Some(stored) => {
                records.insert(id.clone(), stored.clone());
                stored
            }
            None => records
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::SubmissionNotFound(id.clone()))?,
        };
        ensure_open(&record)?;
        Ok(record)
    }

    /// Approved submissions whose staged entry has not been promoted yet
    pub fn approved_pending(&self) -> Vec<ReviewRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.state == ReviewState::Approved && self.staging.contains(&r.key))
            .cloned()
            .collect()
    }

    /// Reject opened reviews whose submission is older than `max_age`.
    /// Reviews decided elsewhere in the meantime are skipped.
    pub fn expire(&self, max_age: Duration, now: DateTime<Utc>) -> Result<Vec<SubmissionId>> {
        let stale: Vec<SubmissionId> = self
            .opened()
            .into_iter()
            .filter(|r| now - r.submitted_at > max_age)
            .map(|r| r.id)
            .collect();
        let mut expired = Vec::with_capacity(stale.len());
        for id in stale {
            match self.reject(&id, "expired") {
                Ok(()) => {
                    warn!(submission = %id, "submission expired");
                    expired.push(id);
                }
                Err(RegistryError::Conflict(message)) => {
                    debug!(submission = %id, %message, "already decided");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}

fn ensure_open(record: &ReviewRecord) -> Result<()> {
    if record.state.is_terminal() {
        return Err(RegistryError::Conflict(format!(
            "review {} is already {}",
            record.id, record.state
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EncodingType, ProtocolBuilder};
    use crate::path::{DomainPath, ProtocolRef};
    use crate::store::{MemoryStore, StoreOp};
    use crate::version::ProtocolVersion;

    fn builder() -> ProtocolBuilder {
        ProtocolBuilder::new(DomainPath::parse("environmental/soil").unwrap(), "soil_moisture_percent")
            .description("Moisture between {min} and {max}")
            .input("min", 0)
            .input("max", 100)
            .encoding(EncodingType::Int, 7)
    }

    fn workflow_over(
        store: Arc<MemoryStore>,
    ) -> (Arc<StagingArea<MemoryStore>>, ReviewWorkflow<MemoryStore>) {
        let staging = Arc::new(StagingArea::load(store.clone()).unwrap());
        let prechecker = Prechecker::new(&ValidationConfig::default()).unwrap();
        let reviews = ReviewWorkflow::new(store, staging.clone(), prechecker);
        reviews.rehydrate().unwrap();
        (staging, reviews)
    }

    fn workflow() -> (Arc<StagingArea<MemoryStore>>, ReviewWorkflow<MemoryStore>) {
        workflow_over(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_checklist_marks_subjective_items() {
        let checker = Prechecker::new(&ValidationConfig::default()).unwrap();
        let checklist = checker.run(&builder().build(), None);
        assert_eq!(checklist.entries.len(), ChecklistItem::ALL.len());
        assert_eq!(checklist.status(ChecklistItem::NamingConvention), Some(&CheckStatus::Passed));
        assert_eq!(
            checklist.open_items(),
            vec![
                ChecklistItem::ExampleRealism,
                ChecklistItem::BitAllocation,
                ChecklistItem::EdgeCaseHandling,
                ChecklistItem::Atomicity
            ]
        );
        assert!(checklist.failures().is_empty());
    }

    #[test]
    fn test_naming_precheck_failure_blocks_approval() {
        let (staging, reviews) = workflow();
        let mut def = builder().build();
        def.name = "SoilMoisture".into();
        let entry = StagingEntry::new(def);
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        let err = reviews.approve(&id, "alice").unwrap_err();
        match err {
            RegistryError::Validation(e) => assert_eq!(e.reason, ReasonCode::PrecheckFailed),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(reviews.get(&id).unwrap().state, ReviewState::Opened);
    }

    #[test]
    fn test_lineage_must_extend_current_final() {
        let checker = Prechecker::new(&ValidationConfig::default()).unwrap();
        let current = builder().version(ProtocolVersion::new(1, 1, 0)).build();
        let skipping = builder()
            .version(ProtocolVersion::new(1, 2, 0))
            .extends(ProtocolRef::parse("soil_moisture_percent@1.0.0").unwrap())
            .note("widen")
            .build();
        let checklist = checker.run(&skipping, Some(&current));
        assert!(matches!(
            checklist.status(ChecklistItem::VersionAndChangeNote),
            Some(CheckStatus::Failed(_))
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let (staging, reviews) = workflow();
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        reviews.approve(&id, "alice").unwrap();
        assert!(matches!(reviews.reject(&id, "late"), Err(RegistryError::Conflict(_))));
        assert!(matches!(reviews.approve(&id, "bob"), Err(RegistryError::Conflict(_))));
        let record = reviews.get(&id).unwrap();
        assert_eq!(record.state, ReviewState::Approved);
        assert_eq!(record.decided_by.as_deref(), Some("alice"));
        assert_eq!(reviews.approved_pending().len(), 1);
    }

    #[test]
    fn test_reject_discards_staged_entry() {
        let (staging, reviews) = workflow();
        let entry = StagingEntry::new(builder().build());
        let key = staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        reviews.reject(&id, "bits too wide").unwrap();
        assert!(!staging.contains(&key));
        assert_eq!(reviews.get(&id).unwrap().reason.as_deref(), Some("bits too wide"));
    }

    #[test]
    fn test_expire_rejects_stale_submissions() {
        let (staging, reviews) = workflow();
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        let later = entry.submitted_at + Duration::hours(2);
        assert!(reviews.expire(Duration::hours(3), later).unwrap().is_empty());
        assert_eq!(reviews.expire(Duration::hours(1), later).unwrap(), vec![id.clone()]);
        assert_eq!(reviews.get(&id).unwrap().state, ReviewState::Rejected);
        assert!(staging.is_empty());
    }

    #[test]
    fn test_diff_against_final() {
        let (staging, reviews) = workflow();
        let current = builder().build();
        let next = builder()
            .version(ProtocolVersion::new(1, 1, 0))
            .encoding(EncodingType::Int, 8)
            .note("wider")
            .build();
        let entry = StagingEntry::new(next);
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, Some(&current)).unwrap();
        let diff = reviews.get(&id).unwrap().diff;
        assert!(diff.contains("-bits = 7"));
        assert!(diff.contains("+bits = 8"));
    }

    #[test]
    fn test_decision_survives_new_workflow() {
        let store = Arc::new(MemoryStore::new());
        let (staging, reviews) = workflow_over(store.clone());
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();
        reviews.approve(&id, "alice").unwrap();
        drop(reviews);

        let (_, reopened) = workflow_over(store);
        let record = reopened.get(&id).unwrap();
        assert_eq!(record.state, ReviewState::Approved);
        assert_eq!(record.decided_by.as_deref(), Some("alice"));
        assert_eq!(reopened.approved_pending().len(), 1);
        assert!(matches!(reopened.reject(&id, "late"), Err(RegistryError::Conflict(_))));
    }

    #[test]
    fn test_decision_through_other_workflow_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let (staging, first) = workflow_over(store.clone());
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = first.open(&entry, None).unwrap();

        let (_, second) = workflow_over(store.clone());
        second.reject(&id, "duplicate concept").unwrap();

        // The first workflow still holds the stale opened copy in memory
        assert_eq!(first.get(&id).unwrap().state, ReviewState::Opened);
        assert!(matches!(first.approve(&id, "bob"), Err(RegistryError::Conflict(_))));
        assert_eq!(first.get(&id).unwrap().state, ReviewState::Rejected);
        assert_eq!(store.staged_len(), 0);
    }

    #[test]
    fn test_open_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (staging, first) = workflow_over(store.clone());
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = first.open(&entry, None).unwrap();
        assert_eq!(first.open(&entry, None).unwrap(), id);

        // A fresh workflow adopts the stored record instead of opening anew
        let (_, second) = workflow_over(store.clone());
        assert_eq!(second.records().len(), 1);
        assert_eq!(store.list_reviews().unwrap().len(), 1);
    }

    #[test]
    fn test_rehydrate_finishes_interrupted_rejection() {
        let store = Arc::new(MemoryStore::new());
        let (staging, reviews) = workflow_over(store.clone());
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        store.fail_once(StoreOp::RemoveStaged);
        assert!(reviews.reject(&id, "no").is_err());
        assert_eq!(store.staged_len(), 1);

        let (staging, reopened) = workflow_over(store.clone());
        assert_eq!(reopened.get(&id).unwrap().state, ReviewState::Rejected);
        assert!(staging.is_empty());
        assert_eq!(store.staged_len(), 0);
    }

    #[test]
    fn test_failed_record_write_leaves_review_open() {
        let (staging, reviews) = workflow();
        let entry = StagingEntry::new(builder().build());
        staging.submit(entry.clone()).unwrap();
        let id = reviews.open(&entry, None).unwrap();

        reviews.store.fail_once(StoreOp::WriteReview);
        assert!(reviews.approve(&id, "alice").is_err());
        assert_eq!(reviews.get(&id).unwrap().state, ReviewState::Opened);
        reviews.approve(&id, "alice").unwrap();
    }
}

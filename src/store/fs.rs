//! Filesystem store
//!
//! Directory structure:
//!
//! ```text
//! <root>/
//! ├── final/environmental/soil/soil_moisture_percent.toml
//! ├── archive/environmental/soil/soil_moisture_percent/1.0.0.toml
//! ├── staging/environmental/soil/soil_moisture_percent/1.2.0.toml
//! ├── reviews/sub-3f9c2a71be04.toml
//! └── locks/{staging,review,merge}.lock
//! ```
//!
//! Every file is written next to its destination and moved into place, so
//! readers never observe a half-written payload. Staged files are linked
//! rather than renamed, which fails instead of replacing another process's
//! submission. Lock files carry an advisory `flock` shared by every process
//! using the same root.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::definition::ProtocolDefinition;
use crate::error::{RegistryError, Result};
use crate::path::{DomainPath, RegistryPath};
use crate::review::ReviewRecord;
use crate::staging::{StagingEntry, SubmissionId};
use crate::version::ProtocolVersion;

use super::{LockScope, RegistryStore, StoreLock};

const EXTENSION: &str = "toml";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `path`, creating the namespaces if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        for namespace in ["final", "archive", "staging", "reviews", "locks"] {
            fs::create_dir_all(root.join(namespace))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn domain_dir(&self, namespace: &str, domain: &DomainPath) -> PathBuf {
        let mut dir = self.root.join(namespace);
        for segment in domain.segments() {
            dir.push(segment);
        }
        dir
    }

    fn final_file(&self, path: &RegistryPath) -> PathBuf {
        self.domain_dir("final", &path.domain)
            .join(format!("{}.{}", path.name, EXTENSION))
    }

    fn versioned_dir(&self, namespace: &str, path: &RegistryPath) -> PathBuf {
        self.domain_dir(namespace, &path.domain).join(&path.name)
    }

    fn versioned_file(&self, namespace: &str, path: &RegistryPath, version: &ProtocolVersion) -> PathBuf {
        self.versioned_dir(namespace, path)
            .join(format!("{}.{}", version.slot(), EXTENSION))
    }

    fn review_file(&self, id: &SubmissionId) -> PathBuf {
        self.root
            .join("reviews")
            .join(format!("{}.{}", id, EXTENSION))
    }
}

fn read_optional(file: &Path) -> Result<Option<String>> {
    match fs::read_to_string(file) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write `content` to a temp file beside `file`, unique per process and call
fn write_temp(file: &Path, content: &str) -> Result<PathBuf> {
    let dir = file
        .parent()
        .ok_or_else(|| RegistryError::InvalidFormat(format!("{:?} has no parent", file)))?;
    fs::create_dir_all(dir)?;
    let tmp = file.with_extension(format!(
        "{}.tmp-{}-{}",
        EXTENSION,
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, content)?;
    Ok(tmp)
}

fn write_atomic(file: &Path, content: &str) -> Result<()> {
    let tmp = write_temp(file, content)?;
    fs::rename(&tmp, file)?;
    debug!(file = %file.display(), "wrote");
    Ok(())
}

/// Like `write_atomic`, but fails `Conflict` when `file` already exists
fn write_new(file: &Path, content: &str) -> Result<()> {
    let tmp = write_temp(file, content)?;
    let linked = fs::hard_link(&tmp, file);
    if let Err(e) = fs::remove_file(&tmp) {
        warn!(file = %tmp.display(), error = %e, "leftover temp file");
    }
    match linked {
        Ok(()) => {
            debug!(file = %file.display(), "created");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(RegistryError::Conflict(
            format!("{} already exists", file.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &fs::File) -> io::Result<()> {
    rustix::fs::flock(file, rustix::fs::FlockOperation::LockExclusive).map_err(io::Error::from)
}

// Without flock only in-process serialization applies
#[cfg(not(unix))]
fn lock_exclusive(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

fn walk_error(e: walkdir::Error) -> RegistryError {
    e.into_io_error()
        .map(RegistryError::Io)
        .unwrap_or_else(|| RegistryError::InvalidFormat("filesystem loop in store".into()))
}

fn is_payload(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}

impl RegistryStore for FsStore {
    fn list(&self, prefix: Option<&DomainPath>) -> Result<Vec<RegistryPath>> {
        let base = self.root.join("final");
        let mut paths = Vec::new();
        for entry in WalkDir::new(&base).min_depth(2) {
            let entry = entry.map_err(walk_error)?;
            if !entry.file_type().is_file() || !is_payload(entry.path()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| RegistryError::InvalidFormat(e.to_string()))?
                .with_extension("");
            let path = RegistryPath::parse(&relative.to_string_lossy().replace('\\', "/"))?;
            if prefix.map_or(true, |d| path.domain.starts_with(d)) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn read_final(&self, path: &RegistryPath) -> Result<Option<ProtocolDefinition>> {
        read_optional(&self.final_file(path))?
            .map(|content| ProtocolDefinition::from_toml(&content))
            .transpose()
    }

    fn read_archived(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<ProtocolDefinition>> {
        read_optional(&self.versioned_file("archive", path, version))?
            .map(|content| ProtocolDefinition::from_toml(&content))
            .transpose()
    }

    fn archived_versions(&self, path: &RegistryPath) -> Result<Vec<ProtocolVersion>> {
        let dir = self.versioned_dir("archive", path);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let file = entry?.path();
            if !is_payload(&file) {
                continue;
            }
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                versions.push(ProtocolVersion::parse(stem)?);
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn write_final(&self, definition: &ProtocolDefinition) -> Result<()> {
        let path = definition.registry_path()?;
        write_atomic(&self.final_file(&path), &definition.to_toml()?)
    }

    fn write_archive(&self, definition: &ProtocolDefinition) -> Result<()> {
        let path = definition.registry_path()?;
        let file = self.versioned_file("archive", &path, &definition.version);
        write_atomic(&file, &definition.to_toml()?)
    }

    fn write_staged(&self, entry: &StagingEntry) -> Result<()> {
        let key = entry.key()?;
        let file = self.versioned_file("staging", &key.path, &key.version);
        write_new(&file, &entry.to_toml()?).map_err(|e| match e {
            RegistryError::Conflict(_) => {
                RegistryError::Conflict(format!("{} is already staged", key))
            }
            other => other,
        })
    }

    fn read_staged(
        &self,
        path: &RegistryPath,
        version: &ProtocolVersion,
    ) -> Result<Option<StagingEntry>> {
        read_optional(&self.versioned_file("staging", path, version))?
            .map(|content| StagingEntry::from_toml(&content))
            .transpose()
    }

    fn remove_staged(&self, path: &RegistryPath, version: &ProtocolVersion) -> Result<()> {
        match fs::remove_file(self.versioned_file("staging", path, version)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_staged(&self) -> Result<Vec<StagingEntry>> {
        let mut staged = Vec::new();
        for entry in WalkDir::new(self.root.join("staging")).sort_by_file_name() {
            let entry = entry.map_err(walk_error)?;
            if entry.file_type().is_file() && is_payload(entry.path()) {
                let content = fs::read_to_string(entry.path())?;
                staged.push(StagingEntry::from_toml(&content)?);
            }
        }
        Ok(staged)
    }

    fn write_review(&self, record: &ReviewRecord) -> Result<()> {
        write_atomic(&self.review_file(&record.id), &toml::to_string(record)?)
    }

    fn read_review(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>> {
        read_optional(&self.review_file(id))?
            .map(|content| toml::from_str::<ReviewRecord>(&content).map_err(RegistryError::from))
            .transpose()
    }

    fn list_reviews(&self) -> Result<Vec<ReviewRecord>> {
        let mut records = Vec::new();
        for entry in WalkDir::new(self.root.join("reviews"))
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(walk_error)?;
            if entry.file_type().is_file() && is_payload(entry.path()) {
                let content = fs::read_to_string(entry.path())?;
                records.push(toml::from_str(&content)?);
            }
        }
        Ok(records)
    }

    fn lock(&self, scope: LockScope) -> Result<StoreLock> {
        let path = self
            .root
            .join("locks")
            .join(format!("{}.lock", scope.as_str()));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        lock_exclusive(&file)?;
        debug!(scope = scope.as_str(), "store lock acquired");
        Ok(StoreLock::file(file))
    }
}

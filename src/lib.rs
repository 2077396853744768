//! Protocol Registry
//!
//! A versioned registry for encoding-protocol definitions. Definitions are
//! pushed into staging, reviewed, and promoted into a final slot per protocol;
//! whatever occupied that slot before is archived under its own version.
//!
//! ## Features
//!
//! - **Monotonic Versions**: every path's final version strictly increases
//! - **Lineage**: `extends` pins the exact prior `name@version` being refined
//! - **Staged Review**: submissions carry a checklist and a diff against final
//! - **Recoverable Promotion**: archive, promote and clear are each idempotent
//! - **Plain-Text Payloads**: one TOML file per definition and version
//! - **Shared Stores**: review decisions are stored, and staging and merge
//!   batches lock the store, so several processes can work one registry
//!
//! ## Architecture
//!
//! ```text
//! RegistryClient::push ──► StagingArea ──► ReviewWorkflow (opened)
//!                                              │ approve
//!                                              ▼
//! RegistryStore ◄── archive + promote ── MergeProcessor (on merge)
//! ```

pub mod checksum;
pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod merge;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod review;
pub mod staging;
pub mod store;
pub mod version;

pub use checksum::Checksum;
pub use client::RegistryClient;
pub use config::RegistryConfig;
pub use definition::{EncodingType, ExampleValue, ProtocolBuilder, ProtocolDefinition};
pub use error::{RegistryError, Result};
pub use merge::{MergeProcessor, MergeReport, MergeStatus};
pub use path::{DomainPath, ProtocolRef, RegistryPath};
pub use registry::ProtocolRegistry;
pub use resolver::{ReasonCode, ValidationError, VersionResolver};
pub use review::{CheckStatus, ChecklistItem, ReviewRecord, ReviewState, ReviewWorkflow};
pub use staging::{StagingArea, StagingEntry, StagingKey, SubmissionId};
pub use store::{FsStore, LockScope, MemoryStore, RegistryStore, StoreLock, StoreOp};
pub use version::{BumpKind, ProtocolVersion};

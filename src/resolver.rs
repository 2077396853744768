//! Submission validation
//!
//! [`VersionResolver::validate`] checks a candidate definition against the
//! current final artifact of its path. Rules run in a fixed order and the
//! first violation is returned with a machine-readable [`ReasonCode`]:
//!
//! 1. the definition is well-formed
//! 2. the version is strictly greater than the current final version
//! 3. `extends`, if set, resolves in the store and is older than the candidate
//! 4. every push after the first carries a change note

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::definition::{EncodingType, ProtocolDefinition};
use crate::error::Result;
use crate::path::is_identifier;
use crate::store::RegistryStore;

/// Why a candidate was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    MissingField,
    InvalidName,
    BitsOutOfRange,
    BitsInconsistentWithType,
    NoInputs,
    InvalidInput,
    DuplicateInput,
    InputNotInDescription,
    UndeclaredPlaceholder,
    ExampleMissingInput,
    ExampleUnknownInput,
    VersionNotIncreasing,
    ExtendsNotFound,
    ExtendsNotLower,
    MissingChangeNote,
    PrecheckFailed,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingField => "missing_field",
            ReasonCode::InvalidName => "invalid_name",
            ReasonCode::BitsOutOfRange => "bits_out_of_range",
            ReasonCode::BitsInconsistentWithType => "bits_inconsistent_with_type",
            ReasonCode::NoInputs => "no_inputs",
            ReasonCode::InvalidInput => "invalid_input",
            ReasonCode::DuplicateInput => "duplicate_input",
            ReasonCode::InputNotInDescription => "input_not_in_description",
            ReasonCode::UndeclaredPlaceholder => "undeclared_placeholder",
            ReasonCode::ExampleMissingInput => "example_missing_input",
            ReasonCode::ExampleUnknownInput => "example_unknown_input",
            ReasonCode::VersionNotIncreasing => "version_not_increasing",
            ReasonCode::ExtendsNotFound => "extends_not_found",
            ReasonCode::ExtendsNotLower => "extends_not_lower",
            ReasonCode::MissingChangeNote => "missing_change_note",
            ReasonCode::PrecheckFailed => "precheck_failed",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violated validation rule
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{reason}] {message}")]
pub struct ValidationError {
    pub reason: ReasonCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

fn fail(reason: ReasonCode, message: impl Into<String>) -> std::result::Result<(), ValidationError> {
    Err(ValidationError::new(reason, message))
}

/// Validates candidates against the committed state of a path
#[derive(Debug, Clone)]
pub struct VersionResolver {
    max_bits: u32,
    initial_change_note: String,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl VersionResolver {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_bits: config.max_bits,
            initial_change_note: config.initial_change_note.clone(),
        }
    }

    /// Marker accepted as the change note of a path's first version
    pub fn initial_change_note(&self) -> &str {
        &self.initial_change_note
    }

    /// Run every rule; `is_first` is true when nothing was ever pushed to the path
    pub fn validate<S: RegistryStore + ?Sized>(
        &self,
        candidate: &ProtocolDefinition,
        current_final: Option<&ProtocolDefinition>,
        is_first: bool,
        store: &S,
    ) -> Result<()> {
        self.check_well_formed(candidate)?;
        check_monotonic(candidate, current_final)?;
        self.check_lineage(candidate, store)?;
        self.check_change_note(candidate, is_first)?;
        debug!(protocol = %candidate.reference(), "candidate passed validation");
        Ok(())
    }

    /// Rule 1: required fields present and well-formed
    pub fn check_well_formed(
        &self,
        def: &ProtocolDefinition,
    ) -> std::result::Result<(), ValidationError> {
        if def.name.is_empty() {
            return fail(ReasonCode::MissingField, "name is empty");
        }
        if !is_identifier(&def.name) {
            return fail(
                ReasonCode::InvalidName,
                format!("name '{}' must be an identifier", def.name),
            );
        }
        if def.bits == 0 || def.bits > self.max_bits {
            return fail(
                ReasonCode::BitsOutOfRange,
                format!("bits = {} is outside 1..={}", def.bits, self.max_bits),
            );
        }
        if let Some(fixed) = def.encoding_type.fixed_bits() {
            if def.bits != fixed {
                return fail(
                    ReasonCode::BitsInconsistentWithType,
                    format!("{} requires bits = {}, got {}", def.encoding_type, fixed, def.bits),
                );
            }
        }
        if def.encoding_type == EncodingType::Float && def.bits < 2 {
            return fail(
                ReasonCode::BitsInconsistentWithType,
                "float needs at least 2 bits",
            );
        }
        if def.description.trim().is_empty() {
            return fail(ReasonCode::MissingField, "description is empty");
        }
        if def.inputs.is_empty() {
            return fail(ReasonCode::NoInputs, "at least one input is required");
        }

        let mut declared = BTreeSet::new();
        for input in &def.inputs {
            if !is_identifier(input) {
                return fail(
                    ReasonCode::InvalidInput,
                    format!("input '{}' must be an identifier", input),
                );
            }
            if !declared.insert(input.as_str()) {
                return fail(
                    ReasonCode::DuplicateInput,
                    format!("input '{}' declared twice", input),
                );
            }
        }

        let placeholders = def.placeholders();
        for input in &def.inputs {
            if !placeholders.iter().any(|p| p == input) {
                return fail(
                    ReasonCode::InputNotInDescription,
                    format!("input '{}' has no {{{}}} placeholder in description", input, input),
                );
            }
        }
        for placeholder in &placeholders {
            if !declared.contains(placeholder.as_str()) {
                return fail(
                    ReasonCode::UndeclaredPlaceholder,
                    format!("placeholder {{{}}} is not a declared input", placeholder),
                );
            }
        }

        for input in &def.inputs {
            if !def.example.contains_key(input) {
                return fail(
                    ReasonCode::ExampleMissingInput,
                    format!("example has no value for input '{}'", input),
                );
            }
        }
        if let Some(extra) = def.example.keys().find(|k| !declared.contains(k.as_str())) {
            return fail(
                ReasonCode::ExampleUnknownInput,
                format!("example value '{}' is not a declared input", extra),
            );
        }
        Ok(())
    }

    /// Rule 3: lineage resolves to an older, committed version
    fn check_lineage<S: RegistryStore + ?Sized>(
        &self,
        candidate: &ProtocolDefinition,
        store: &S,
    ) -> Result<()> {
        let Some(parent) = &candidate.extends else {
            return Ok(());
        };
        let parent_path = candidate.registry_path()?.sibling(&parent.name)?;
        if !store.exists(&parent_path, Some(&parent.version))? {
            return Err(ValidationError::new(
                ReasonCode::ExtendsNotFound,
                format!("extends {} is neither final nor archived", parent),
            )
            .into());
        }
        if parent.version >= candidate.version {
            return Err(ValidationError::new(
                ReasonCode::ExtendsNotLower,
                format!(
                    "extends {} is not older than {}",
                    parent, candidate.version
                ),
            )
            .into());
        }
        Ok(())
    }

    /// Rule 4: later versions explain themselves
    fn check_change_note(
        &self,
        candidate: &ProtocolDefinition,
        is_first: bool,
    ) -> std::result::Result<(), ValidationError> {
        if is_first {
            return Ok(());
        }
        let note = candidate.change_note.as_deref().map(str::trim).unwrap_or("");
        if note.is_empty() || note.eq_ignore_ascii_case(&self.initial_change_note) {
            return fail(
                ReasonCode::MissingChangeNote,
                format!("{} needs a change note", candidate.reference()),
            );
        }
        Ok(())
    }
}

/// Rule 2: strictly increasing versions per path
fn check_monotonic(
    candidate: &ProtocolDefinition,
    current_final: Option<&ProtocolDefinition>,
) -> std::result::Result<(), ValidationError> {
    if let Some(current) = current_final {
        if candidate.version <= current.version {
            return fail(
                ReasonCode::VersionNotIncreasing,
                format!(
                    "{} must be greater than final version {}",
                    candidate.version, current.version
                ),
            );
        }
    }
    Ok(())
}

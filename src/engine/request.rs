//! Request and result contracts for the mutation engine

use crate::backup::LineChange;
use crate::locator::ElementReference;
use crate::strategy::{ReplaceOptions, UpdateMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Which operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationMode {
    Content,
    Selector,
    Attribute,
    Line,
}

/// One mutation, immutable once submitted. Batch files are JSON arrays of
/// these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRequest {
    pub mode: MutationMode,

    pub element: ElementReference,

    /// The replacement value. `None` is only meaningful for attribute
    /// requests, where it removes the attribute.
    #[serde(default)]
    pub new_value: Option<String>,
}

/// Outcome of one transaction.
///
/// `success` without `changed` means the reference resolved to nothing; the
/// document is byte-identical to before. `success == false` also guarantees
/// the document was left untouched.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResult {
    pub success: bool,
    pub changed: bool,
    pub backup_id: Option<Uuid>,
    pub error: Option<String>,
}

impl MutationResult {
    pub fn no_op(backup_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            changed: false,
            backup_id,
            error: None,
        }
    }

    pub fn updated(changed: bool, backup_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            changed,
            backup_id,
            error: None,
        }
    }
}

/// Per-item outcome inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemOutcome {
    pub index: usize,
    pub changed: bool,
    pub outcome: BatchItemStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Updated,
    Unchanged,
    NotFound,
}

/// Result of an all-or-nothing batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub changed: bool,
    pub backup_id: Option<Uuid>,
    pub items: Vec<BatchItemOutcome>,
}

impl BatchReport {
    pub fn updated_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == BatchItemStatus::Updated)
            .count()
    }
}

/// What an update would do, computed without writing.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub original: String,
    pub updated: String,
    pub changed: bool,
    pub changes: Vec<LineChange>,
}

/// Per-call knobs for the transaction coordinator.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Report the would-be result without touching the filesystem
    pub dry_run: bool,
    /// Write via temp-file-then-rename (on by default)
    pub atomic: bool,
    pub case_sensitive: bool,
    /// Treat the content hint as a pattern (plain-text strategy)
    pub regex: bool,
    /// How selector updates interpret the new value
    pub update_mode: UpdateMode,
    /// Skip directive/interpolation span protection (template strategy)
    pub raw: bool,
    /// Override the engine's configured lock timeout
    pub lock_timeout: Option<Duration>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            atomic: true,
            case_sensitive: true,
            regex: false,
            update_mode: UpdateMode::Text,
            raw: false,
            lock_timeout: None,
        }
    }
}

impl UpdateOptions {
    /// The subset strategies see.
    pub fn replace(&self) -> ReplaceOptions {
        ReplaceOptions {
            case_sensitive: self.case_sensitive,
            regex: self.regex,
            update_mode: self.update_mode,
            raw: self.raw,
        }
    }
}

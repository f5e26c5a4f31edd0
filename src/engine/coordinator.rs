//! Transaction coordination around document mutations
//!
//! Every public operation follows the same skeleton: validate inputs before
//! any lock, acquire the per-document lock, snapshot, locate and apply,
//! validate the result, write atomically, release. Any failure after the
//! snapshot restores the document before the error reaches the caller, so
//! callers always observe either the old bytes or the new ones.

use super::request::{
    BatchItemOutcome, BatchItemStatus, BatchReport, MutationMode, MutationRequest, MutationResult,
    Preview, UpdateOptions,
};
use crate::backup::{
    BackupRecord, BackupStore, LineChange, changes_only, diff_lines, write_atomic,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::locator::{ElementReference, LocateOutcome, locate};
use crate::lock::LockManager;
use crate::policy::PolicyGate;
use crate::strategy::{ContentStrategy, StrategyContext, StrategySet, ValidationReport};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a mutation closure decided.
enum TxOutcome {
    NotFound,
    Updated(String),
}

/// The mutation engine.
///
/// Holds the policy gate, backup store, and lock table; strategies are
/// stateless and shared across transactions.
pub struct MutationEngine {
    policy: PolicyGate,
    backups: BackupStore,
    locks: LockManager,
    strategies: StrategySet,
    lock_timeout: Duration,
}

impl MutationEngine {
    /// Build an engine from loaded configuration.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let backups = BackupStore::open(&config.backups.resolve_root())?;
        Ok(Self::from_parts(
            config.policy_gate(),
            backups,
            LockManager::new(config.locks.ttl()),
            config.locks.timeout(),
        ))
    }

    /// Assemble an engine from explicit collaborators.
    pub fn from_parts(
        policy: PolicyGate,
        backups: BackupStore,
        locks: LockManager,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            backups,
            locks,
            strategies: StrategySet::new(),
            lock_timeout,
        }
    }

    /// Replace content located by a text hint.
    pub fn update_content(
        &self,
        document: &Path,
        old_hint: &str,
        new_value: &str,
        opts: &UpdateOptions,
    ) -> Result<MutationResult, EngineError> {
        if old_hint.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "content hint is empty".into(),
            });
        }
        let request = MutationRequest {
            mode: MutationMode::Content,
            element: ElementReference::from_hint(old_hint),
            new_value: Some(new_value.to_string()),
        };
        self.run_transaction(document, "update_content", old_hint, opts, |content, strategy| {
            self.apply_request(content, &request, strategy, opts)
        })
    }

    /// Replace content addressed by a structural selector.
    pub fn update_by_selector(
        &self,
        document: &Path,
        selector: &str,
        new_value: &str,
        opts: &UpdateOptions,
    ) -> Result<MutationResult, EngineError> {
        let request = MutationRequest {
            mode: MutationMode::Selector,
            element: ElementReference::from_selector(selector),
            new_value: Some(new_value.to_string()),
        };
        self.run_transaction(document, "update_by_selector", selector, opts, |content, strategy| {
            self.apply_request(content, &request, strategy, opts)
        })
    }

    /// Set or remove an attribute on selected nodes.
    pub fn update_attribute(
        &self,
        document: &Path,
        selector: &str,
        attr: &str,
        value: Option<&str>,
        opts: &UpdateOptions,
    ) -> Result<MutationResult, EngineError> {
        let request = MutationRequest {
            mode: MutationMode::Attribute,
            element: ElementReference {
                selector: Some(selector.to_string()),
                attribute: Some(attr.to_string()),
                ..Default::default()
            },
            new_value: value.map(String::from),
        };
        self.run_transaction(document, "update_attribute", selector, opts, |content, strategy| {
            self.apply_request(content, &request, strategy, opts)
        })
    }

    /// Replace one line, 1-indexed.
    pub fn update_by_line(
        &self,
        document: &Path,
        line_number: usize,
        new_value: &str,
        opts: &UpdateOptions,
    ) -> Result<MutationResult, EngineError> {
        // Positional intent is checked up front, before any lock or backup
        self.check_document(document)?;
        let content = self.read_document(document)?;
        let total = content.split_inclusive('\n').count();
        if line_number == 0 || line_number > total {
            return Err(EngineError::OutOfRange {
                line: line_number,
                total,
            });
        }

        let request = MutationRequest {
            mode: MutationMode::Line,
            element: ElementReference::from_line(line_number),
            new_value: Some(new_value.to_string()),
        };
        let target = format!("line {}", line_number);
        self.run_transaction(document, "update_by_line", &target, opts, |content, strategy| {
            self.apply_request(content, &request, strategy, opts)
        })
    }

    /// Resolve a full element reference and replace the located region.
    pub fn update_element(
        &self,
        document: &Path,
        reference: &ElementReference,
        new_value: Option<&str>,
        opts: &UpdateOptions,
    ) -> Result<MutationResult, EngineError> {
        if reference.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "element reference has no targeting mode".into(),
            });
        }
        let mode = if reference.attribute.is_some() {
            MutationMode::Attribute
        } else {
            MutationMode::Content
        };
        let request = MutationRequest {
            mode,
            element: reference.clone(),
            new_value: new_value.map(String::from),
        };
        let target = summarize_reference(reference);
        self.run_transaction(document, "update_element", &target, opts, |content, strategy| {
            self.apply_element(content, &request, strategy, opts)
        })
    }

    /// Apply several requests to one document, all-or-nothing.
    ///
    /// A request that resolves to nothing records `not_found` and the batch
    /// continues; any error or validation failure aborts the whole batch
    /// with zero net changes.
    pub fn batch_update(
        &self,
        document: &Path,
        requests: &[MutationRequest],
        opts: &UpdateOptions,
    ) -> Result<BatchReport, EngineError> {
        self.check_document(document)?;
        if requests.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "batch contains no requests".into(),
            });
        }

        let ctx = StrategyContext::for_path(document);

        if opts.dry_run {
            let content = self.read_document(document)?;
            let strategy = self.strategies.select(&content, &ctx);
            let (working, items) = self.apply_batch(&content, requests, strategy, opts)?;
            return Ok(BatchReport {
                success: true,
                changed: working != content,
                backup_id: None,
                items,
            });
        }

        let timeout = opts.lock_timeout.unwrap_or(self.lock_timeout);
        let _guard = self.locks.acquire(document, timeout)?;

        let content = self.read_document(document)?;
        let backup = self.backups.snapshot(document)?;
        let strategy = self.strategies.select(&content, &ctx);

        let (working, items) = match self.apply_batch(&content, requests, strategy, opts) {
            Ok(applied) => applied,
            Err(e) => {
                warn!(
                    document = %document.display(),
                    backup = %backup.id,
                    error = %e,
                    "batch aborted with no changes"
                );
                return Err(e);
            }
        };

        let changed = working != content;
        if changed {
            if let Err(e) = self.write_document(document, &working, opts.atomic) {
                self.restore_after_failed_write(document, &backup);
                return Err(EngineError::Io {
                    path: document.to_path_buf(),
                    source: e,
                });
            }
        }

        info!(
            document = %document.display(),
            op = "batch_update",
            items = items.len(),
            changed,
            backup = %backup.id,
            "transaction complete"
        );

        Ok(BatchReport {
            success: true,
            changed,
            backup_id: Some(backup.id),
            items,
        })
    }

    /// Compute what an update would do, without locking or writing.
    pub fn preview(
        &self,
        document: &Path,
        old_hint: &str,
        new_value: &str,
        opts: &UpdateOptions,
    ) -> Result<Preview, EngineError> {
        self.policy.check(document)?;
        if !document.exists() {
            return Err(EngineError::DocumentMissing {
                path: document.to_path_buf(),
            });
        }
        if old_hint.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "content hint is empty".into(),
            });
        }

        let content = self.read_document(document)?;
        let ctx = StrategyContext::for_path(document);
        let strategy = self.strategies.select(&content, &ctx);
        let request = MutationRequest {
            mode: MutationMode::Content,
            element: ElementReference::from_hint(old_hint),
            new_value: Some(new_value.to_string()),
        };

        let updated = match self.apply_request(&content, &request, strategy, opts)? {
            TxOutcome::NotFound => content.clone(),
            TxOutcome::Updated(updated) => updated,
        };
        let changed = updated != content;
        let changes = if changed {
            changes_only(&diff_lines(&content, &updated))
        } else {
            Vec::new()
        };

        Ok(Preview {
            original: content,
            updated,
            changed,
            changes,
        })
    }

    /// Backup history for a document, most recent first.
    pub fn history(&self, document: &Path) -> Result<Vec<BackupRecord>, EngineError> {
        self.policy.check(document)?;
        Ok(self.backups.history(document)?)
    }

    /// Diff a backup (old side) against the document's current bytes.
    pub fn diff(&self, document: &Path, backup_id: Uuid) -> Result<Vec<LineChange>, EngineError> {
        self.policy.check(document)?;
        let record = self.backups.record(backup_id)?;
        let snapshot = self.backups.read_snapshot(&record)?;
        let current = self.read_document(document)?;
        Ok(diff_lines(&String::from_utf8_lossy(&snapshot), &current))
    }

    /// Diff two backups of any document.
    pub fn diff_backups(
        &self,
        backup_a: Uuid,
        backup_b: Uuid,
    ) -> Result<Vec<LineChange>, EngineError> {
        let a = self.backups.record(backup_a)?;
        let b = self.backups.record(backup_b)?;
        let bytes_a = self.backups.read_snapshot(&a)?;
        let bytes_b = self.backups.read_snapshot(&b)?;
        Ok(diff_lines(
            &String::from_utf8_lossy(&bytes_a),
            &String::from_utf8_lossy(&bytes_b),
        ))
    }

    /// Roll a document back to a snapshot. The restore itself is snapshotted
    /// first, so it can be undone like any other mutation.
    pub fn restore(&self, document: &Path, backup_id: Uuid) -> Result<MutationResult, EngineError> {
        self.check_document(document)?;
        let _guard = self.locks.acquire(document, self.lock_timeout)?;

        let safety = self.backups.snapshot(document)?;
        let record = self.backups.restore(document, backup_id)?;

        info!(
            document = %document.display(),
            op = "restore",
            restored_from = %record.id,
            backup = %safety.id,
            "transaction complete"
        );

        Ok(MutationResult::updated(
            safety.checksum != record.checksum,
            Some(safety.id),
        ))
    }

    /// Run the active strategy's structural validation on the current bytes.
    pub fn validate_document(&self, document: &Path) -> Result<ValidationReport, EngineError> {
        self.policy.check(document)?;
        let content = self.read_document(document)?;
        let ctx = StrategyContext::for_path(document);
        let strategy = self.strategies.select(&content, &ctx);
        Ok(strategy.validate(&content))
    }

    // ---- transaction skeleton ----

    fn run_transaction(
        &self,
        document: &Path,
        op_name: &str,
        element: &str,
        opts: &UpdateOptions,
        op: impl FnOnce(&str, &dyn ContentStrategy) -> Result<TxOutcome, EngineError>,
    ) -> Result<MutationResult, EngineError> {
        self.check_document(document)?;
        let ctx = StrategyContext::for_path(document);

        if opts.dry_run {
            let content = self.read_document(document)?;
            let strategy = self.strategies.select(&content, &ctx);
            let result = match op(&content, strategy)? {
                TxOutcome::NotFound => MutationResult::no_op(None),
                TxOutcome::Updated(updated) => {
                    if updated != content {
                        self.validate_result(strategy, &updated)?;
                    }
                    MutationResult::updated(updated != content, None)
                }
            };
            debug!(document = %document.display(), op = op_name, element, "dry run");
            return Ok(result);
        }

        let timeout = opts.lock_timeout.unwrap_or(self.lock_timeout);
        let _guard = self.locks.acquire(document, timeout)?;

        let content = self.read_document(document)?;
        let backup = self.backups.snapshot(document)?;
        let strategy = self.strategies.select(&content, &ctx);

        let outcome = match op(&content, strategy) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Nothing was written yet; releasing the lock is enough
                warn!(
                    document = %document.display(),
                    op = op_name,
                    element,
                    backup = %backup.id,
                    error = %e,
                    "transaction failed with no changes"
                );
                return Err(e);
            }
        };

        let result = match outcome {
            TxOutcome::NotFound => MutationResult::no_op(Some(backup.id)),
            TxOutcome::Updated(updated) => {
                if updated == content {
                    MutationResult::updated(false, Some(backup.id))
                } else {
                    if let Err(e) = self.validate_result(strategy, &updated) {
                        warn!(
                            document = %document.display(),
                            op = op_name,
                            element,
                            backup = %backup.id,
                            error = %e,
                            "edited content failed validation, document untouched"
                        );
                        return Err(e);
                    }
                    if let Err(e) = self.write_document(document, &updated, opts.atomic) {
                        self.restore_after_failed_write(document, &backup);
                        return Err(EngineError::Io {
                            path: document.to_path_buf(),
                            source: e,
                        });
                    }
                    MutationResult::updated(true, Some(backup.id))
                }
            }
        };

        info!(
            document = %document.display(),
            op = op_name,
            element,
            success = result.success,
            changed = result.changed,
            backup = %backup.id,
            "transaction complete"
        );

        Ok(result)
    }

    /// Step-1 input validation; failing here never acquires a lock.
    fn check_document(&self, document: &Path) -> Result<(), EngineError> {
        self.policy.check(document)?;
        if !document.exists() {
            return Err(EngineError::DocumentMissing {
                path: document.to_path_buf(),
            });
        }
        let metadata = fs::metadata(document).map_err(|e| EngineError::Io {
            path: document.to_path_buf(),
            source: e,
        })?;
        if metadata.permissions().readonly() {
            return Err(EngineError::NotWritable {
                path: document.to_path_buf(),
            });
        }
        Ok(())
    }

    fn read_document(&self, document: &Path) -> Result<String, EngineError> {
        fs::read_to_string(document).map_err(|e| EngineError::Io {
            path: document.to_path_buf(),
            source: e,
        })
    }

    fn write_document(&self, document: &Path, content: &str, atomic: bool) -> std::io::Result<()> {
        if atomic {
            write_atomic(document, content.as_bytes())
        } else {
            fs::write(document, content)
        }
    }

    fn validate_result(
        &self,
        strategy: &dyn ContentStrategy,
        content: &str,
    ) -> Result<(), EngineError> {
        let report = strategy.validate(content);
        if !report.valid {
            return Err(EngineError::ValidationFailed {
                errors: report.errors,
            });
        }
        Ok(())
    }

    fn restore_after_failed_write(&self, document: &Path, backup: &BackupRecord) {
        match self.backups.restore(document, backup.id) {
            Ok(_) => warn!(
                document = %document.display(),
                backup = %backup.id,
                "write failed, document restored from snapshot"
            ),
            Err(e) => warn!(
                document = %document.display(),
                backup = %backup.id,
                error = %e,
                "write failed and restore also failed; snapshot is intact"
            ),
        }
    }

    /// Dispatch one request against in-memory content.
    fn apply_request(
        &self,
        content: &str,
        request: &MutationRequest,
        strategy: &dyn ContentStrategy,
        opts: &UpdateOptions,
    ) -> Result<TxOutcome, EngineError> {
        match request.mode {
            MutationMode::Content => {
                let hint = require(request.element.content_hint.as_deref(), "content hint")?;
                let new_value = require(request.new_value.as_deref(), "new value")?;
                if hint.is_empty() {
                    return Err(EngineError::InvalidInput {
                        message: "content hint is empty".into(),
                    });
                }

                // Pattern and case-insensitive matching go straight to the
                // strategy; the locator ladder only serves exact hints
                if opts.regex || !opts.case_sensitive {
                    let replaced =
                        strategy.replace_content(content, hint, new_value, &opts.replace())?;
                    return Ok(outcome_from(replaced.count, replaced.content));
                }

                match locate(content, &request.element, strategy)? {
                    LocateOutcome::NotFound => Ok(TxOutcome::NotFound),
                    LocateOutcome::Found(located) => {
                        let replaced = strategy.replace_content(
                            content,
                            &located.matched_text,
                            new_value,
                            &opts.replace(),
                        )?;
                        Ok(outcome_from(replaced.count, replaced.content))
                    }
                }
            }
            MutationMode::Selector => {
                let selector = require(request.element.selector.as_deref(), "selector")?;
                let new_value = require(request.new_value.as_deref(), "new value")?;
                let replaced =
                    strategy.replace_by_selector(content, selector, new_value, &opts.replace())?;
                Ok(outcome_from(replaced.count, replaced.content))
            }
            MutationMode::Attribute => {
                let selector = request
                    .element
                    .selector
                    .as_deref()
                    .or(request.element.identifier.as_deref());
                let selector = require(selector, "selector")?;
                let attr = require(request.element.attribute.as_deref(), "attribute name")?;
                let replaced = strategy.replace_attribute(
                    content,
                    selector,
                    attr,
                    request.new_value.as_deref(),
                )?;
                Ok(outcome_from(replaced.count, replaced.content))
            }
            MutationMode::Line => {
                let line_number = request.element.line_number.ok_or_else(|| {
                    EngineError::InvalidInput {
                        message: "line request is missing its line number".into(),
                    }
                })?;
                let new_value = require(request.new_value.as_deref(), "new value")?;
                let replaced = strategy.replace_by_line(content, line_number, new_value)?;
                // A line rewrite to identical text is complete, not missing
                Ok(TxOutcome::Updated(replaced.content))
            }
        }
    }

    /// Full reference resolution for `update_element`: splice whichever
    /// region the locator proves, or fall back to attribute dispatch.
    fn apply_element(
        &self,
        content: &str,
        request: &MutationRequest,
        strategy: &dyn ContentStrategy,
        opts: &UpdateOptions,
    ) -> Result<TxOutcome, EngineError> {
        if request.mode == MutationMode::Attribute {
            return self.apply_request(content, request, strategy, opts);
        }
        let new_value = require(request.new_value.as_deref(), "new value")?;

        match locate(content, &request.element, strategy)? {
            LocateOutcome::NotFound => Ok(TxOutcome::NotFound),
            LocateOutcome::Found(located) => {
                let mut updated = String::with_capacity(content.len() + new_value.len());
                updated.push_str(&content[..located.region.start]);
                updated.push_str(new_value);
                updated.push_str(&content[located.region.end..]);
                Ok(TxOutcome::Updated(updated))
            }
        }
    }

    /// Apply a request list sequentially to in-memory content, validating
    /// after each step so a broken item aborts before any write.
    fn apply_batch(
        &self,
        content: &str,
        requests: &[MutationRequest],
        strategy: &dyn ContentStrategy,
        opts: &UpdateOptions,
    ) -> Result<(String, Vec<BatchItemOutcome>), EngineError> {
        let mut working = content.to_string();
        let mut items = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            match self.apply_request(&working, request, strategy, opts) {
                Err(e) => {
                    // Keep structural errors as themselves; wrap shape errors
                    // with the failing item's position
                    return Err(match e {
                        EngineError::InvalidInput { message } => EngineError::InvalidInput {
                            message: format!("batch item {}: {}", index, message),
                        },
                        other => other,
                    });
                }
                Ok(TxOutcome::NotFound) => items.push(BatchItemOutcome {
                    index,
                    changed: false,
                    outcome: BatchItemStatus::NotFound,
                }),
                Ok(TxOutcome::Updated(updated)) => {
                    let changed = updated != working;
                    if changed {
                        self.validate_result(strategy, &updated)?;
                        working = updated;
                    }
                    items.push(BatchItemOutcome {
                        index,
                        changed,
                        outcome: if changed {
                            BatchItemStatus::Updated
                        } else {
                            BatchItemStatus::Unchanged
                        },
                    });
                }
            }
        }

        Ok((working, items))
    }
}

fn require<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, EngineError> {
    value.ok_or_else(|| EngineError::InvalidInput {
        message: format!("{} is required", what),
    })
}

fn outcome_from(count: usize, content: String) -> TxOutcome {
    if count == 0 {
        TxOutcome::NotFound
    } else {
        TxOutcome::Updated(content)
    }
}

fn summarize_reference(reference: &ElementReference) -> String {
    // Shown in audit events; keep it short

    if let Some(ref ident) = reference.identifier {
        return format!("id:{}", ident);
    }
    if let Some(ref selector) = reference.selector {
        return selector.clone();
    }
    if let Some(ref hint) = reference.content_hint {
        let short: String = hint.chars().take(40).collect();
        return short;
    }
    if let Some(line) = reference.line_number {
        return format!("line {}", line);
    }
    String::from("(empty)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> MutationEngine {
        let backups = BackupStore::open(&dir.path().join("backups")).unwrap();
        MutationEngine::from_parts(
            PolicyGate::allow_all(),
            backups,
            LockManager::new(Duration::from_secs(60)),
            Duration::from_millis(200),
        )
    }

    fn setup_doc(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn opts() -> UpdateOptions {
        UpdateOptions::default()
    }

    #[test]
    fn test_update_content_happy_path() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "old words here");

        let result = engine
            .update_content(&doc, "old words", "new words", &opts())
            .unwrap();
        assert!(result.success);
        assert!(result.changed);
        assert!(result.backup_id.is_some());
        assert_eq!(fs::read_to_string(&doc).unwrap(), "new words here");
    }

    #[test]
    fn test_stale_hint_is_a_safe_no_op() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "current content");

        let result = engine
            .update_content(&doc, "content that is gone", "x", &opts())
            .unwrap();
        assert!(result.success);
        assert!(!result.changed);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "current content");
    }

    #[test]
    fn test_case_insensitive_update() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "Hello WORLD");

        let o = UpdateOptions {
            case_sensitive: false,
            ..Default::default()
        };
        engine.update_content(&doc, "hello", "hi", &o).unwrap();
        assert_eq!(fs::read_to_string(&doc).unwrap(), "hi WORLD");
    }

    #[test]
    fn test_empty_hint_rejected_before_lock() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "content");

        let result = engine.update_content(&doc, "", "x", &opts());
        assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
        assert!(engine.history(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_policy_rejection_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let backups = BackupStore::open(&dir.path().join("backups")).unwrap();
        let engine = MutationEngine::from_parts(
            PolicyGate::new(vec![], vec!["html".into()]),
            backups,
            LockManager::new(Duration::from_secs(60)),
            Duration::from_millis(200),
        );
        let doc = setup_doc(&dir, "script.sh", "echo hi");

        let result = engine.update_content(&doc, "hi", "bye", &opts());
        assert!(matches!(
            result,
            Err(EngineError::ExtensionNotAllowed { .. })
        ));
        assert_eq!(fs::read_to_string(&doc).unwrap(), "echo hi");
        assert!(!engine.locks.is_locked(&doc));
    }

    #[test]
    fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let result = engine.update_content(&dir.path().join("ghost.txt"), "a", "b", &opts());
        assert!(matches!(result, Err(EngineError::DocumentMissing { .. })));
    }

    #[test]
    fn test_update_by_selector_markup() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "page.html", r#"<h1 id="t">A</h1>"#);

        let result = engine.update_by_selector(&doc, "#t", "B", &opts()).unwrap();
        assert!(result.changed);
        assert_eq!(fs::read_to_string(&doc).unwrap(), r#"<h1 id="t">B</h1>"#);
    }

    #[test]
    fn test_update_attribute() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "page.html", r#"<img src="old.png" alt="x">"#);

        engine
            .update_attribute(&doc, "img", "src", Some("new.png"), &opts())
            .unwrap();
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            r#"<img src="new.png" alt="x">"#
        );

        engine
            .update_attribute(&doc, "img", "alt", None, &opts())
            .unwrap();
        assert_eq!(fs::read_to_string(&doc).unwrap(), r#"<img src="new.png">"#);
    }

    #[test]
    fn test_update_by_line() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "one\ntwo\nthree\n");

        let result = engine.update_by_line(&doc, 2, "X", &opts()).unwrap();
        assert!(result.changed);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "one\nX\nthree\n");
    }

    #[test]
    fn test_update_by_line_out_of_range() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "one\ntwo\nthree\n");

        let result = engine.update_by_line(&doc, 10, "X", &opts());
        assert!(matches!(
            result,
            Err(EngineError::OutOfRange { line: 10, total: 3 })
        ));
        // Rejected before lock and backup
        assert!(engine.history(&doc).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&doc).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_template_update_preserves_directives() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "banner.blade.php", "@if($show) {{ $title }} @endif");

        engine
            .update_content(&doc, "{{ $title }}", "{{ $heading }}", &opts())
            .unwrap();
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            "@if($show) {{ $heading }} @endif"
        );
    }

    #[test]
    fn test_validation_failure_leaves_document_untouched() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let original = "<div><p>text</p></div>";
        let doc = setup_doc(&dir, "page.html", original);

        // Injecting a stray closing tag breaks the structure check
        let o = UpdateOptions {
            update_mode: crate::strategy::UpdateMode::Html,
            ..Default::default()
        };
        let result = engine.update_by_selector(&doc, "p", "</div>", &o);
        assert!(matches!(result, Err(EngineError::ValidationFailed { .. })));
        assert_eq!(fs::read_to_string(&doc).unwrap(), original);
    }

    #[test]
    fn test_dry_run_never_touches_the_filesystem() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "old text");

        let o = UpdateOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = engine.update_content(&doc, "old", "new", &o).unwrap();
        assert!(result.success);
        assert!(result.changed);
        assert!(result.backup_id.is_none());
        assert_eq!(fs::read_to_string(&doc).unwrap(), "old text");
        assert!(engine.history(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_lock_timeout_surfaces() {
        let dir = TempDir::new().unwrap();
        let backups = BackupStore::open(&dir.path().join("backups")).unwrap();
        let locks = LockManager::new(Duration::from_secs(60));
        let engine = MutationEngine::from_parts(
            PolicyGate::allow_all(),
            backups,
            locks.clone(),
            Duration::from_millis(50),
        );
        let doc = setup_doc(&dir, "note.txt", "content");

        let _held = locks.acquire(&doc, Duration::from_millis(50)).unwrap();
        let result = engine.update_content(&doc, "content", "x", &opts());
        assert!(matches!(result, Err(EngineError::LockTimeout { .. })));
        assert_eq!(fs::read_to_string(&doc).unwrap(), "content");
    }

    #[test]
    fn test_update_element_by_identifier() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(
            &dir,
            "page.html",
            r#"<div id="hero">old</div><p>keep</p>"#,
        );

        let reference = ElementReference {
            identifier: Some("hero".into()),
            ..Default::default()
        };
        engine
            .update_element(&doc, &reference, Some(r#"<div id="hero">new</div>"#), &opts())
            .unwrap();
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            r#"<div id="hero">new</div><p>keep</p>"#
        );
    }

    #[test]
    fn test_batch_commits_all_items() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "page.html", "<h1>Title</h1><p>Body</p>");

        let requests = vec![
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("h1"),
                new_value: Some("New Title".into()),
            },
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("p"),
                new_value: Some("New Body".into()),
            },
        ];
        let report = engine.batch_update(&doc, &requests, &opts()).unwrap();
        assert!(report.success);
        assert!(report.changed);
        assert_eq!(report.updated_count(), 2);
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            "<h1>New Title</h1><p>New Body</p>"
        );
    }

    #[test]
    fn test_batch_not_found_item_does_not_abort() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "page.html", "<h1>Title</h1>");

        let requests = vec![
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("#missing"),
                new_value: Some("x".into()),
            },
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("h1"),
                new_value: Some("New".into()),
            },
        ];
        let report = engine.batch_update(&doc, &requests, &opts()).unwrap();
        assert!(report.success);
        assert_eq!(report.items[0].outcome, BatchItemStatus::NotFound);
        assert_eq!(report.items[1].outcome, BatchItemStatus::Updated);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "<h1>New</h1>");
    }

    #[test]
    fn test_batch_failure_rolls_back_everything() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let original = "<h1>Title</h1><p>Body</p>";
        let doc = setup_doc(&dir, "page.html", original);

        let o = UpdateOptions {
            update_mode: crate::strategy::UpdateMode::Html,
            ..Default::default()
        };
        let requests = vec![
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("h1"),
                new_value: Some("Fine".into()),
            },
            // This one breaks validation and must sink the whole batch
            MutationRequest {
                mode: MutationMode::Selector,
                element: ElementReference::from_selector("p"),
                new_value: Some("</span>".into()),
            },
        ];
        let result = engine.batch_update(&doc, &requests, &o);
        assert!(matches!(result, Err(EngineError::ValidationFailed { .. })));
        assert_eq!(fs::read_to_string(&doc).unwrap(), original);
    }

    #[test]
    fn test_preview_never_writes() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "alpha\nbeta\n");

        let preview = engine.preview(&doc, "beta", "gamma", &opts()).unwrap();
        assert!(preview.changed);
        assert_eq!(preview.updated, "alpha\ngamma\n");
        assert_eq!(preview.changes.len(), 2);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "alpha\nbeta\n");
        assert!(engine.history(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_history_diff_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "note.txt", "version one\n");

        let first = engine
            .update_content(&doc, "version one", "version two", &opts())
            .unwrap();
        let backup_id = first.backup_id.unwrap();

        let history = engine.history(&doc).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, backup_id);

        let changes = engine.diff(&doc, backup_id).unwrap();
        let non_context = changes_only(&changes);
        assert_eq!(non_context.len(), 2);

        let restored = engine.restore(&doc, backup_id).unwrap();
        assert!(restored.success);
        assert!(restored.changed);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "version one\n");

        // The restore snapshotted the pre-restore state too
        assert_eq!(engine.history(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_in(&dir));
        let doc = setup_doc(&dir, "note.txt", "alpha beta");

        let handles: Vec<_> = [("alpha", "one"), ("beta", "two")]
            .into_iter()
            .map(|(old, new)| {
                let engine = Arc::clone(&engine);
                let doc = doc.clone();
                thread::spawn(move || {
                    let o = UpdateOptions {
                        lock_timeout: Some(Duration::from_secs(5)),
                        ..Default::default()
                    };
                    engine.update_content(&doc, old, new, &o).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap();
            assert!(result.success);
        }
        assert_eq!(fs::read_to_string(&doc).unwrap(), "one two");
    }

    #[test]
    fn test_validate_document_operation() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let doc = setup_doc(&dir, "page.html", "<div><span>text");

        let report = engine.validate_document(&doc).unwrap();
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
    }
}
